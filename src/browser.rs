use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// A scripted browser tab, as much of it as the full-mode scrape needs.
#[async_trait]
pub trait BrowserSession: Send {
    type Item: Send + Sync;

    async fn load(&mut self, url: &str) -> Result<()>;

    async fn list_clickable_items(&mut self, selector: &str) -> Result<Vec<Self::Item>>;

    async fn click(&mut self, item: &Self::Item) -> Result<()>;

    async fn wait(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }

    /// Serialized DOM as currently rendered, after script execution.
    async fn current_document(&mut self) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub headless: bool,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9515".to_owned(),
            headless: true,
        }
    }
}

impl WebDriverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let endpoint = std::env::var("EUETS_WEBDRIVER_URL").unwrap_or(defaults.endpoint);
        let headless = std::env::var("EUETS_WEBDRIVER_HEADLESS")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.headless);
        Self { endpoint, headless }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebElement(String);

/// [`BrowserSession`] backed by a W3C WebDriver server (chromedriver, geckodriver, ...).
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: String,
    closed: bool,
}

impl WebDriverSession {
    pub async fn start(config: &WebDriverConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Browser(format!("build webdriver http client: {err}")))?;

        let endpoint = config.endpoint.trim_end_matches('/');
        let (chrome_args, firefox_args) = if config.headless {
            (
                json!(["--headless=new", "--disable-gpu", "--no-sandbox"]),
                json!(["-headless"]),
            )
        } else {
            (json!([]), json!([]))
        };
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "args": chrome_args },
                    "moz:firefoxOptions": { "args": firefox_args },
                }
            }
        });

        let url = format!("{endpoint}/session");
        let value = send_command(&client, Method::POST, &url, Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Browser("new session response has no sessionId".to_owned()))?;
        tracing::info!(%endpoint, session_id, "webdriver session started");

        Ok(Self {
            client,
            session_url: format!("{endpoint}/session/{session_id}"),
            closed: false,
        })
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.session_url);
        send_command(&self.client, method, &url, body).await
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    type Item = WebElement;

    async fn load(&mut self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn list_clickable_items(&mut self, selector: &str) -> Result<Vec<WebElement>> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;
        let elements = value
            .as_array()
            .ok_or_else(|| Error::Browser("find elements response is not an array".to_owned()))?;

        elements
            .iter()
            .map(|element| {
                element
                    .get(ELEMENT_KEY)
                    .or_else(|| element.get(LEGACY_ELEMENT_KEY))
                    .and_then(Value::as_str)
                    .map(|id| WebElement(id.to_owned()))
                    .ok_or_else(|| Error::Browser(format!("malformed element reference: {element}")))
            })
            .collect()
    }

    async fn click(&mut self, item: &WebElement) -> Result<()> {
        let path = format!("/element/{}/click", item.0);
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    async fn current_document(&mut self) -> Result<String> {
        let value = self.command(Method::GET, "/source", None).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Browser("page source is not a string".to_owned()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}

async fn send_command(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    tracing::trace!(%method, %url, "webdriver command");
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|err| Error::Browser(format!("{method} {url}: {err}")))?;

    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|err| Error::Browser(format!("read webdriver response: {err}")))?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or(raw);
        return Err(Error::Browser(format!("{method} {url} failed ({status}): {message}")));
    }

    let mut parsed: Value = serde_json::from_str(&raw)
        .map_err(|err| Error::Browser(format!("parse webdriver response: {err}")))?;
    // Pre-W3C drivers put sessionId next to `value` instead of inside it.
    if let (Some(session_id), Some(value)) = (
        parsed.get("sessionId").cloned(),
        parsed.get_mut("value").and_then(Value::as_object_mut),
    ) {
        value.entry("sessionId").or_insert(session_id);
    }
    Ok(parsed.get_mut("value").map(Value::take).unwrap_or(Value::Null))
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let value = value.get("value")?;
    let error = value.get("error")?.as_str()?;
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Some(format!("{error}: {message}"))
}
