use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

use crate::config::ScrapeConfig;
use crate::error::{Error, Result};

/// Thin GET-only HTTP client. Every non-2xx response is an error; nothing is retried.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Fetcher {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|source| Error::Http {
                url: config.root_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fetches an HTML page and returns its body together with the final (post-redirect) URL.
    pub async fn get_html(&self, url: &str) -> Result<(String, Url)> {
        let response = self
            .send(url, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .await?;
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|source| Error::Http {
            url: url.to_owned(),
            source,
        })?;
        Ok((body, final_url))
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(url, "*/*").await?;
        let bytes = response.bytes().await.map_err(|source| Error::Http {
            url: url.to_owned(),
            source,
        })?;
        tracing::info!(%url, bytes = bytes.len(), "fetched");
        Ok(bytes.to_vec())
    }

    async fn send(&self, url: &str, accept: &str) -> Result<reqwest::Response> {
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_owned(),
                status,
            });
        }
        Ok(response)
    }
}
