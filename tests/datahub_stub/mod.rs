use std::io::{Cursor, Read as _, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

pub const CURRENT_ID: &str = "1098253";
pub const SUPERSEDED_ID: &str = "1087604";
/// Only rendered on the second tab, so only reachable through a browser session.
pub const HISTORICAL_ID: &str = "1021112";

const SESSION_ID: &str = "stub-session";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// One tiny_http server playing both the datahub site and a W3C WebDriver endpoint.
///
/// Site routes: `/datahub`, `/data/{id}`, `/datashare/{id}/download`.
/// WebDriver routes live under `/wd`.
pub struct DatahubStub {
    pub base_url: String,
    pub session_closed: Arc<AtomicBool>,
    pub requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl DatahubStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start datahub stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let session_closed = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let base_url = base_url.clone();
            let session_closed = Arc::clone(&session_closed);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                let mut current_tab = 0usize;
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(_) => break,
                    };

                    let method = request.method().to_string();
                    let path = request.url().to_string();
                    requests
                        .lock()
                        .expect("lock requests")
                        .push(format!("{method} {path}"));

                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);

                    let response = if let Some(rest) = path.strip_prefix("/wd") {
                        webdriver_response(
                            &method,
                            rest,
                            &body,
                            &base_url,
                            &mut current_tab,
                            &session_closed,
                        )
                    } else {
                        site_response(&path, &base_url)
                    };
                    let _ = request.respond(response);
                }
            })
        };

        Self {
            base_url,
            session_closed,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn datahub_url(&self) -> String {
        format!("{}/datahub", self.base_url)
    }

    pub fn webdriver_url(&self) -> String {
        format!("{}/wd", self.base_url)
    }

    pub fn archive_url(&self, id: &str) -> String {
        format!("{}/datashare/{id}/download", self.base_url)
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .expect("lock requests")
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }
}

impl Drop for DatahubStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

type Response = tiny_http::Response<Cursor<Vec<u8>>>;

fn with_content_type(response: Response, content_type: &str) -> Response {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .expect("build header");
    response.with_header(header)
}

fn html(body: String) -> Response {
    with_content_type(
        tiny_http::Response::from_data(body.into_bytes()),
        "text/html; charset=utf-8",
    )
}

fn not_found() -> Response {
    tiny_http::Response::from_data(b"not found".to_vec()).with_status_code(404)
}

fn site_response(path: &str, base_url: &str) -> Response {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["datahub"] => html(landing_page(base_url, 0)),
        ["data", id] => html(download_page(id)),
        ["datashare", id, "download"] => with_content_type(
            tiny_http::Response::from_data(archive_bytes(id)),
            "application/zip",
        ),
        _ => not_found(),
    }
}

fn webdriver_response(
    method: &str,
    path: &str,
    body: &str,
    base_url: &str,
    current_tab: &mut usize,
    session_closed: &AtomicBool,
) -> Response {
    let session_prefix = format!("/session/{SESSION_ID}");
    let value = match (method, path) {
        ("POST", "/session") => json!({ "sessionId": SESSION_ID, "capabilities": {} }),
        ("DELETE", p) if p == session_prefix => {
            session_closed.store(true, Ordering::SeqCst);
            Value::Null
        }
        (_, p) if p.starts_with(&session_prefix) => {
            match (method, &p[session_prefix.len()..]) {
                ("POST", "/url") => {
                    *current_tab = 0;
                    Value::Null
                }
                ("POST", "/elements") => {
                    let request: Value = serde_json::from_str(body).unwrap_or(Value::Null);
                    if request["using"] != "css selector" {
                        return webdriver_error(400, "invalid argument", "unsupported locator");
                    }
                    json!([{ ELEMENT_KEY: "tab-0" }, { ELEMENT_KEY: "tab-1" }])
                }
                ("POST", "/element/tab-0/click") => {
                    *current_tab = 0;
                    Value::Null
                }
                ("POST", "/element/tab-1/click") => {
                    *current_tab = 1;
                    Value::Null
                }
                ("GET", "/source") => Value::String(landing_page(base_url, *current_tab)),
                _ => return webdriver_error(404, "unknown command", path),
            }
        }
        _ => return webdriver_error(404, "invalid session id", path),
    };

    with_content_type(
        tiny_http::Response::from_data(json!({ "value": value }).to_string().into_bytes()),
        "application/json",
    )
}

fn webdriver_error(status: u16, error: &str, message: &str) -> Response {
    let body = json!({ "value": { "error": error, "message": message, "stacktrace": "" } });
    with_content_type(
        tiny_http::Response::from_data(body.to_string().into_bytes()),
        "application/json",
    )
    .with_status_code(status)
}

fn accordion(base_url: &str, id: &str, published: &str, coverage: &str, superseded: bool) -> String {
    let badge = if superseded {
        r#"<span class="ui label">Superseded</span>"#
    } else {
        ""
    };
    format!(
        r#"<div class="accordion ui" id="{id}">
  <div class="title">
    <span class="dataset-title">European Union Emissions Trading System (EU ETS) data from EUTL
      <span class="formats"><span class="ui label dh-label">ascii (.csv, .txt, .sql)</span>{badge}</span>
    </span>
  </div>
  <div class="content">
    <p><strong>Published:</strong> {published}</p>
    <p><strong>Temporal coverage:</strong> {coverage}</p>
    <a href="{base_url}/data/{id}"><span>Direct download</span></a>
    <a href="{base_url}/catalogue/{id}">Metadata Factsheet</a>
  </div>
</div>"#
    )
}

/// The datahub page as rendered with tab `tab` selected. The server-side
/// render is always tab 0.
pub fn landing_page(base_url: &str, tab: usize) -> String {
    let entries = match tab {
        0 => [
            accordion(base_url, CURRENT_ID, "1 Jul 2025", "2005-2024", false),
            accordion(base_url, SUPERSEDED_ID, "20 Apr 2023", "2005-2023", true),
        ]
        .join("\n"),
        _ => [
            accordion(base_url, SUPERSEDED_ID, "20 Apr 2023", "2005-2023", true),
            accordion(base_url, HISTORICAL_ID, "9 May 2019", "2005-2018", true),
        ]
        .join("\n"),
    };
    format!(
        r#"<!doctype html>
<html>
  <head><title>EU ETS data</title></head>
  <body>
    <div class="datasets-tab">
      <div class="ui menu">
        <a class="item active">Latest</a>
        <a class="item">Older releases</a>
      </div>
      {entries}
    </div>
  </body>
</html>"#
    )
}

fn download_page(id: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <body>
    <a class="button" href="/datashare/{id}/download"><span>Download all files</span></a>
  </body>
</html>"#
    )
}

pub fn archive_entries(id: &str) -> Vec<(String, String)> {
    vec![
        (
            format!("eutl_{id}/installation.csv"),
            "id,name\n1,Plant A\n".to_owned(),
        ),
        (
            format!("eutl_{id}/compliance.csv"),
            "id,year,verified\n1,2024,100\n".to_owned(),
        ),
        (format!("eutl_{id}/README.txt"), format!("dataset {id}\n")),
    ]
}

pub fn archive_bytes(id: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer
        .add_directory(format!("eutl_{id}/"), options)
        .expect("add dir");
    for (name, body) in archive_entries(id) {
        writer.start_file(name, options).expect("start file");
        writer.write_all(body.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish zip").into_inner()
}
