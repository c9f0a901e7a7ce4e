use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Destination for `scheme://...` paths.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<()>;
}

/// Remote storage backends keyed by URL scheme.
#[derive(Clone, Default)]
pub struct Storage {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.backends.keys().collect();
        schemes.sort();
        f.debug_struct("Storage").field("schemes", &schemes).finish()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `gs://` backend configured from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().with_backend("gs", GcsStorage::from_env()?))
    }

    #[must_use]
    pub fn with_backend(mut self, scheme: &str, backend: impl StorageBackend + 'static) -> Self {
        self.backends
            .insert(scheme.to_ascii_lowercase(), Arc::new(backend));
        self
    }

    pub fn backend(&self, scheme: &str) -> Result<&dyn StorageBackend> {
        self.backends
            .get(&scheme.to_ascii_lowercase())
            .map(|backend| backend.as_ref())
            .ok_or_else(|| Error::MissingBackend {
                scheme: scheme.to_owned(),
            })
    }

    pub async fn put(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        let (scheme, _) = uri
            .split_once("://")
            .ok_or_else(|| Error::Storage(format!("not a remote uri: {uri}")))?;
        self.backend(scheme)?.put(uri, bytes).await
    }
}

const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const GCE_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Google Cloud Storage via the JSON API media upload.
#[derive(Debug, Clone)]
pub struct GcsStorage {
    client: reqwest::Client,
    upload_base: String,
    access_token: Option<String>,
}

impl GcsStorage {
    pub fn new(upload_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| Error::Storage(format!("build gcs http client: {err}")))?;
        Ok(Self {
            client,
            upload_base: upload_base.into(),
            access_token: None,
        })
    }

    /// `EUETS_GCS_ACCESS_TOKEN` and `EUETS_GCS_UPLOAD_BASE` override the defaults;
    /// without a token the GCE metadata server is asked for one.
    pub fn from_env() -> Result<Self> {
        let upload_base =
            std::env::var("EUETS_GCS_UPLOAD_BASE").unwrap_or_else(|_| GCS_UPLOAD_BASE.to_owned());
        let storage = Self::new(upload_base)?;
        Ok(match std::env::var("EUETS_GCS_ACCESS_TOKEN") {
            Ok(token) if !token.trim().is_empty() => storage.with_access_token(token.trim()),
            _ => storage,
        })
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        #[derive(Debug, serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let resp = self
            .client
            .get(GCE_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|err| Error::Storage(format!("request metadata access token: {err}")))?;
        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "metadata token request failed ({})",
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|err| Error::Storage(format!("parse metadata token json: {err}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl StorageBackend for GcsStorage {
    async fn put(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        let (bucket, object) = split_gcs_uri(uri)?;
        let access_token = self.access_token().await?;
        let url = format!(
            "{base}/b/{bucket}/o?uploadType=media&name={object}",
            base = self.upload_base.trim_end_matches('/'),
            bucket = percent_encode_rfc3986(bucket),
            object = percent_encode_rfc3986(object),
        );

        tracing::info!(%bucket, %object, bytes = bytes.len(), "uploading to gcs");
        let resp = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|err| Error::Storage(format!("upload {uri}: {err}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "gcs upload of {uri} failed ({status}): {body}"
            )));
        }
        Ok(())
    }
}

fn split_gcs_uri(uri: &str) -> Result<(&str, &str)> {
    let rest = uri
        .strip_prefix("gs://")
        .ok_or_else(|| Error::Storage(format!("not a gs:// uri: {uri}")))?;
    match rest.split_once('/') {
        Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => Ok((bucket, object)),
        _ => Err(Error::Storage(format!(
            "gs:// uri needs a bucket and an object name: {uri}"
        ))),
    }
}

fn percent_encode_rfc3986(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        let is_unreserved = matches!(
            b,
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~'
        );
        if is_unreserved {
            out.push(b as char);
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_rfc3986_encodes_object_separators() {
        assert_eq!(percent_encode_rfc3986("data/file 1.csv"), "data%2Ffile%201.csv");
        assert_eq!(percent_encode_rfc3986("a+b~"), "a%2Bb~");
    }

    #[test]
    fn split_gcs_uri_requires_bucket_and_object() {
        assert_eq!(
            split_gcs_uri("gs://bucket/dir/file.zip").unwrap(),
            ("bucket", "dir/file.zip")
        );
        assert!(split_gcs_uri("gs://bucket").is_err());
        assert!(split_gcs_uri("gs://bucket/").is_err());
        assert!(split_gcs_uri("s3://bucket/file").is_err());
    }

    #[test]
    fn from_env_registers_gcs_backend() -> Result<()> {
        let storage = Storage::from_env()?;
        assert!(storage.backend("gs").is_ok());
        assert!(storage.backend("GS").is_ok());

        let gcs = GcsStorage::new("http://127.0.0.1:9/upload/storage/v1")?;
        assert_eq!(gcs.upload_base, "http://127.0.0.1:9/upload/storage/v1");
        assert!(gcs.access_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_scheme_is_missing_backend() {
        let storage = Storage::from_env().unwrap();
        let err = storage
            .put("s3://bucket/file.zip", b"data")
            .await
            .unwrap_err();
        match err {
            Error::MissingBackend { scheme } => assert_eq!(scheme, "s3"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
