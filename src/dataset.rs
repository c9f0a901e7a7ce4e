use std::path::Path;

use tokio::sync::OnceCell;

use crate::archive;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::formats::{ArchiveFile, DIRECT_DOWNLOAD_LABEL, Dataset};
use crate::resolve::resolve_download_url;
use crate::storage::Storage;

/// A [`Dataset`] bound to the clients needed to reach its archive.
///
/// The archive URL and bytes are fetched at most once per instance.
#[derive(Debug)]
pub struct RemoteDataset {
    dataset: Dataset,
    fetcher: Fetcher,
    storage: Storage,
    archive_url: OnceCell<String>,
    archive_bytes: OnceCell<Vec<u8>>,
}

impl RemoteDataset {
    pub fn new(dataset: Dataset, fetcher: Fetcher, storage: Storage) -> Self {
        Self {
            dataset,
            fetcher,
            storage,
            archive_url: OnceCell::new(),
            archive_bytes: OnceCell::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Direct URL of the zip archive. The "Direct download" link points to a
    /// landing page, which is fetched and resolved here.
    pub async fn archive_url(&self) -> Result<&str> {
        let url = self
            .archive_url
            .get_or_try_init(|| async {
                let page = self
                    .dataset
                    .link(DIRECT_DOWNLOAD_LABEL)
                    .ok_or_else(|| Error::LinkNotFound {
                        label: DIRECT_DOWNLOAD_LABEL.to_owned(),
                    })?;
                resolve_download_url(&self.fetcher, page.url.as_str()).await
            })
            .await?;
        Ok(url.as_str())
    }

    pub async fn archive_bytes(&self) -> Result<&[u8]> {
        let bytes = self
            .archive_bytes
            .get_or_try_init(|| async {
                let url = self.archive_url().await?;
                tracing::info!(dataset_id = %self.dataset.dataset_id, %url, "downloading archive");
                self.fetcher.get_bytes(url).await
            })
            .await?;
        Ok(bytes.as_slice())
    }

    pub async fn files(&self) -> Result<Vec<ArchiveFile>> {
        archive::list_files(self.archive_bytes().await?)
    }

    /// Writes the archive to `destination` and returns the final path. A
    /// directory destination gets `{dataset_id}.zip` appended.
    pub async fn download(&self, destination: &str) -> Result<String> {
        let bytes = self.archive_bytes().await?;
        let path = download_path(destination, &self.dataset.dataset_id);
        archive::write_bytes_to_path(bytes, &path, &self.storage).await?;
        Ok(path)
    }

    pub async fn extract(&self, pattern: &str, destination: &str) -> Result<Vec<String>> {
        let bytes = self.archive_bytes().await?;
        archive::extract_files(bytes, pattern, destination, &self.storage).await
    }
}

fn download_path(destination: &str, dataset_id: &str) -> String {
    let ends_with_separator =
        destination.ends_with('/') || destination.ends_with(std::path::MAIN_SEPARATOR);
    let is_dir = ends_with_separator
        || (!archive::is_remote_path(destination)
            && Path::new(archive::local_path(destination)).is_dir());
    if !is_dir {
        return destination.to_owned();
    }

    let dir = destination.trim_end_matches(['/', std::path::MAIN_SEPARATOR]);
    if dir.is_empty() && !destination.is_empty() {
        return format!("/{dataset_id}.zip");
    }
    format!("{dir}/{dataset_id}.zip")
}
