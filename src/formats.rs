use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DIRECT_DOWNLOAD_LABEL: &str = "Direct download";
pub const FACTSHEET_LABEL: &str = "Metadata Factsheet";

const TITLE_PREFIX: &str = "European Union Emissions Trading System (EU ETS) data from ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: Url,
}

/// One published dataset version as listed on the datahub page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: String,

    pub title: String,
    pub format: String,
    pub superseded: bool,

    pub published: Option<NaiveDate>,
    pub temporal_coverage: (i32, i32),

    pub factsheet: Url,
    pub links: Vec<Link>,
}

impl Dataset {
    pub fn link(&self, label: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.label == label)
    }

    /// Title without the boilerplate "EU ETS data from (the)" prefix.
    pub fn display_title(&self) -> &str {
        let title = self.title.strip_prefix(TITLE_PREFIX).unwrap_or(&self.title);
        title.strip_prefix("the ").unwrap_or(title)
    }

    pub fn short_id(&self) -> &str {
        match self.dataset_id.char_indices().nth(8) {
            Some((idx, _)) => &self.dataset_id[..idx],
            None => &self.dataset_id,
        }
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.dataset_id == id || self.dataset_id.starts_with(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub dataset_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetScrapeResult {
    pub datasets: Vec<Dataset>,
    pub errors: Vec<ParseError>,
}

impl DatasetScrapeResult {
    /// The newest entry that has not been superseded.
    pub fn current(&self) -> Option<&Dataset> {
        self.datasets.iter().find(|dataset| !dataset.superseded)
    }

    pub fn find(&self, id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|dataset| dataset.matches_id(id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    pub name: String,
    pub size: u64,
    pub file_type: String,
}
