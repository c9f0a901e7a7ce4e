use std::time::Duration;

use crate::browser::WebDriverConfig;

/// EU ETS DataHub item page listing every published dataset version.
pub const ROOT_URL: &str =
    "https://www.eea.europa.eu/en/datahub/datahubitem-view/98f04097-26de-4fca-86c4-63834818c0c0";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_USER_AGENT: &str = concat!("euets/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub root_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub webdriver: WebDriverConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            root_url: ROOT_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            webdriver: WebDriverConfig::default(),
        }
    }
}

impl ScrapeConfig {
    #[must_use]
    pub fn with_root_url(mut self, url: impl Into<String>) -> Self {
        self.root_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_webdriver(mut self, webdriver: WebDriverConfig) -> Self {
        self.webdriver = webdriver;
        self
    }
}
