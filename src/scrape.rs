use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use crate::browser::{BrowserSession, WebDriverSession};
use crate::config::ScrapeConfig;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::formats::{DatasetScrapeResult, ParseError};
use crate::parse::{parse_dataset, selector};

pub const FRAGMENT_SELECTOR: &str = ".datasets-tab .accordion.ui";
pub const TAB_ITEM_SELECTOR: &str = ".datasets-tab .ui.menu .item";

/// Tab contents re-render client-side with no readiness signal to wait on.
pub const SETTLE_DELAY: Duration = Duration::from_millis(300);
const LOAD_POLL_ATTEMPTS: usize = 20;

static FRAGMENT: LazyLock<Selector> = LazyLock::new(|| selector(FRAGMENT_SELECTOR));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrapeMode {
    /// Single GET; only entries rendered server-side.
    #[default]
    Simple,
    /// Browser session clicking through every tab.
    Full,
}

/// Accumulates parse results across one or more documents, skipping ids already seen.
#[derive(Debug, Default)]
struct Collector {
    seen: HashSet<String>,
    result: DatasetScrapeResult,
}

impl Collector {
    fn collect(&mut self, html: &str, base: &Url) -> usize {
        let document = Html::parse_document(html);
        let mut added = 0;
        for fragment in document.select(&FRAGMENT) {
            let Some(id) = fragment.value().attr("id") else {
                tracing::debug!("skipping dataset fragment without id");
                continue;
            };
            if !self.seen.insert(id.to_owned()) {
                continue;
            }
            added += 1;

            match parse_dataset(fragment, base) {
                Ok(dataset) => {
                    tracing::debug!(dataset_id = id, "parsed dataset");
                    self.result.datasets.push(dataset);
                }
                Err(err) => {
                    tracing::debug!(dataset_id = id, %err, "dataset parse failed");
                    self.result.errors.push(ParseError {
                        dataset_id: Some(id.to_owned()),
                        message: err.message().to_owned(),
                    });
                }
            }
        }
        added
    }

    fn finish(self) -> DatasetScrapeResult {
        self.result
    }
}

/// Parses every dataset fragment of one document.
pub fn parse_document(html: &str, base: &Url) -> DatasetScrapeResult {
    let mut collector = Collector::default();
    collector.collect(html, base);
    collector.finish()
}

pub fn has_dataset_fragments(html: &str) -> bool {
    Html::parse_document(html).select(&FRAGMENT).next().is_some()
}

pub async fn fetch_datasets_simple(
    fetcher: &Fetcher,
    config: &ScrapeConfig,
) -> Result<DatasetScrapeResult> {
    tracing::info!(url = %config.root_url, "fetching datasets (simple)");
    let (html, final_url) = fetcher.get_html(&config.root_url).await?;
    let result = parse_document(&html, &final_url);
    tracing::info!(
        datasets = result.datasets.len(),
        errors = result.errors.len(),
        "scrape finished"
    );
    Ok(result)
}

pub async fn fetch_datasets(
    fetcher: &Fetcher,
    config: &ScrapeConfig,
    mode: ScrapeMode,
) -> Result<DatasetScrapeResult> {
    match mode {
        ScrapeMode::Simple => fetch_datasets_simple(fetcher, config).await,
        ScrapeMode::Full => {
            let mut session = WebDriverSession::start(&config.webdriver, config.timeout).await?;
            fetch_datasets_full(&mut session, config).await
        }
    }
}

/// Loads the root page in `session`, clicks through every tab and collects all entries.
/// The session is closed before returning, on success and on failure alike.
pub async fn fetch_datasets_full<S: BrowserSession>(
    session: &mut S,
    config: &ScrapeConfig,
) -> Result<DatasetScrapeResult> {
    tracing::info!(url = %config.root_url, "fetching datasets (full)");
    let outcome = traverse_tabs(session, config).await;
    if let Err(err) = session.close().await {
        tracing::warn!(%err, "failed to close browser session");
    }
    let result = outcome?;
    tracing::info!(
        datasets = result.datasets.len(),
        errors = result.errors.len(),
        "scrape finished"
    );
    Ok(result)
}

async fn traverse_tabs<S: BrowserSession>(
    session: &mut S,
    config: &ScrapeConfig,
) -> Result<DatasetScrapeResult> {
    let base = Url::parse(&config.root_url).map_err(|source| Error::InvalidUrl {
        url: config.root_url.clone(),
        source,
    })?;

    session.load(&config.root_url).await?;
    let initial = wait_for_fragments(session, config).await?;

    let items = session.list_clickable_items(TAB_ITEM_SELECTOR).await?;
    let mut collector = Collector::default();
    if items.is_empty() {
        tracing::debug!("no tab items; parsing the loaded page once");
        collector.collect(&initial, &base);
        return Ok(collector.finish());
    }

    for (index, item) in items.iter().enumerate() {
        session.click(item).await?;
        session.wait(SETTLE_DELAY).await;
        let html = session.current_document().await?;
        let added = collector.collect(&html, &base);
        tracing::debug!(tab = index, added, "tab parsed");
    }

    Ok(collector.finish())
}

async fn wait_for_fragments<S: BrowserSession>(
    session: &mut S,
    config: &ScrapeConfig,
) -> Result<String> {
    for attempt in 0..LOAD_POLL_ATTEMPTS {
        let html = session.current_document().await?;
        if has_dataset_fragments(&html) {
            return Ok(html);
        }
        tracing::trace!(attempt, "dataset container not rendered yet");
        session.wait(SETTLE_DELAY).await;
    }
    Err(Error::ContainerNotFound {
        url: config.root_url.clone(),
        selector: FRAGMENT_SELECTOR.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    fn accordion(id: &str, coverage: Option<&str>) -> String {
        let coverage = coverage
            .map(|c| format!("<p><strong>Temporal coverage:</strong> {c}</p>"))
            .unwrap_or_default();
        format!(
            r#"<div class="accordion ui" id="{id}">
  <span class="dataset-title">Dataset {id}<span class="formats"><span class="dh-label">csv</span></span></span>
  <div class="content">{coverage}<a href="https://example.com/{id}/factsheet">Metadata Factsheet</a></div>
</div>"#
        )
    }

    fn page(accordions: &[String]) -> String {
        format!(
            r#"<html><body><div class="datasets-tab"><div class="ui menu"></div>{}</div></body></html>"#,
            accordions.concat()
        )
    }

    fn base() -> Url {
        Url::parse("https://example.com/root").unwrap()
    }

    /// In-process session whose tabs each render a fixed document.
    struct FakeSession {
        tabs: Vec<String>,
        active: Option<usize>,
        initial: String,
        loaded: bool,
        closed: bool,
        waits: usize,
    }

    impl FakeSession {
        fn new(initial: String, tabs: Vec<String>) -> Self {
            Self {
                tabs,
                active: None,
                initial,
                loaded: false,
                closed: false,
                waits: 0,
            }
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        type Item = usize;

        async fn load(&mut self, _url: &str) -> Result<()> {
            self.loaded = true;
            Ok(())
        }

        async fn list_clickable_items(&mut self, selector: &str) -> Result<Vec<usize>> {
            assert_eq!(selector, TAB_ITEM_SELECTOR);
            Ok((0..self.tabs.len()).collect())
        }

        async fn click(&mut self, item: &usize) -> Result<()> {
            self.active = Some(*item);
            Ok(())
        }

        async fn wait(&mut self, _delay: Duration) {
            self.waits += 1;
        }

        async fn current_document(&mut self) -> Result<String> {
            assert!(self.loaded, "document read before load");
            Ok(match self.active {
                Some(idx) => self.tabs[idx].clone(),
                None => self.initial.clone(),
            })
        }

        async fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn parse_document_partitions_successes_and_failures() {
        let html = page(&[
            accordion("a", Some("2005-2024")),
            accordion("b", None),
            accordion("c", Some("2005-2023")),
            accordion("d", Some("2005")),
        ]);
        let result = parse_document(&html, &base());

        let ids: Vec<_> = result.datasets.iter().map(|d| d.dataset_id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].dataset_id.as_deref(), Some("b"));
        assert_eq!(result.errors[1].dataset_id.as_deref(), Some("d"));
        assert!(
            result
                .errors
                .iter()
                .all(|e| e.message.to_lowercase().contains("temporal coverage"))
        );
    }

    #[test]
    fn fragments_without_id_or_outside_container_are_skipped() {
        let html = format!(
            r#"<html><body>{}<div class="datasets-tab">{}</div></body></html>"#,
            accordion("outside", Some("2005-2024")),
            accordion("inside", Some("2005-2024")).replace(r#" id="inside""#, ""),
        );
        let result = parse_document(&html, &base());
        assert!(result.datasets.is_empty());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn full_mode_dedupes_across_tabs_in_traversal_order() -> anyhow::Result<()> {
        let tab1 = page(&[accordion("new", Some("2005-2024")), accordion("old", Some("2005-2023"))]);
        let tab2 = page(&[accordion("old", Some("2005-2023")), accordion("older", Some("2005-2022"))]);
        let tab3 = page(&[accordion("broken", None), accordion("new", Some("2005-2024"))]);
        let mut session = FakeSession::new(tab1.clone(), vec![tab1, tab2, tab3]);

        let config = ScrapeConfig::default().with_root_url("https://example.com/root");
        let result = fetch_datasets_full(&mut session, &config).await?;

        let ids: Vec<_> = result.datasets.iter().map(|d| d.dataset_id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "older"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].dataset_id.as_deref(), Some("broken"));
        assert!(session.closed);
        assert_eq!(session.waits, 3);
        Ok(())
    }

    #[tokio::test]
    async fn full_mode_without_tabs_parses_loaded_page() -> anyhow::Result<()> {
        let initial = page(&[accordion("only", Some("2005-2024"))]);
        let mut session = FakeSession::new(initial, Vec::new());

        let config = ScrapeConfig::default().with_root_url("https://example.com/root");
        let result = fetch_datasets_full(&mut session, &config).await?;
        assert_eq!(result.datasets.len(), 1);
        assert!(session.closed);
        Ok(())
    }

    #[tokio::test]
    async fn full_mode_fails_when_container_never_renders() {
        let mut session = FakeSession::new("<html><body></body></html>".to_owned(), Vec::new());
        let config = ScrapeConfig::default().with_root_url("https://example.com/root");

        let err = fetch_datasets_full(&mut session, &config)
            .await
            .expect_err("container is missing");
        assert!(matches!(err, Error::ContainerNotFound { .. }));
        assert!(session.closed);
        assert_eq!(session.waits, LOAD_POLL_ATTEMPTS);
    }
}
