use std::sync::LazyLock;

use chrono::NaiveDate;
use scraper::{ElementRef, Node, Selector};
use url::Url;

use crate::formats::{Dataset, FACTSHEET_LABEL, Link};

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".dataset-title"));
static FORMATS: LazyLock<Selector> = LazyLock::new(|| selector(".formats"));
static FORMAT_LABEL: LazyLock<Selector> = LazyLock::new(|| selector(".dh-label"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| selector(".content"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static css selector is valid")
}

/// Why a single dataset fragment could not be turned into a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RecordError(String);

impl RecordError {
    fn missing_element(selector: &str) -> Self {
        Self(format!("Missing required element: {selector}"))
    }

    fn missing_field(field: &str) -> Self {
        Self(format!("Missing required field: {field}"))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Parses one `.accordion.ui` fragment. Relative hrefs are resolved against `base`.
pub fn parse_dataset(fragment: ElementRef<'_>, base: &Url) -> Result<Dataset, RecordError> {
    let dataset_id = fragment.value().attr("id").unwrap_or_default().to_owned();

    let title_span = select_one(fragment, &TITLE, ".dataset-title")?;
    let content = select_one(fragment, &CONTENT, ".content")?;
    let formats = select_one(title_span, &FORMATS, ".formats")?;
    let format_label = select_one(formats, &FORMAT_LABEL, ".dh-label")?;

    let title = title_span
        .text()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or_else(|| RecordError::missing_field("title"))?
        .to_owned();
    let format = stripped_text(format_label);
    let superseded = formats.text().collect::<String>().contains("Superseded");

    let published = extract_field(content, "Published:", parse_date);
    let temporal_coverage = extract_field(content, "Temporal coverage:", parse_years)
        .ok_or_else(|| RecordError::missing_field("temporal coverage"))?;
    if temporal_coverage.0 > temporal_coverage.1 {
        return Err(RecordError(format!(
            "Invalid temporal coverage: {}-{}",
            temporal_coverage.0, temporal_coverage.1
        )));
    }

    let mut links = collect_links(&dataset_id, content, base)?;
    let factsheet_idx = links
        .iter()
        .position(|link| link.label == FACTSHEET_LABEL)
        .ok_or_else(|| RecordError::missing_field(FACTSHEET_LABEL))?;
    let factsheet = links.remove(factsheet_idx).url;

    Ok(Dataset {
        dataset_id,
        title,
        format,
        superseded,
        published,
        temporal_coverage,
        factsheet,
        links,
    })
}

/// Parses dates like `9 May 2019` or `1 Jul 2025`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d %b %Y").ok()
}

/// Parses year ranges like `2005-2024`.
pub fn parse_years(text: &str) -> Option<(i32, i32)> {
    let mut parts = text.split('-');
    let start = parts.next()?.trim().parse().ok()?;
    let end = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((start, end))
}

fn select_one<'a>(
    parent: ElementRef<'a>,
    selector: &Selector,
    css: &str,
) -> Result<ElementRef<'a>, RecordError> {
    parent
        .select(selector)
        .next()
        .ok_or_else(|| RecordError::missing_element(css))
}

fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// `<strong>Label:</strong> value`: the value is whatever node follows the <strong>.
fn extract_field<T>(
    container: ElementRef<'_>,
    label: &str,
    parser: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    for strong in container.select(&STRONG) {
        if !strong.text().collect::<String>().contains(label) {
            continue;
        }
        let Some(sibling) = strong.next_sibling() else {
            continue;
        };
        let value = match sibling.value() {
            Node::Text(text) => text.trim().to_owned(),
            Node::Element(_) => ElementRef::wrap(sibling)
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default(),
            _ => return None,
        };
        return parser(value.trim());
    }
    None
}

// Labels keep first-seen order; a repeated label replaces the earlier href.
fn collect_links(
    dataset_id: &str,
    content: ElementRef<'_>,
    base: &Url,
) -> Result<Vec<Link>, RecordError> {
    let mut links: Vec<Link> = Vec::new();
    for anchor in content.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let label = stripped_text(anchor);
        let url = base
            .join(href.trim())
            .map_err(|_| RecordError(format!("Invalid URL for link '{label}': {href}")))?;

        match links.iter_mut().find(|link| link.label == label) {
            Some(existing) => {
                tracing::warn!(
                    dataset_id,
                    label = %label,
                    previous = %existing.url,
                    replacement = %url,
                    "duplicate link label; keeping the later href"
                );
                existing.url = url;
            }
            None => links.push(Link { label, url }),
        }
    }
    Ok(links)
}
