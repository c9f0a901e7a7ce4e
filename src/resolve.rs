use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::parse::selector;

pub const DOWNLOAD_ALL_LABEL: &str = "Download all files";

static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));

/// Finds the archive link on a "Direct download" page: the `<a>` wrapping a
/// `<span>Download all files</span>`. The span text must match exactly.
pub fn resolve_download_url_from_html(html: &str, base: &Url) -> Result<String> {
    let document = Html::parse_document(html);

    for span in document.select(&SPAN) {
        if span.text().collect::<String>() != DOWNLOAD_ALL_LABEL {
            continue;
        }
        let Some(anchor) = span
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "a")
        else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = base.join(href.trim()).map_err(|source| Error::InvalidUrl {
            url: href.to_owned(),
            source,
        })?;
        return Ok(url.to_string());
    }

    Err(Error::LinkNotFound {
        label: DOWNLOAD_ALL_LABEL.to_owned(),
    })
}

/// Fetches `download_page` and resolves it to the direct archive URL.
pub async fn resolve_download_url(fetcher: &Fetcher, download_page: &str) -> Result<String> {
    let (html, final_url) = fetcher.get_html(download_page).await?;
    let url = resolve_download_url_from_html(&html, &final_url)?;
    tracing::info!(page = %download_page, archive = %url, "resolved archive url");
    Ok(url)
}
