use harvest_core::{Chapter, ConfigError, SiteModel};
use harvest_logging::{harvest_error, harvest_info, harvest_warn};
use scraper::{Html, Selector};

use crate::extract::{extract_first_text, parse_selector};
use crate::fetch::{fetch_html, PageFetcher};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("chapter list selector `{selector}` matched nothing on {page}")]
    SelectorMiss { page: String, selector: String },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("no chapters found on any root page")]
    NoChapters,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Walks a book's root pages, in order, and collects its table of contents.
pub struct ChapterListResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    encoding: Option<&'a str>,
}

impl<'a> ChapterListResolver<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self {
            fetcher,
            encoding: None,
        }
    }

    /// Force a charset label for every fetched root page.
    pub fn with_encoding(mut self, encoding: Option<&'a str>) -> Self {
        self.encoding = encoding;
        self
    }

    /// Root pages are fetched one after another; chapter indices run across
    /// all of them. A page that cannot be fetched is skipped, a page without
    /// the chapter list container aborts the whole resolve.
    pub async fn resolve(
        &self,
        model: &SiteModel,
        root_pages: &[String],
    ) -> Result<Vec<Chapter>, ResolveError> {
        let mut chapters = Vec::new();
        for root_page in root_pages {
            let html = match fetch_html(self.fetcher, root_page, self.encoding).await {
                Ok(html) => html,
                Err(err) => {
                    harvest_warn!("skipping root page {root_page}: {err}");
                    continue;
                }
            };
            let found = chapters_from_page(&html, model, root_page, chapters.len())?;
            harvest_info!("{root_page}: {} chapters", found.len());
            chapters.extend(found);
        }

        if chapters.is_empty() {
            return Err(ResolveError::NoChapters);
        }
        Ok(chapters)
    }
}

/// Parse one root page. Indices start at `first_index`.
pub fn chapters_from_page(
    html: &str,
    model: &SiteModel,
    root_page: &str,
    first_index: usize,
) -> Result<Vec<Chapter>, ResolveError> {
    let pattern = model.link_pattern()?;
    let container_selector = selector(model.chapter_list_selector())?;
    let anchor_selector = selector("a")?;

    let document = Html::parse_document(html);
    let Some(container) = document.select(&container_selector).next() else {
        harvest_error!(
            "model {}: `{}` not found on {root_page}",
            model.name(),
            model.chapter_list_selector()
        );
        return Err(ResolveError::SelectorMiss {
            page: root_page.to_string(),
            selector: model.chapter_list_selector().to_string(),
        });
    };

    let mut chapters = Vec::new();
    for anchor in container.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = clean_href(href);
        if !pattern.is_match(&href) {
            continue;
        }
        chapters.push(Chapter {
            name: extract_first_text(anchor),
            url: model.resolve_chapter_url(&href, root_page),
            index: first_index + chapters.len(),
        });
    }
    Ok(chapters)
}

fn clean_href(raw: &str) -> String {
    raw.replace("&nbsp;", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn selector(raw: &str) -> Result<Selector, ResolveError> {
    parse_selector(raw).map_err(|message| ResolveError::InvalidSelector {
        selector: raw.to_string(),
        message,
    })
}
