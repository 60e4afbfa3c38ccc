use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, OnceLock};

use futures_util::future::join_all;
use harvest_core::{normalize_url, resolve_reference, ImageDescriptor, SearchDepth};
use harvest_logging::{harvest_debug, harvest_info, harvest_warn};
use regex::Regex;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::datauri::{is_data_uri, parse_data_uri};
use crate::events::{EngineEvent, ProgressSink};
use crate::fetch::{fetch_html, PageFetcher};
use crate::FetchError;

pub const DEFAULT_PROBE_BATCH: usize = 5;

/// Embedded images and outgoing links of one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    pub images: Vec<ImageDescriptor>,
    pub links: Vec<String>,
}

/// Collect `<img>` sources, inline `background` images and, when
/// `follow_links` is set, anchor targets. Each list is de-duplicated in
/// first-seen order.
pub fn scan_page(html: &str, page_url: &Url, follow_links: bool) -> PageScan {
    let document = Html::parse_document(html);
    let mut scan = PageScan::default();
    let mut seen = HashSet::new();

    if let Ok(img) = Selector::parse("img[src]") {
        for element in document.select(&img) {
            let Some(src) = element.value().attr("src") else {
                continue;
            };
            let Some(url) = image_url(src, page_url) else {
                continue;
            };
            if seen.insert(url.clone()) {
                let width = dimension(element.value().attr("width"));
                let height = dimension(element.value().attr("height"));
                scan.images.push(descriptor(url, width, height));
            }
        }
    }

    if let Ok(styled) = Selector::parse("[style]") {
        for element in document.select(&styled) {
            let style = element.value().attr("style").unwrap_or_default();
            if !style.to_ascii_lowercase().contains("background") {
                continue;
            }
            let Some(pattern) = css_url_pattern() else {
                break;
            };
            for capture in pattern.captures_iter(style) {
                let Some(url) = image_url(&capture[1], page_url) else {
                    continue;
                };
                if seen.insert(url.clone()) {
                    scan.images.push(descriptor(url, 0, 0));
                }
            }
        }
    }

    if follow_links {
        let mut seen_links = HashSet::new();
        if let Ok(anchor) = Selector::parse("a[href]") {
            for element in document.select(&anchor) {
                let Some(url) = element
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_reference(href, page_url))
                else {
                    continue;
                };
                if !matches!(url.scheme(), "http" | "https" | "ftp") {
                    continue;
                }
                let Some(link) = normalize_url(url.as_str()) else {
                    continue;
                };
                if seen_links.insert(link.clone()) {
                    scan.links.push(link);
                }
            }
        }
    }

    scan
}

fn css_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).ok())
        .as_ref()
}

fn image_url(raw: &str, page_url: &Url) -> Option<String> {
    let trimmed = raw.trim();
    if is_data_uri(trimmed) {
        return Some(trimmed.to_string());
    }
    resolve_reference(trimmed, page_url).map(String::from)
}

fn dimension(raw: Option<&str>) -> u32 {
    raw.map(|value| value.trim().trim_end_matches("px"))
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

/// Inline `data:` images are measured on the spot; the rest are left for
/// [`LinkExpansionCollector::measure`].
fn descriptor(url: String, width: u32, height: u32) -> ImageDescriptor {
    let mut image = ImageDescriptor::embedded(url, width, height);
    if let Some(data) = parse_data_uri(&image.url) {
        image.size = Some(data.bytes.len() as u64);
        image.content_type = data.mime;
    }
    image
}

/// URLs already processed and the deepest level they were processed at.
/// Lives as long as the caller keeps it; `reset` forgets everything.
#[derive(Debug, Clone, Default)]
pub struct CollectorSession {
    seen: HashMap<String, SearchDepth>,
}

impl CollectorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `url` should be processed at `depth`: it is new, or was
    /// only processed at a shallower level.
    pub fn admit(&mut self, url: &str, depth: SearchDepth) -> bool {
        let key = normalize_url(url).unwrap_or_else(|| url.to_string());
        match self.seen.get(&key) {
            Some(&previous) if previous >= depth => false,
            _ => {
                self.seen.insert(key, depth);
                true
            }
        }
    }

    pub fn depth_of(&self, url: &str) -> Option<SearchDepth> {
        let key = normalize_url(url).unwrap_or_else(|| url.to_string());
        self.seen.get(&key).copied()
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// An image and the page it was found on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundImage {
    pub image: ImageDescriptor,
    pub page: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub images: Vec<FoundImage>,
    pub pages_scanned: usize,
    pub probes: usize,
    pub probe_failures: usize,
    pub cancelled: bool,
}

/// Outcome of [`LinkExpansionCollector::measure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasureReport {
    pub checked: usize,
    pub failures: usize,
    pub cancelled: bool,
}

struct Candidate {
    url: String,
    page: String,
}

/// Finds images on seed pages and, depending on the search depth, on the
/// pages they link to. Links are probed in fixed-size batches; the next
/// batch starts only after the previous one has been reported.
pub struct LinkExpansionCollector {
    fetcher: Arc<dyn PageFetcher>,
    batch_size: usize,
    session: CollectorSession,
}

impl LinkExpansionCollector {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            batch_size: DEFAULT_PROBE_BATCH,
            session: CollectorSession::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn session(&self) -> &CollectorSession {
        &self.session
    }

    pub fn reset_session(&mut self) {
        self.session.reset();
    }

    pub async fn collect(
        &mut self,
        seeds: &[String],
        depth: SearchDepth,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> CollectReport {
        let mut report = CollectReport::default();
        let mut found = HashSet::new();
        let mut queue = VecDeque::new();

        for seed in seeds {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            if !self.session.admit(seed, depth) {
                harvest_debug!("{seed} already processed at this depth");
                continue;
            }
            let html = match fetch_html(self.fetcher.as_ref(), seed, None).await {
                Ok(html) => html,
                Err(err) => {
                    harvest_warn!("seed page {seed} dropped: {err}");
                    continue;
                }
            };
            let Ok(page_url) = Url::parse(seed) else {
                continue;
            };
            let scan = scan_page(&html, &page_url, depth.follows_links());
            report.pages_scanned += 1;
            harvest_info!(
                "{seed}: {} images, {} links",
                scan.images.len(),
                scan.links.len()
            );
            record(&mut report, &mut found, sink, scan.images, seed);
            queue.extend(scan.links.into_iter().map(|url| Candidate {
                url,
                page: seed.clone(),
            }));
        }

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                let Some(candidate) = queue.pop_front() else {
                    break;
                };
                if self.session.admit(&candidate.url, depth) {
                    batch.push(candidate);
                }
            }
            if batch.is_empty() {
                continue;
            }

            let fetcher = self.fetcher.as_ref();
            let results = join_all(
                batch
                    .iter()
                    .map(|candidate| probe(fetcher, &candidate.url, depth)),
            )
            .await;

            for (candidate, result) in batch.iter().zip(results) {
                report.probes += 1;
                match result {
                    Ok(images) => record(&mut report, &mut found, sink, images, &candidate.page),
                    Err(err) => {
                        report.probe_failures += 1;
                        harvest_debug!("probe {} failed: {err}", candidate.url);
                    }
                }
            }
            harvest_debug!("batch of {} probed, {} links remaining", batch.len(), queue.len());
            sink.emit(EngineEvent::LinksRemaining(queue.len()));
        }

        report
    }
}

impl LinkExpansionCollector {
    /// HEAD every image whose size is still unknown, `batch_size` at a
    /// time, and fill in its size and content type. A failed probe leaves
    /// the image unmeasured.
    pub async fn measure(
        &self,
        images: &mut [FoundImage],
        cancel: &CancellationToken,
    ) -> MeasureReport {
        let mut report = MeasureReport::default();
        let unmeasured: Vec<usize> = images
            .iter()
            .enumerate()
            .filter(|(_, found)| found.image.size.is_none() && !is_data_uri(&found.image.url))
            .map(|(position, _)| position)
            .collect();

        for batch in unmeasured.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let fetcher = self.fetcher.as_ref();
            let listed: &[FoundImage] = images;
            let results = join_all(
                batch
                    .iter()
                    .map(|&position| fetcher.head(&listed[position].image.url)),
            )
            .await;

            for (&position, result) in batch.iter().zip(results) {
                report.checked += 1;
                let image = &mut images[position].image;
                match result {
                    Ok(head) => {
                        if head.content_length.is_some() {
                            image.size = head.content_length;
                        }
                        if let Some(mime) = head.mime().filter(|mime| !mime.is_empty()) {
                            image.content_type = Some(mime);
                        }
                    }
                    Err(err) => {
                        report.failures += 1;
                        harvest_debug!("measuring {} failed: {err}", image.url);
                    }
                }
            }
        }
        harvest_debug!(
            "measured {} images, {} failed",
            report.checked,
            report.failures
        );
        report
    }
}

fn record(
    report: &mut CollectReport,
    found: &mut HashSet<String>,
    sink: &dyn ProgressSink,
    images: Vec<ImageDescriptor>,
    page: &str,
) {
    let fresh: Vec<ImageDescriptor> = images
        .into_iter()
        .filter(|image| found.insert(image.url.clone()))
        .collect();
    if fresh.is_empty() {
        return;
    }
    sink.emit(EngineEvent::ImagesFound(fresh.clone()));
    report.images.extend(fresh.into_iter().map(|image| FoundImage {
        image,
        page: page.to_string(),
    }));
}

/// HEAD `url`: an image answer is the image itself; an HTML answer is
/// fetched and scanned when the depth allows parsing linked pages.
async fn probe(
    fetcher: &dyn PageFetcher,
    url: &str,
    depth: SearchDepth,
) -> Result<Vec<ImageDescriptor>, FetchError> {
    let head = fetcher.head(url).await?;
    let mime = head.mime().unwrap_or_default();
    if mime.starts_with("image/") {
        return Ok(vec![ImageDescriptor {
            url: url.to_string(),
            width: 0,
            height: 0,
            size: head.content_length,
            content_type: Some(mime),
        }]);
    }
    if depth.parses_linked_pages() && is_html(&mime) {
        let html = fetch_html(fetcher, url, None).await?;
        let page_url = Url::parse(&head.final_url)
            .or_else(|_| Url::parse(url))
            .map_err(|err| FetchError::new(crate::FailureKind::InvalidUrl, err.to_string()))?;
        return Ok(scan_page(&html, &page_url, false).images);
    }
    Ok(Vec::new())
}

fn is_html(mime: &str) -> bool {
    mime == "text/html" || mime == "application/xhtml+xml"
}
