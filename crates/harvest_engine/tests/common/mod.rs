#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use harvest_core::{Chapter, SiteModel, SiteModelSpec};
use harvest_engine::{
    EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, PageFetcher, ProbeOutput,
    ProgressSink,
};

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct FakePage {
    body: String,
    content_type: String,
    delay: Duration,
}

/// In-process fetcher with per-URL delays that records request order and
/// the highest number of concurrent requests.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FakePage>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.page_with(url, body, "text/html; charset=utf-8", Duration::ZERO)
    }

    pub fn slow_page(self, url: &str, body: &str, delay: Duration) -> Self {
        self.page_with(url, body, "text/html; charset=utf-8", delay)
    }

    pub fn page_with(mut self, url: &str, body: &str, content_type: &str, delay: Duration) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                body: body.to_string(),
                content_type: content_type.to_string(),
                delay,
            },
        );
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    async fn enter(&self, url: &str) -> Option<&FakePage> {
        self.requests.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let page = self.pages.get(url);
        let delay = page.map_or(Duration::ZERO, |p| p.delay);
        tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        page
    }
}

#[async_trait::async_trait]
impl PageFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let page = self
            .enter(url)
            .await
            .ok_or_else(|| FetchError::new(FailureKind::HttpStatus(404), "404 Not Found"))?;
        Ok(FetchOutput {
            body: Bytes::from(page.body.clone()),
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                content_type: Some(page.content_type.clone()),
                content_disposition: None,
                byte_len: page.body.len() as u64,
            },
        })
    }

    async fn head(&self, url: &str) -> Result<ProbeOutput, FetchError> {
        let page = self
            .enter(url)
            .await
            .ok_or_else(|| FetchError::new(FailureKind::HttpStatus(404), "404 Not Found"))?;
        Ok(ProbeOutput {
            final_url: url.to_string(),
            content_type: Some(page.content_type.clone()),
            content_length: Some(page.body.len() as u64),
        })
    }
}

pub fn model(base_url: &str) -> SiteModel {
    SiteModel::new(
        "m",
        SiteModelSpec {
            base_url: base_url.to_string(),
            chapter_list_selector: "#list".to_string(),
            chapter_link_pattern: r"\d+\.html".to_string(),
            content_selector: "#content".to_string(),
        },
    )
}

pub fn chapter_url(index: usize) -> String {
    format!("http://x.com/book/{index}.html")
}

pub fn chapters(count: usize) -> Vec<Chapter> {
    (0..count)
        .map(|index| Chapter {
            name: format!("c{index}"),
            url: chapter_url(index),
            index,
        })
        .collect()
}

pub fn chapter_page(body: &str) -> String {
    format!(r#"<html><body><div id="content">{body}</div></body></html>"#)
}
