//! Bounded worker pool that fetches chapter pages and extracts their text.
//!
//! A fixed number of workers pull chapters from one FIFO queue. Each chapter
//! moves through the [`ChapterLedger`] exactly once; results are keyed by the
//! chapter's index so completion order never affects assembly order. The run
//! is over when every worker task has been joined, not when a counter hits a
//! target.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use harvest_core::{Chapter, ChapterContent, ChapterLedger, SiteModel};
use harvest_logging::{harvest_debug, harvest_error, harvest_warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::events::{EngineEvent, ProgressSink};
use crate::extract::{extract_chapter_body, parse_selector, BodyExtraction};
use crate::fetch::{fetch_html, PageFetcher};

pub const DEFAULT_CONCURRENCY: usize = 8;

/// What to do when a chapter page lacks the content container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMissPolicy {
    /// Stop dispatching and fail the run.
    #[default]
    AbortRun,
    /// Mark that chapter failed and keep going.
    SkipChapter,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub miss_policy: ContentMissPolicy,
    /// Forced charset label for chapter pages.
    pub encoding: Option<String>,
    /// Chapter titles are numbered from here.
    pub last_chapter: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            miss_policy: ContentMissPolicy::default(),
            encoding: None,
            last_chapter: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid content selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("content selector `{selector}` matched nothing on chapter {index} ({url})")]
    SelectorMiss {
        index: usize,
        url: String,
        selector: String,
    },
    #[error("{} chapters never reached a final state", missing.len())]
    Incomplete { missing: Vec<usize> },
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub contents: BTreeMap<usize, ChapterContent>,
    pub ledger: ChapterLedger,
    /// Dispatch stopped early on request; pending chapters were never fetched.
    pub cancelled: bool,
}

pub struct ChapterPipeline {
    fetcher: Arc<dyn PageFetcher>,
    settings: PipelineSettings,
}

struct Shared {
    fetcher: Arc<dyn PageFetcher>,
    model: Arc<SiteModel>,
    settings: PipelineSettings,
    sink: Arc<dyn ProgressSink>,
    queue: Mutex<VecDeque<Chapter>>,
    ledger: Mutex<ChapterLedger>,
    contents: Mutex<BTreeMap<usize, ChapterContent>>,
    fatal: Mutex<Option<PipelineError>>,
    stop: CancellationToken,
    total: usize,
}

impl ChapterPipeline {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: PipelineSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        model: Arc<SiteModel>,
        chapters: Vec<Chapter>,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutput, PipelineError> {
        if let Err(message) = parse_selector(model.content_selector()) {
            return Err(PipelineError::InvalidSelector {
                selector: model.content_selector().to_string(),
                message,
            });
        }

        let total = chapters.len();
        let workers = self.settings.concurrency.clamp(1, total.max(1));
        let shared = Arc::new(Shared {
            fetcher: Arc::clone(&self.fetcher),
            model,
            settings: self.settings.clone(),
            sink,
            ledger: Mutex::new(ChapterLedger::new(chapters.iter().map(|c| c.index))),
            queue: Mutex::new(chapters.into()),
            contents: Mutex::new(BTreeMap::new()),
            fatal: Mutex::new(None),
            stop: cancel.child_token(),
            total,
        });

        harvest_debug!("fetching {total} chapters with {workers} workers");
        let mut set = JoinSet::new();
        for _ in 0..workers {
            set.spawn(worker(Arc::clone(&shared)));
        }
        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                harvest_error!("chapter worker ended abnormally: {err}");
            }
        }

        if let Some(fatal) = lock(&shared.fatal).take() {
            return Err(fatal);
        }

        let ledger = lock(&shared.ledger).clone();
        let contents = std::mem::take(&mut *lock(&shared.contents));
        let cancelled = cancel.is_cancelled() && !ledger.is_complete();
        if !cancelled && !ledger.is_complete() {
            let mut missing = ledger.pending();
            missing.extend(ledger.in_flight());
            missing.sort_unstable();
            return Err(PipelineError::Incomplete { missing });
        }

        Ok(PipelineOutput {
            contents,
            ledger,
            cancelled,
        })
    }
}

async fn worker(shared: Arc<Shared>) {
    loop {
        if shared.stop.is_cancelled() {
            break;
        }
        let Some(chapter) = lock(&shared.queue).pop_front() else {
            break;
        };
        if let Err(err) = lock(&shared.ledger).begin(chapter.index) {
            harvest_error!("{err}");
            continue;
        }

        let fetched = fetch_html(
            shared.fetcher.as_ref(),
            &chapter.url,
            shared.settings.encoding.as_deref(),
        )
        .await;

        match fetched {
            Ok(html) => handle_page(&shared, &chapter, &html),
            Err(err) => {
                harvest_warn!("chapter {} ({}) dropped: {err}", chapter.index, chapter.url);
                fail(&shared, &chapter, err.to_string());
            }
        }

        let completed = lock(&shared.ledger).settled();
        shared.sink.emit(EngineEvent::ChapterProgress {
            completed,
            total: shared.total,
        });
    }
}

fn handle_page(shared: &Shared, chapter: &Chapter, html: &str) {
    let selector = shared.model.content_selector();
    match extract_chapter_body(html, selector) {
        Ok(BodyExtraction::Found(body)) => {
            let chars = body.chars().count();
            let content = ChapterContent::new(chapter, shared.settings.last_chapter, body);
            lock(&shared.contents).insert(chapter.index, content);
            if let Err(err) = lock(&shared.ledger).mark_parsed(chapter.index) {
                harvest_error!("{err}");
            }
            harvest_debug!("chapter {} parsed, {chars} chars", chapter.index);
            shared.sink.emit(EngineEvent::ChapterDone {
                index: chapter.index,
                name: chapter.name.clone(),
                chars,
            });
        }
        Ok(BodyExtraction::NoMatch) => {
            harvest_error!(
                "`{selector}` matched nothing on chapter {} ({})",
                chapter.index,
                chapter.url
            );
            fail(shared, chapter, format!("content selector `{selector}` matched nothing"));
            if shared.settings.miss_policy == ContentMissPolicy::AbortRun {
                lock(&shared.fatal).get_or_insert_with(|| PipelineError::SelectorMiss {
                    index: chapter.index,
                    url: chapter.url.clone(),
                    selector: selector.to_string(),
                });
                shared.stop.cancel();
            }
        }
        Err(message) => fail(shared, chapter, message),
    }
}

fn fail(shared: &Shared, chapter: &Chapter, reason: String) {
    if let Err(err) = lock(&shared.ledger).mark_failed(chapter.index, reason.clone()) {
        harvest_error!("{err}");
    }
    shared.sink.emit(EngineEvent::ChapterFailed {
        index: chapter.index,
        reason,
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
