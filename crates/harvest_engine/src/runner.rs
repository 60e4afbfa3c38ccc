//! One complete text run or image run, from task to saved output.

use std::path::PathBuf;
use std::sync::Arc;

use harvest_core::{
    assemble_book, AssemblyError, ChapterRange, ConfigError, ImageFilter, ModelRegistry,
    RangeError, RunPhase, RunSlot, SearchDepth, TaskConfig,
};
use harvest_logging::{harvest_info, harvest_warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::chapters::{ChapterListResolver, ResolveError};
use crate::collector::{FoundImage, LinkExpansionCollector};
use crate::events::{EngineEvent, ProgressSink};
use crate::fetch::PageFetcher;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::pipeline::{
    ChapterPipeline, ContentMissPolicy, PipelineError, PipelineSettings, DEFAULT_CONCURRENCY,
};
use crate::saver::{ImageSaver, SavedImage};

/// Asks the user a yes/no question and blocks until answered.
pub trait Confirm: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// Answers yes to everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _message: &str) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("another run is already in progress")]
    Busy,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone)]
pub struct TextRunSettings {
    pub concurrency: usize,
    pub miss_policy: ContentMissPolicy,
    /// `store` paths are relative to this directory.
    pub output_dir: PathBuf,
}

impl Default for TextRunSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            miss_policy: ContentMissPolicy::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// How many of the requested chapters made it into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub total_chapters: usize,
    pub range: ChapterRange,
    pub requested: usize,
    pub delivered: usize,
    pub failed: Vec<(usize, String)>,
    pub output: Option<PathBuf>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.delivered == self.requested
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRunOutcome {
    Finished(DeliveryReport),
    /// The selected range was empty.
    NothingToFetch { total: usize },
    /// The user said no at the confirmation prompt.
    Declined,
    /// Stopped on request; nothing was written.
    Cancelled(DeliveryReport),
}

/// `task` with `lastchap` moved past a fully delivered run, for resuming.
pub fn advance_task(task: &TaskConfig, report: &DeliveryReport) -> Option<TaskConfig> {
    (report.is_complete() && report.output.is_some()).then(|| task.advanced_to(report.range.end))
}

pub struct TextRunner {
    registry: Arc<ModelRegistry>,
    fetcher: Arc<dyn PageFetcher>,
    settings: TextRunSettings,
    slot: RunSlot,
}

impl TextRunner {
    pub fn new(
        registry: Arc<ModelRegistry>,
        fetcher: Arc<dyn PageFetcher>,
        settings: TextRunSettings,
        slot: RunSlot,
    ) -> Self {
        Self {
            registry,
            fetcher,
            settings,
            slot,
        }
    }

    pub async fn run(
        &self,
        task: &TaskConfig,
        confirm: &dyn Confirm,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<TextRunOutcome, RunError> {
        let _guard = self.slot.try_acquire().ok_or(RunError::Busy)?;
        let result = self.run_inner(task, confirm, Arc::clone(&sink), cancel).await;
        sink.emit(EngineEvent::Phase(RunPhase::Finished));
        result
    }

    async fn run_inner(
        &self,
        task: &TaskConfig,
        confirm: &dyn Confirm,
        sink: Arc<dyn ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<TextRunOutcome, RunError> {
        task.validate()?;
        let model = self.registry.get(&task.model)?;

        sink.emit(EngineEvent::Phase(RunPhase::ResolvingChapters));
        let chapters = ChapterListResolver::new(self.fetcher.as_ref())
            .with_encoding(task.encode.as_deref())
            .resolve(&model, &task.root_pages)
            .await?;
        let total = chapters.len();

        let range = ChapterRange::select(total, task.last_chapter, task.chapter_length)?;
        sink.emit(EngineEvent::ChaptersResolved { total, range });
        harvest_info!(
            "{}: {total} chapters, fetching {}..{} ({})",
            model.name(),
            range.start,
            range.end,
            range.count
        );
        if range.is_empty() {
            return Ok(TextRunOutcome::NothingToFetch { total });
        }

        sink.emit(EngineEvent::Phase(RunPhase::AwaitingConfirmation));
        let question = format!(
            "{total} chapters found. Fetch chapters {} to {} ({} chapters) into {}?",
            range.start + 1,
            range.end,
            range.count,
            task.store
        );
        if !confirm.confirm(&question) {
            harvest_info!("run declined");
            return Ok(TextRunOutcome::Declined);
        }

        sink.emit(EngineEvent::Phase(RunPhase::FetchingChapters));
        let selected = chapters.get(range.indices()).unwrap_or_default().to_vec();
        let pipeline = ChapterPipeline::new(
            Arc::clone(&self.fetcher),
            PipelineSettings {
                concurrency: self.settings.concurrency,
                miss_policy: self.settings.miss_policy,
                encoding: task.encode.clone(),
                last_chapter: range.start,
            },
        );
        let output = pipeline
            .run(Arc::clone(&model), selected, Arc::clone(&sink), cancel)
            .await?;

        let mut report = DeliveryReport {
            total_chapters: total,
            range,
            requested: output.ledger.requested(),
            delivered: output.contents.len(),
            failed: output.ledger.failures(),
            output: None,
        };

        if output.cancelled {
            harvest_warn!(
                "run cancelled after {} of {} chapters",
                report.delivered,
                report.requested
            );
            return Ok(TextRunOutcome::Cancelled(report));
        }
        if output.contents.is_empty() {
            harvest_warn!("every requested chapter failed; nothing written");
            return Ok(TextRunOutcome::Finished(report));
        }

        sink.emit(EngineEvent::Phase(RunPhase::Saving));
        let chunks = assemble_book(&output.contents, &output.ledger.requested_indices())?;
        let writer = AtomicFileWriter::new(self.settings.output_dir.clone());
        let path = writer.write_unique(&task.store, &chunks)?;
        report.output = Some(path.clone());

        if report.is_complete() {
            harvest_info!(
                "delivered {}/{} chapters to {}",
                report.delivered,
                report.requested,
                path.display()
            );
        } else {
            harvest_warn!(
                "delivered {}/{} chapters to {} ({} failed)",
                report.delivered,
                report.requested,
                path.display(),
                report.failed.len()
            );
        }
        Ok(TextRunOutcome::Finished(report))
    }
}

/// One image collection request.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub seeds: Vec<String>,
    pub depth: SearchDepth,
    pub filter: ImageFilter,
    /// `None` lists accepted images without downloading them.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRunReport {
    pub found: usize,
    pub accepted: Vec<FoundImage>,
    pub saved: Vec<SavedImage>,
    pub skipped: Vec<(String, String)>,
    pub manifest: Option<PathBuf>,
    pub pages_scanned: usize,
    pub probes: usize,
    pub probe_failures: usize,
    /// Images HEAD-probed for their size before filtering.
    pub measured: usize,
    pub measure_failures: usize,
    pub cancelled: bool,
}

/// Owns the collector so its dedup session outlives single runs.
pub struct ImageRunner {
    collector: LinkExpansionCollector,
    fetcher: Arc<dyn PageFetcher>,
    slot: RunSlot,
}

impl ImageRunner {
    pub fn new(fetcher: Arc<dyn PageFetcher>, batch_size: usize, slot: RunSlot) -> Self {
        Self {
            collector: LinkExpansionCollector::new(Arc::clone(&fetcher)).with_batch_size(batch_size),
            fetcher,
            slot,
        }
    }

    pub fn reset_session(&mut self) {
        self.collector.reset_session();
    }

    pub async fn run(
        &mut self,
        job: &ImageJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ImageRunReport, RunError> {
        let _guard = self.slot.try_acquire().ok_or(RunError::Busy)?;
        let matcher = job.filter.compile()?;

        let mut collected = self
            .collector
            .collect(&job.seeds, job.depth, sink, cancel)
            .await;
        let measured = self.collector.measure(&mut collected.images, cancel).await;
        let found = collected.images.len();
        let accepted: Vec<FoundImage> = collected
            .images
            .into_iter()
            .filter(|found| {
                let page = Url::parse(&found.page).ok();
                matcher.accepts(&found.image, page.as_ref())
            })
            .collect();
        harvest_info!("{} of {found} images pass the filter", accepted.len());

        let mut report = ImageRunReport {
            found,
            pages_scanned: collected.pages_scanned,
            probes: collected.probes,
            probe_failures: collected.probe_failures,
            measured: measured.checked,
            measure_failures: measured.failures,
            cancelled: collected.cancelled || measured.cancelled,
            ..ImageRunReport::default()
        };

        if let Some(dir) = &job.output_dir {
            if !report.cancelled {
                let saver = ImageSaver::new(Arc::clone(&self.fetcher), dir.clone());
                let saved = saver.save_all(&accepted, cancel).await?;
                report.saved = saved.saved;
                report.skipped = saved.skipped;
                report.manifest = saved.manifest;
                report.cancelled = cancel.is_cancelled();
            }
        }
        report.accepted = accepted;
        Ok(report)
    }
}
