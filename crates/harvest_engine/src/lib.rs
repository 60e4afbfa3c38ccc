//! Harvest engine: page fetching, chapter and image pipelines, persistence.
mod chapters;
mod collector;
mod datauri;
mod decode;
mod dom;
mod engine;
mod events;
mod extract;
mod fetch;
mod filename;
mod persist;
mod pipeline;
mod runner;
mod saver;
mod types;

pub use chapters::{chapters_from_page, ChapterListResolver, ResolveError};
pub use collector::{
    scan_page, CollectReport, CollectorSession, FoundImage, LinkExpansionCollector, MeasureReport,
    PageScan, DEFAULT_PROBE_BATCH,
};
pub use datauri::{is_data_uri, parse_data_uri, DataUri};
pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use engine::{Canceller, EngineConfig, EngineError, EngineHandle};
pub use events::{ChannelProgressSink, EngineEvent, NullSink, ProgressSink};
pub use extract::{extract_all_text, extract_chapter_body, extract_first_text, BodyExtraction};
pub use fetch::{fetch_html, FetchSettings, PageFetcher, ReqwestFetcher};
pub use filename::{dedupe_name, image_filename, sanitize_name};
pub use persist::{ensure_output_dir, uniquify, AtomicFileWriter, PersistError};
pub use pipeline::{
    ChapterPipeline, ContentMissPolicy, PipelineError, PipelineOutput, PipelineSettings,
    DEFAULT_CONCURRENCY,
};
pub use runner::{
    advance_task, AutoConfirm, Confirm, DeliveryReport, ImageJob, ImageRunReport, ImageRunner,
    RunError, TextRunOutcome, TextRunSettings, TextRunner,
};
pub use saver::{ImageSaver, SaveReport, SavedImage, MANIFEST_FILENAME};
pub use tokio_util::sync::CancellationToken;
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput, ProbeOutput};
