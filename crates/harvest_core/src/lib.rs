//! Harvest core: pure data model for chapter scraping and image collection.
mod chapter;
mod error;
mod filter;
mod image;
mod ledger;
mod model;
mod range;
mod session;
mod task;
mod urls;

pub use chapter::{assemble_book, format_chapter_title, Chapter, ChapterContent};
pub use error::{AssemblyError, ConfigError, LedgerError, RangeError};
pub use filter::{ImageFilter, ImageKind, ImageMatcher, NoExtensionAction, UnknownAction};
pub use image::{guess_image_type, ImageDescriptor, SearchDepth};
pub use ledger::{ChapterLedger, ChapterState};
pub use model::{BuiltinModel, ModelRegistry, SiteModel, SiteModelSpec};
pub use range::ChapterRange;
pub use session::{RunGuard, RunPhase, RunSlot};
pub use task::TaskConfig;
pub use urls::{normalize_url, resolve_reference, same_origin};
