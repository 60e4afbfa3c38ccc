use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use harvest_logging::{harvest_debug, harvest_warn};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::collector::FoundImage;
use crate::datauri::{is_data_uri, parse_data_uri};
use crate::fetch::PageFetcher;
use crate::filename::{dedupe_name, image_filename};
use crate::persist::{AtomicFileWriter, PersistError};

pub const MANIFEST_FILENAME: &str = "images.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedImage {
    pub url: String,
    pub page: String,
    pub file: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<SavedImage>,
    /// `(url, reason)` for every image that was not written.
    pub skipped: Vec<(String, String)>,
    pub manifest: Option<PathBuf>,
}

/// Downloads images one at a time into a directory and writes a manifest
/// listing what was saved.
pub struct ImageSaver {
    fetcher: Arc<dyn PageFetcher>,
    writer: AtomicFileWriter,
}

impl ImageSaver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, dir: PathBuf) -> Self {
        Self {
            fetcher,
            writer: AtomicFileWriter::new(dir),
        }
    }

    pub async fn save_all(
        &self,
        images: &[FoundImage],
        cancel: &CancellationToken,
    ) -> Result<SaveReport, PersistError> {
        let mut report = SaveReport::default();
        let mut taken = HashSet::new();

        for found in images {
            if cancel.is_cancelled() {
                break;
            }
            let url = &found.image.url;
            let (name, body) = if is_data_uri(url) {
                let Some(data) = parse_data_uri(url) else {
                    report
                        .skipped
                        .push((url.clone(), "malformed data URI".to_string()));
                    continue;
                };
                (image_filename(url, data.mime.as_deref(), None), data.bytes)
            } else {
                let output = match self.fetcher.get(url).await {
                    Ok(output) => output,
                    Err(err) => {
                        harvest_warn!("image {url} dropped: {err}");
                        report.skipped.push((url.clone(), err.to_string()));
                        continue;
                    }
                };
                let name = image_filename(
                    &output.metadata.final_url,
                    output
                        .metadata
                        .content_type
                        .as_deref()
                        .or(found.image.content_type.as_deref()),
                    output.metadata.content_disposition.as_deref(),
                );
                (name, output.body.to_vec())
            };

            let name = dedupe_name(&name, &mut taken);
            let path = self.writer.write(&name, &body)?;
            harvest_debug!("saved {url} as {}", path.display());
            report.saved.push(SavedImage {
                url: url.clone(),
                page: found.page.clone(),
                file: name,
                bytes: body.len() as u64,
            });
        }

        if !report.saved.is_empty() {
            let manifest = json!({
                "count": report.saved.len(),
                "images": report.saved,
            });
            let text = serde_json::to_string_pretty(&manifest)
                .map_err(|err| PersistError::Io(err.into()))?;
            report.manifest = Some(self.writer.write(MANIFEST_FILENAME, text.as_bytes())?);
        }
        Ok(report)
    }
}
