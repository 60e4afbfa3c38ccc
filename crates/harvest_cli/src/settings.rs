use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_core::ImageFilter;
use harvest_engine::{AtomicFileWriter, FetchSettings, DEFAULT_CONCURRENCY, DEFAULT_PROBE_BATCH};
use harvest_logging::harvest_error;
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILENAME: &str = "harvest.ron";

/// Persistent defaults for the command line. Flags override these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub concurrency: usize,
    pub text_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_batch_size: usize,
    pub output_dir: PathBuf,
    pub log_to_file: bool,
    pub image_filter: ImageFilter,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            text_timeout_secs: 5,
            probe_timeout_secs: 10,
            probe_batch_size: DEFAULT_PROBE_BATCH,
            output_dir: PathBuf::from("."),
            log_to_file: false,
            image_filter: ImageFilter::default(),
        }
    }
}

impl Settings {
    pub fn text_fetch(&self) -> FetchSettings {
        let timeout = Duration::from_secs(self.text_timeout_secs.max(1));
        FetchSettings {
            connect_timeout: timeout,
            request_timeout: timeout,
            ..FetchSettings::text()
        }
    }

    pub fn probe_fetch(&self) -> FetchSettings {
        let timeout = Duration::from_secs(self.probe_timeout_secs.max(1));
        FetchSettings {
            connect_timeout: timeout,
            request_timeout: timeout,
            ..FetchSettings::probe()
        }
    }
}

/// The settings file to use: the one given on the command line, else
/// `harvest.ron` in the working directory.
pub fn settings_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(SETTINGS_FILENAME))
}

/// A missing file is not a problem; an unreadable or unparsable one is
/// reported so the caller can warn once logging is up.
pub fn load_settings(path: &Path) -> Result<Settings, String> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Settings::default());
        }
        Err(err) => return Err(format!("Failed to read settings from {path:?}: {err}")),
    };

    ron::from_str(&content).map_err(|err| format!("Failed to parse settings from {path:?}: {err}"))
}

pub fn save_settings(path: &Path, settings: &Settings) -> bool {
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(settings, pretty) {
        Ok(text) => text,
        Err(err) => {
            harvest_error!("Failed to serialize settings: {}", err);
            return false;
        }
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        harvest_error!("Settings path {:?} has no file name", path);
        return false;
    };
    match AtomicFileWriter::new(dir).write(name, content.as_bytes()) {
        Ok(_) => true,
        Err(err) => {
            harvest_error!("Failed to write settings to {:?}: {}", path, err);
            false
        }
    }
}
