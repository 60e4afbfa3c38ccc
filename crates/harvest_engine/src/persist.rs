use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::filename::split_extension;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("invalid output file name `{0}`")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::OutputDir(e.to_string()))?;
    }
    Ok(())
}

/// First free path among `name`, `name (1)`, `name (2)`, ... in `dir`.
pub fn uniquify(dir: &Path, filename: &str) -> PathBuf {
    let first = dir.join(filename);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = split_extension(filename);
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Writes files under one directory through a temp file and a rename, so a
/// reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` to `relative` below the writer's directory, replacing
    /// any existing file. Missing parent directories are created.
    pub fn write(&self, relative: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        let target = self.target(relative)?;
        self.persist(&target, &[content])?;
        Ok(target)
    }

    /// Write `chunks` back to back to `relative`; when the name is taken a
    /// free `name (N).ext` variant is used instead.
    pub fn write_unique<S: AsRef<[u8]>>(
        &self,
        relative: &str,
        chunks: &[S],
    ) -> Result<PathBuf, PersistError> {
        let target = self.target(relative)?;
        let parent = target.parent().unwrap_or(&self.dir).to_path_buf();
        let filename = target
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PersistError::InvalidName(relative.to_string()))?;
        let target = uniquify(&parent, filename);
        let parts: Vec<&[u8]> = chunks.iter().map(AsRef::as_ref).collect();
        self.persist(&target, &parts)?;
        Ok(target)
    }

    fn target(&self, relative: &str) -> Result<PathBuf, PersistError> {
        let path = Path::new(relative);
        if relative.trim().is_empty() || path.file_name().is_none() {
            return Err(PersistError::InvalidName(relative.to_string()));
        }
        Ok(self.dir.join(path))
    }

    fn persist(&self, target: &Path, parts: &[&[u8]]) -> Result<(), PersistError> {
        let parent = target.parent().unwrap_or(&self.dir);
        ensure_output_dir(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        for part in parts {
            tmp.write_all(part)?;
        }
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        if target.exists() {
            fs::remove_file(target)?;
        }
        tmp.persist(target).map_err(|e| PersistError::Io(e.error))?;
        Ok(())
    }
}
