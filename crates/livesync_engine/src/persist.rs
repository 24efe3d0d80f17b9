use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot serialize session: {0}")]
    Serialize(String),
    #[error("cannot parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid session id {0:?}")]
    InvalidSessionId(String),
}

/// Ensure the state directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StateDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
    }
    Ok(())
}

/// Writes `{dir}/{filename}` through a temp file and a rename, so readers
/// never observe a half-written session.
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

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}
