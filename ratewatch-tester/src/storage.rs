//! File-backed blob storage: one JSON file per storage identifier.
use ratewatch_core::SampleStorage;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FileStorageError {
    #[error("Storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Stores each blob as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, FileStorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid || key.starts_with('.') {
            return Err(FileStorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FileStorageError {
    FileStorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SampleStorage for FileStorage {
    type Error = FileStorageError;

    fn read_blob(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path, err)),
        }
    }

    fn write_blob(&self, key: &str, blob: &str) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|err| io_error(&self.dir, err))?;
        // Staged write; the rename replaces the previous blob atomically.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, blob).map_err(|err| io_error(&staging, err))?;
        fs::rename(&staging, &path).map_err(|err| io_error(&path, err))
    }
}
