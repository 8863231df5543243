//! JSON snapshot persistence for engine state.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from state persistence.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// No snapshot exists yet. Expected on first run.
    #[error("no state file at {0}")]
    NotFound(PathBuf),

    /// Reading or writing the snapshot file failed.
    #[error("state io error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be (de)serialized.
    #[error("state serialization error for {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Persists one state type as a JSON snapshot file.
///
/// Saves are atomic: the snapshot is written to a sibling temp file and
/// renamed into place, so a crash mid-save never leaves a torn snapshot.
#[derive(Debug, Clone)]
pub struct StateStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> StateStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, state: &T) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state).map_err(|source| StateError::Serde {
            path: self.path.clone(),
            source,
        })?;
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, json).map_err(|source| StateError::Io {
            path: temp_path.clone(),
            source,
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn load(&self) -> Result<T, StateError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound(self.path.clone()))
            }
            Err(source) => {
                return Err(StateError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StateError::Serde {
            path: self.path.clone(),
            source,
        })
    }
}
