use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::error::ContentError;

/// Supplies raw content documents by relative path.
///
/// Implementations must be safe to share across threads.
pub trait ContentSource: Send + Sync {
    /// Returns the raw bytes stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::NotFound` if nothing is stored there, or
    /// `ContentError::Io` if the read failed.
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError>;
}

/// Reads content from files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ContentError> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ContentError::Io {
                path: path.to_string(),
                message: "path must stay inside the content root".to_string(),
            });
        }
        Ok(self.root.join(rel))
    }
}

impl ContentSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ContentError::NotFound {
                path: full.display().to_string(),
            },
            _ => ContentError::Io {
                path: full.display().to_string(),
                message: e.to_string(),
            },
        })
    }
}

/// In-memory content, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes at `path`.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), bytes.into());
    }

    /// Stores a JSON document at `path`.
    pub fn insert_json(&self, path: impl Into<String>, doc: &Value) {
        self.insert(path, doc.to_string());
    }

    /// Builder-style variant of [`insert_json`](Self::insert_json).
    #[must_use]
    pub fn with_json(self, path: impl Into<String>, doc: &Value) -> Self {
        self.insert_json(path, doc);
        self
    }
}

impl ContentSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound {
                path: path.to_string(),
            })
    }
}
