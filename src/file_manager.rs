// src/file_manager.rs - Read-only access to uploaded G-code files
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed upload index {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Upload {id} names a file outside the upload directory: {filename}")]
    UnsafeFilename { id: u64, filename: String },
}

/// One entry of the upload index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "_id")]
    pub id: u64,
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// An upload resolved to the file that should be printed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpload {
    pub record: UploadRecord,
    pub path: PathBuf,
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Looks an upload up by id. `Ok(None)` means the id is unknown.
    async fn find(&self, id: u64) -> Result<Option<ResolvedUpload>, UploadError>;
}

/// Upload store backed by a JSON index file and a flat file directory.
#[derive(Debug, Clone)]
pub struct JsonUploadStore {
    index: PathBuf,
    directory: PathBuf,
}

impl JsonUploadStore {
    pub fn new(index: impl Into<PathBuf>, directory: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            directory: directory.into(),
        }
    }

    pub fn index(&self) -> &Path {
        &self.index
    }

    async fn read_index(&self) -> Result<Vec<UploadRecord>, UploadError> {
        let contents = fs::read_to_string(&self.index).await.map_err(|source| UploadError::Io {
            path: self.index.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| UploadError::Json {
            path: self.index.clone(),
            source,
        })
    }
}

#[async_trait]
impl UploadStore for JsonUploadStore {
    async fn find(&self, id: u64) -> Result<Option<ResolvedUpload>, UploadError> {
        let uploads = self.read_index().await?;
        let Some(record) = uploads.into_iter().find(|u| u.id == id) else {
            return Ok(None);
        };
        if !is_plain_filename(&record.filename) {
            return Err(UploadError::UnsafeFilename {
                id,
                filename: record.filename,
            });
        }
        let path = self.directory.join(&record.filename);
        tracing::debug!("Resolved upload {} to {}", id, path.display());
        Ok(Some(ResolvedUpload { record, path }))
    }
}

/// A single normal path component, so joining it stays inside the directory.
fn is_plain_filename(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
