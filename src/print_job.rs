// src/print_job.rs
use crate::file_manager::UploadRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lines handed to the queue versus countable lines in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub sent: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.sent == self.total
    }

    /// Fraction in `0.0..=1.0`, 0 for an empty file.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.sent as f64 / self.total as f64
        }
    }
}

/// The one active print. Survives pause/resume, dropped on stop or completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintJob {
    pub id: String,
    pub file_path: PathBuf,
    pub upload: Option<UploadRecord>,
    /// Countable lines already written to the device when the job was paused.
    pub resume_line: usize,
    /// Ordinal of the last file line written to the device.
    pub last_written: usize,
}

impl PrintJob {
    pub fn new(file_path: impl Into<PathBuf>, upload: Option<UploadRecord>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.into(),
            upload,
            resume_line: 0,
            last_written: 0,
        }
    }
}
