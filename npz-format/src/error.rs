//! FILENAME: npz-format/src/error.rs

use frame_engine::{ErrorCategory, FrameError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Archive entry not found: {0}")]
    MissingEntry(String),

    #[error("Unsupported array descriptor: {0}")]
    UnsupportedDescriptor(String),

    #[error("Label cannot name an archive in the store: {0}")]
    InvalidLabel(String),

    #[error("max_persist must be at least 1")]
    InvalidPersist,
}

impl ArchiveError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ArchiveError::Frame(e) => e.category(),
            ArchiveError::UnsupportedDescriptor(_) => ErrorCategory::Type,
            _ => ErrorCategory::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
