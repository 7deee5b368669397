//! FILENAME: pivot-engine/src/error.rs

use frame_engine::{ErrorCategory, FrameError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("pivot requires aggregation of values; group {label} has {rows} rows, provide a func")]
    AmbiguousAggregation { label: String, rows: usize },

    #[error("pivot requires at least one index field")]
    NoIndexFields,

    #[error("no data fields to aggregate and no columns fields to reshape by")]
    NoDataFields,

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Field {0} appears in more than one field group")]
    FieldOverlap(String),
}

impl PivotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PivotError::Frame(e) => e.category(),
            _ => ErrorCategory::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, PivotError>;
