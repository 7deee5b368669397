//! FILENAME: frame-engine/src/error.rs

use thiserror::Error;

use crate::dtype::DType;

/// Broad classes of failure. All of them are contract violations raised
/// synchronously; nothing here is transient or retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied invalid arguments.
    Usage,
    /// A value or array cannot be represented as requested.
    Type,
    /// Operands cannot be aligned or broadcast.
    Alignment,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("key of length {found} does not match axis of length {expected}")]
    KeyShapeMismatch { expected: usize, found: usize },

    #[error("bloc key of shape {found:?} must match shape {expected:?}")]
    BlocShapeMismatch { expected: (usize, usize), found: Vec<usize> },

    #[error("position {position} is out of bounds for axis of length {len}")]
    OutOfBounds { position: usize, len: usize },

    #[error("slice step cannot be zero")]
    ZeroSliceStep,

    #[error("invalid axis: {0}")]
    AxisInvalid(usize),

    #[error("group key must select at least one position")]
    EmptyGroupKey,

    #[error("block has {found} rows, expected {expected}")]
    RowCountMismatch { expected: usize, found: usize },

    #[error("unsupported dimensionality: {0}")]
    UnsupportedDimensionality(usize),

    #[error("array of size {size} cannot take shape {shape:?}")]
    ShapeMismatch { size: usize, shape: Vec<usize> },

    #[error("cannot represent {element} as {dtype:?}")]
    ElementDType { element: String, dtype: DType },

    #[error("operation `{operation}` does not support dtype {dtype:?}")]
    UnsupportedDType { operation: &'static str, dtype: DType },

    #[error("labels are not unique: {0}")]
    DuplicateLabel(String),

    #[error("label not found: {0}")]
    LabelNotFound(String),

    #[error("label {label} has depth {found}, expected {expected}")]
    DepthMismatch { label: String, expected: usize, found: usize },

    #[error("invalid depth map: {0}")]
    DepthMapInvalid(String),

    #[error("{found} ascending values given for {expected} sort columns")]
    AscendingMismatch { expected: usize, found: usize },

    #[error("index of {len} labels does not match axis of length {expected}")]
    IndexLength { expected: usize, len: usize },

    #[error("{0} does not support appending labels")]
    Immutable(&'static str),

    #[error("unknown index class: {0}")]
    UnknownIndexClass(String),

    #[error("shapes not alignable: {0}")]
    NotAlignable(String),

    #[error("cannot parse {kind} from {text:?}")]
    Parse { kind: &'static str, text: String },
}

impl FrameError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FrameError::ElementDType { .. }
            | FrameError::UnsupportedDType { .. }
            | FrameError::UnsupportedDimensionality(_)
            | FrameError::Parse { .. } => ErrorCategory::Type,
            FrameError::NotAlignable(_) => ErrorCategory::Alignment,
            _ => ErrorCategory::Usage,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
