//! Error types for the annotation engine
//!
//! Nothing in here is fatal to a page render: callers degrade every failure to
//! "this one annotation did not render" and keep going.

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, AnnotationError>;

/// Annotation engine error type
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Selection out of bounds: {0}")]
    SelectionOutOfBounds(String),

    #[error("Selection is empty")]
    EmptySelection,

    #[error("Invalid page number: {0}")]
    InvalidPage(u32),

    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("Anchor on page {page} could not be resolved")]
    AnchorUnresolvable { page: u32 },

    #[error("Stored blob under key {key:?} is corrupt: {source}")]
    StorageCorrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Overlay injection failed: {0}")]
    Inject(#[from] crate::html::InjectError),
}

/// Errors raised while reading a rendered surface
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("HTML rewrite failed: {0}")]
    RewriteError(String),
}

impl AnnotationError {
    /// Whether the error only affects a single annotation or request.
    ///
    /// Storage backend failures are the only errors a caller may want to
    /// surface beyond a warning.
    pub fn is_local(&self) -> bool {
        !matches!(self, AnnotationError::Storage(_))
    }
}
