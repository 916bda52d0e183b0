//! Annotation module
//!
//! Provides multi-selector anchoring following the W3C Web Annotation
//! selector model.
//!
//! # Features
//!
//! - Two selectors per anchor for robust text anchoring:
//!   - TextPosition - character offsets into the flattened page text
//!   - TextQuote - quoted text with surrounding words
//!
//! - Annotation types:
//!   - Highlights
//!   - Notes
//!
//! - Key-value persistence in the highlight/note JSON wire format

mod resolver;
mod store;
mod types;

pub use resolver::{
    AnchorResolver, ResolutionMethod, ResolutionStrategy, ResolvedRange, DEFAULT_CONTEXT_WORDS,
};
pub use store::{AnnotationStore, StorageKeys, StorageWarning, CORRUPT_SUFFIX};
pub use types::{
    Anchor, Annotation, AnnotationSet, AnnotationType, Highlight, Note, TextPosition, TextQuote,
    DEFAULT_COLOR,
};
