//! Los Libros Annotations
//!
//! Anchors highlights and notes to the text of paginated content and renders
//! them back as nested overlays.
//!
//! # Modules
//!
//! - `surface`: Flattening of rendered pages into linear text with a reverse offset map
//! - `annotations`: Annotation types, anchor resolution and key-value persistence
//! - `overlay`: Render plans of non-overlapping decorated runs
//! - `html`: Materialization of render plans onto HTML pages
//! - `gateway`: Validation of UI selections
//! - `annotator`: The commit and render flows

pub mod annotations;
pub mod annotator;
pub mod config;
pub mod error;
pub mod gateway;
pub mod html;
pub mod overlay;
pub mod storage;
pub mod surface;
pub mod telemetry;

pub use annotations::{Anchor, AnchorResolver, Annotation, AnnotationStore};
pub use annotator::{Annotator, PageRender};
pub use config::Config;
pub use error::{AnnotationError, Result};
pub use overlay::{build_plan, RenderPlan};
pub use surface::{flatten, FlattenedSurface, SurfacePosition};
