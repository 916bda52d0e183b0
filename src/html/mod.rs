//! HTML processing module
//!
//! Materializes render plans onto HTML content pages:
//! - Overlay span injection (highlights and nested note markers)
//! - Overlay stripping, so plans can be re-applied to decorated pages
//!
//! Uses lol_html for efficient streaming HTML processing.

mod overlay_injector;

pub use overlay_injector::{
    inject_overlay, strip_overlay, InjectError, InjectionResult, OverlayConfig, OVERLAY_ATTRIBUTE,
};
