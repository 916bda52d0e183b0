//! Overlay injection using lol_html for streaming HTML processing
//!
//! Materializes a [`RenderPlan`] onto an HTML page by wrapping the text of
//! each run in nested spans. Every span carries the overlay attribute so a
//! later pass can strip it again; re-applying a plan to its own output gives
//! the same markup.

use html_escape::{encode_double_quoted_attribute, encode_text};
use lol_html::{element, rewrite_str, RewriteStrSettings};
use serde::Deserialize;
use std::fmt::Write;

use crate::error::SurfaceError;
use crate::overlay::{Decoration, Marker, RenderPlan};
use crate::surface::rewrite_text_nodes;

/// Attribute present on every span the injector writes
pub const OVERLAY_ATTRIBUTE: &str = "data-ll-overlay";

/// Configuration for overlay injection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverlayConfig {
    /// CSS class prefix for overlay spans
    pub class_prefix: String,
    /// Data attribute holding the annotation layer
    pub layer_attribute: String,
    /// Whether highlights carry an inline background color
    pub include_inline_styles: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            class_prefix: "ll-annotation".to_string(),
            layer_attribute: "data-annotation-layer".to_string(),
            include_inline_styles: true,
        }
    }
}

/// Result of overlay injection
#[derive(Debug)]
pub struct InjectionResult {
    /// The processed HTML with overlay spans
    pub html: String,
    /// Number of decorated text pieces written
    pub decorated_count: usize,
    /// Number of zero-width markers written
    pub marker_count: usize,
}

/// Errors during overlay injection
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("Render plan covers {plan_len} characters but the page has {page_len}")]
    PlanMismatch { plan_len: usize, page_len: usize },

    #[error("Invalid layer attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Inject the spans of a render plan into an HTML page.
///
/// The plan must have been built from the flattened text of this page
/// (decorated or not); otherwise [`InjectError::PlanMismatch`] is returned.
pub fn inject_overlay(
    html: &str,
    plan: &RenderPlan,
    config: &OverlayConfig,
) -> Result<InjectionResult, InjectError> {
    if !is_attribute_name(&config.layer_attribute) {
        return Err(InjectError::InvalidAttributeName(
            config.layer_attribute.clone(),
        ));
    }

    let clean = strip_overlay(html)?;

    let mut cursor = 0;
    let mut next_marker = 0;
    let mut decorated_count = 0;
    let mut marker_count = 0;

    let output = rewrite_text_nodes(&clean, |_, text| {
        let node_start = cursor;
        let node_len = text.chars().count();
        cursor += node_len;

        let mut writer = NodeWriter {
            plan,
            config,
            out: String::new(),
            changed: false,
            next_marker: &mut next_marker,
            decorated_count: &mut decorated_count,
            marker_count: &mut marker_count,
        };
        writer.write_node(text, node_start);
        writer.changed.then_some(writer.out)
    })?;

    if cursor != plan.text_len() {
        return Err(InjectError::PlanMismatch {
            plan_len: plan.text_len(),
            page_len: cursor,
        });
    }

    tracing::debug!(decorated_count, marker_count, "Injected overlay");

    Ok(InjectionResult {
        html: output,
        decorated_count,
        marker_count,
    })
}

/// ASCII letters, digits, `-`, `_`, `.` and `:`, starting with a letter
fn is_attribute_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Remove every overlay span, keeping its content
pub fn strip_overlay(html: &str) -> Result<String, SurfaceError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("span[data-ll-overlay]", |el| {
                el.remove_and_keep_content();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| SurfaceError::RewriteError(e.to_string()))
}

/// Writes the markup for one text node
struct NodeWriter<'a> {
    plan: &'a RenderPlan,
    config: &'a OverlayConfig,
    out: String,
    changed: bool,
    next_marker: &'a mut usize,
    decorated_count: &'a mut usize,
    marker_count: &'a mut usize,
}

impl NodeWriter<'_> {
    fn write_node(&mut self, text: &str, node_start: usize) {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let node_end = node_start + chars.len();
        let byte_at = |offset: usize| {
            chars
                .get(offset - node_start)
                .map_or(text.len(), |(byte, _)| *byte)
        };

        let plan = self.plan;
        let mut pos = node_start;
        while pos < node_end {
            self.write_markers_at(pos);

            let Some(run) = plan.run_at(pos) else {
                // Plan shorter than the page; reported once the pass ends
                self.out.push_str(&encode_text(&text[byte_at(pos)..]));
                return;
            };

            let mut piece_end = run.end.min(node_end);
            if let Some(marker) = plan.markers().get(*self.next_marker) {
                if marker.offset > pos && marker.offset < piece_end {
                    piece_end = marker.offset;
                }
            }

            let piece = &text[byte_at(pos)..byte_at(piece_end)];
            if run.is_decorated() {
                self.changed = true;
                *self.decorated_count += 1;
                for applied in &run.decorations {
                    self.open_span(applied.layer, &applied.decoration, false);
                }
                self.out.push_str(&encode_text(piece));
                for _ in &run.decorations {
                    self.out.push_str("</span>");
                }
            } else {
                self.out.push_str(&encode_text(piece));
            }

            pos = piece_end;
        }

        // Markers at the very end of the page land in the last text node
        if node_end == plan.text_len() {
            self.write_markers_at(node_end);
        }
    }

    fn write_markers_at(&mut self, offset: usize) {
        let plan = self.plan;
        let markers: &[Marker] = plan.markers();
        while let Some(marker) = markers.get(*self.next_marker) {
            if marker.offset > offset {
                break;
            }
            *self.next_marker += 1;
            if marker.offset < offset {
                continue;
            }

            self.changed = true;
            *self.marker_count += 1;
            self.open_span(marker.layer, &marker.decoration, true);
            self.out.push_str("</span>");
        }
    }

    fn open_span(&mut self, layer: usize, decoration: &Decoration, marker: bool) {
        let prefix = encode_double_quoted_attribute(&self.config.class_prefix);
        let kind = decoration.kind_name();
        let role = if marker { "marker" } else { kind };

        let _ = write!(
            self.out,
            "<span {}=\"{}\" class=\"{} {}-{}",
            OVERLAY_ATTRIBUTE, role, prefix, prefix, kind
        );
        if marker {
            let _ = write!(self.out, " {}-marker", prefix);
        }
        let _ = write!(self.out, "\" {}=\"{}\"", self.config.layer_attribute, layer);

        match decoration {
            Decoration::Highlight { color } => {
                let color = encode_double_quoted_attribute(color);
                let _ = write!(self.out, " data-color=\"{}\"", color);
                if self.config.include_inline_styles {
                    let _ = write!(self.out, " style=\"background-color: {};\"", color);
                }
            }
            Decoration::NoteMarker {
                title,
                category,
                body,
            } => {
                let _ = write!(
                    self.out,
                    " data-note-title=\"{}\" data-note-category=\"{}\" title=\"{}\"",
                    encode_double_quoted_attribute(title),
                    encode_double_quoted_attribute(category),
                    encode_double_quoted_attribute(body)
                );
            }
        }
        self.out.push('>');
    }
}
