//! Selection gateway
//!
//! Turns a raw UI selection plus the decoration the user asked for into
//! either a new annotation or a reason the selection was rejected. Nothing
//! here touches storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotations::{AnchorResolver, Annotation, Highlight, Note};
use crate::error::AnnotationError;
use crate::surface::{FlattenedSurface, SurfacePosition};

/// Highlight colors offered by default
pub const DEFAULT_PALETTE: [&str; 6] = ["red", "green", "blue", "orange", "purple", "yellow"];

/// The decoration requested for a selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequestedDecoration {
    Highlight {
        color: String,
    },
    Note {
        title: String,
        category: String,
        body: String,
    },
}

/// A committed selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub page: u32,
    pub start: SurfacePosition,
    pub end: SurfacePosition,
    pub decoration: RequestedDecoration,
}

/// Why a selection did not become an annotation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("selection is empty")]
    EmptySelection,

    #[error("selection is outside the page text")]
    OutOfBounds,

    #[error("invalid page number")]
    InvalidPage,

    #[error("unknown color: {0}")]
    UnknownColor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResponse {
    AnchorCreated { annotation: Annotation },
    RejectedSelection { reason: RejectionReason },
}

impl SelectionResponse {
    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            SelectionResponse::AnchorCreated { annotation } => Some(annotation),
            SelectionResponse::RejectedSelection { .. } => None,
        }
    }
}

/// Validates selections and builds annotations from them
#[derive(Debug, Clone)]
pub struct SelectionGateway {
    resolver: AnchorResolver,
    palette: Vec<String>,
}

impl Default for SelectionGateway {
    fn default() -> Self {
        Self::new(
            AnchorResolver::default(),
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        )
    }
}

impl SelectionGateway {
    pub fn new(resolver: AnchorResolver, palette: Vec<String>) -> Self {
        Self { resolver, palette }
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    /// Handle a selection against the page it was made on
    pub fn handle(&self, surface: &FlattenedSurface, request: &SelectionRequest) -> SelectionResponse {
        match self.build(surface, request) {
            Ok(annotation) => {
                tracing::debug!(
                    page = request.page,
                    kind = annotation.decoration().kind_name(),
                    "Selection accepted"
                );
                SelectionResponse::AnchorCreated { annotation }
            }
            Err(reason) => {
                tracing::debug!(page = request.page, %reason, "Selection rejected");
                SelectionResponse::RejectedSelection { reason }
            }
        }
    }

    fn build(
        &self,
        surface: &FlattenedSurface,
        request: &SelectionRequest,
    ) -> Result<Annotation, RejectionReason> {
        if request.page == 0 {
            return Err(RejectionReason::InvalidPage);
        }

        let start = surface
            .linear_offset(request.start)
            .ok_or(RejectionReason::OutOfBounds)?;
        let end = surface
            .linear_offset(request.end)
            .ok_or(RejectionReason::OutOfBounds)?;
        let (start, end) = if end < start { (end, start) } else { (start, end) };

        let anchor = self
            .resolver
            .create_anchor_from_offsets(surface, request.page, start, end)
            .map_err(|e| match e {
                AnnotationError::EmptySelection => RejectionReason::EmptySelection,
                AnnotationError::InvalidPage(_) => RejectionReason::InvalidPage,
                _ => RejectionReason::OutOfBounds,
            })?;

        Ok(match &request.decoration {
            RequestedDecoration::Highlight { color } => Annotation::Highlight(Highlight {
                anchor,
                color: self.palette_color(color)?,
            }),
            RequestedDecoration::Note {
                title,
                category,
                body,
            } => Annotation::Note(Note {
                anchor,
                title: title.clone(),
                category: category.clone(),
                body: body.clone(),
            }),
        })
    }

    /// The palette's spelling of `color`, matched case-insensitively
    fn palette_color(&self, color: &str) -> Result<String, RejectionReason> {
        self.palette
            .iter()
            .find(|c| c.eq_ignore_ascii_case(color.trim()))
            .cloned()
            .ok_or_else(|| RejectionReason::UnknownColor(color.to_string()))
    }
}
