//! Annotation types
//!
//! An annotation is a decoration (highlight or note) attached to an
//! [`Anchor`]. Anchors carry up to two selectors, mirroring the Web Annotation
//! TextPosition and TextQuote selectors: exact character offsets as the
//! primary address, and a quote with surrounding words for drift recovery.
//!
//! Reference: <https://www.w3.org/TR/annotation-model/#selectors>

use serde::{Deserialize, Serialize};

use crate::error::{AnnotationError, Result};
use crate::overlay::Decoration;

/// Default highlight color
pub const DEFAULT_COLOR: &str = "yellow";

/// Character offsets into a page's flattened text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextPosition {
    /// Start character offset
    pub start: usize,
    /// End character offset (exclusive)
    pub end: usize,
}

/// Quoted text with the words around it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextQuote {
    /// The exact text that was selected
    pub exact: String,
    /// Up to N words before the selection, as they appeared
    pub prefix: String,
    /// Up to N words after the selection, as they appeared
    pub suffix: String,
}

/// Stable address of a decorated region on a page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    /// Page number, starting at 1
    pub page: u32,
    /// Exact offsets, tried first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<TextPosition>,
    /// Context snapshot, used when the offsets no longer match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<TextQuote>,
}

impl Anchor {
    /// Anchor addressed by exact offsets only
    pub fn exact(page: u32, start: usize, end: usize) -> Self {
        Self {
            page,
            position: Some(TextPosition { start, end }),
            quote: None,
        }
    }

    /// Anchor addressed by a quote and its context only
    pub fn context(page: u32, exact: &str, prefix: &str, suffix: &str) -> Self {
        Self {
            page,
            position: None,
            quote: Some(TextQuote {
                exact: exact.to_string(),
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            }),
        }
    }

    /// Attach a context snapshot for drift recovery
    pub fn with_quote(mut self, quote: TextQuote) -> Self {
        self.quote = Some(quote);
        self
    }

    /// The anchored text, if a quote was recorded
    pub fn literal(&self) -> Option<&str> {
        self.quote.as_ref().map(|q| q.exact.as_str())
    }

    /// Check the structural invariants of the anchor
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(AnnotationError::InvalidPage(self.page));
        }
        if let Some(position) = &self.position {
            if position.start >= position.end {
                return Err(AnnotationError::InvalidAnchor(format!(
                    "empty range {}..{}",
                    position.start, position.end
                )));
            }
        }
        if let Some(quote) = &self.quote {
            if quote.exact.is_empty() {
                return Err(AnnotationError::InvalidAnchor("empty quote".to_string()));
            }
        }
        if self.position.is_none() && self.quote.is_none() {
            return Err(AnnotationError::InvalidAnchor(
                "anchor has no selector".to_string(),
            ));
        }
        Ok(())
    }
}

/// Types of annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    /// Colored text highlight
    Highlight,
    /// Text note with title, category and content
    Note,
}

/// A colored highlight
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Highlight {
    pub anchor: Anchor,
    pub color: String,
}

/// A note attached to a run of text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub anchor: Anchor,
    pub title: String,
    pub category: String,
    pub body: String,
}

/// A complete annotation
///
/// Identity is structural: two annotations are the same when kind, anchor
/// and payload all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Annotation {
    Highlight(Highlight),
    Note(Note),
}

impl Annotation {
    /// Create a new highlight annotation with the default color
    pub fn new_highlight(anchor: Anchor) -> Self {
        Annotation::Highlight(Highlight {
            anchor,
            color: DEFAULT_COLOR.to_string(),
        })
    }

    /// Create a new note annotation
    pub fn new_note(anchor: Anchor, title: &str, category: &str, body: &str) -> Self {
        Annotation::Note(Note {
            anchor,
            title: title.to_string(),
            category: category.to_string(),
            body: body.to_string(),
        })
    }

    /// Set the color (highlights only)
    pub fn with_color(mut self, color: &str) -> Self {
        if let Annotation::Highlight(highlight) = &mut self {
            highlight.color = color.to_string();
        }
        self
    }

    pub fn annotation_type(&self) -> AnnotationType {
        match self {
            Annotation::Highlight(_) => AnnotationType::Highlight,
            Annotation::Note(_) => AnnotationType::Note,
        }
    }

    pub fn anchor(&self) -> &Anchor {
        match self {
            Annotation::Highlight(h) => &h.anchor,
            Annotation::Note(n) => &n.anchor,
        }
    }

    pub fn page(&self) -> u32 {
        self.anchor().page
    }

    /// The decoration this annotation draws
    pub fn decoration(&self) -> Decoration {
        match self {
            Annotation::Highlight(h) => Decoration::Highlight {
                color: h.color.clone(),
            },
            Annotation::Note(n) => Decoration::NoteMarker {
                title: n.title.clone(),
                category: n.category.clone(),
                body: n.body.clone(),
            },
        }
    }
}

impl From<Highlight> for Annotation {
    fn from(highlight: Highlight) -> Self {
        Annotation::Highlight(highlight)
    }
}

impl From<Note> for Annotation {
    fn from(note: Note) -> Self {
        Annotation::Note(note)
    }
}

/// The annotations of one page, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSet {
    pub page: u32,
    pub annotations: Vec<Annotation>,
}

impl AnnotationSet {
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.annotations.iter()
    }
}

impl<'a> IntoIterator for &'a AnnotationSet {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.annotations.iter()
    }
}
