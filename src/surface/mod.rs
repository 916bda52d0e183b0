//! Text surfaces and flattening
//!
//! A rendered page is rebuilt from scratch on every navigation, so nothing in
//! the engine holds on to rendered nodes. Instead a surface is flattened once
//! per render into a [`FlattenedSurface`]: the linear text of every
//! text-bearing leaf in document order, plus a map from linear offsets back to
//! `(NodeId, local offset)` pairs.
//!
//! All offsets are counted in characters (Unicode scalar values), never bytes.
//!
//! Two surfaces are provided:
//! - [`SurfaceTree`]: an index-based node arena built by the host
//! - [`HtmlSurface`]: a page of HTML content read with lol_html

mod html;
mod tree;

pub use html::HtmlSurface;
pub use tree::{SurfaceNode, SurfaceTree};

pub(crate) use html::rewrite_text_nodes;

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Identifier of a node inside a rendered surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A position inside a text leaf, as reported by a UI selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfacePosition {
    /// Text leaf holding the position
    pub node: NodeId,
    /// Character offset inside the leaf
    pub offset: usize,
}

impl SurfacePosition {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A borrowed text leaf yielded by a [`Surface`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLeaf<'a> {
    pub node: NodeId,
    pub text: &'a str,
}

/// Anything that can enumerate its text-bearing leaves in document order
pub trait Surface {
    /// Text leaves in document order. Structural nodes are not reported.
    fn text_leaves(&self) -> Vec<TextLeaf<'_>>;
}

/// One entry of the reverse offset map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetSegment {
    /// Leaf the characters come from
    pub node: NodeId,
    /// Linear offset of the first character of the leaf
    pub start: usize,
    /// Number of characters contributed by the leaf
    pub len: usize,
}

impl OffsetSegment {
    /// Linear offset one past the last character of the leaf
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Linear text of a rendered page and its map back into the surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedSurface {
    text: String,
    /// Byte offset of every char, followed by `text.len()`
    char_bytes: Vec<usize>,
    segments: Vec<OffsetSegment>,
}

impl Default for FlattenedSurface {
    fn default() -> Self {
        Self::empty()
    }
}

impl FlattenedSurface {
    /// A surface with nothing to anchor
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            char_bytes: vec![0],
            segments: Vec::new(),
        }
    }

    /// Build a surface from text leaves given in document order.
    ///
    /// Empty leaves are skipped, so every segment start is strictly greater
    /// than the previous one.
    pub fn from_leaves<'a>(leaves: impl IntoIterator<Item = TextLeaf<'a>>) -> Self {
        let mut surface = Self::empty();
        surface.char_bytes.clear();

        let mut linear = 0;
        for leaf in leaves {
            if leaf.text.is_empty() {
                continue;
            }

            let base = surface.text.len();
            let mut len = 0;
            for (byte, _) in leaf.text.char_indices() {
                surface.char_bytes.push(base + byte);
                len += 1;
            }
            surface.text.push_str(leaf.text);
            surface.segments.push(OffsetSegment {
                node: leaf.node,
                start: linear,
                len,
            });
            linear += len;
        }

        surface.char_bytes.push(surface.text.len());
        surface
    }

    /// A single-leaf surface over plain text (leaf `NodeId(0)`)
    pub fn from_text(text: &str) -> Self {
        Self::from_leaves([TextLeaf {
            node: NodeId(0),
            text,
        }])
    }

    /// The flattened text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.char_bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The reverse offset map, in document order
    pub fn segments(&self) -> &[OffsetSegment] {
        &self.segments
    }

    /// Translate a surface position into a linear offset.
    ///
    /// Returns `None` when the node is not a tracked text leaf or the local
    /// offset lies past the end of the leaf.
    pub fn linear_offset(&self, position: SurfacePosition) -> Option<usize> {
        self.segments
            .iter()
            .find(|segment| segment.node == position.node)
            .filter(|segment| position.offset <= segment.len)
            .map(|segment| segment.start + position.offset)
    }

    /// Translate a linear offset back into a surface position.
    ///
    /// An offset on the boundary between two leaves maps to the start of the
    /// later leaf; the end of the text maps to the end of the last leaf.
    pub fn position_at(&self, offset: usize) -> Option<SurfacePosition> {
        if offset > self.len() {
            return None;
        }

        let idx = self.segments.partition_point(|segment| segment.end() <= offset);
        let segment = match self.segments.get(idx) {
            Some(segment) => segment,
            None => self.segments.last()?,
        };

        Some(SurfacePosition {
            node: segment.node,
            offset: offset - segment.start,
        })
    }

    /// Text between two linear offsets, if the range is in bounds
    pub fn slice(&self, range: Range<usize>) -> Option<&str> {
        if range.start > range.end || range.end > self.len() {
            return None;
        }
        Some(&self.text[self.char_bytes[range.start]..self.char_bytes[range.end]])
    }

    /// Byte offset of a char offset (clamped to the end of the text)
    pub(crate) fn byte_offset(&self, offset: usize) -> usize {
        self.char_bytes[offset.min(self.len())]
    }

    /// Char offset of a byte offset that lies on a char boundary
    pub(crate) fn char_offset(&self, byte: usize) -> usize {
        self.char_bytes
            .binary_search(&byte)
            .unwrap_or_else(|idx| idx)
    }
}

/// Flatten a rendered surface into its linear text and offset map
pub fn flatten<S: Surface + ?Sized>(surface: &S) -> FlattenedSurface {
    let flattened = FlattenedSurface::from_leaves(surface.text_leaves());
    tracing::trace!(
        chars = flattened.len(),
        leaves = flattened.segments().len(),
        "Flattened surface"
    );
    flattened
}
