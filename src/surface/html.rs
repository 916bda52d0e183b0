//! HTML page surfaces
//!
//! Content pages are HTML fragments. Text nodes are read with lol_html so the
//! same traversal drives both flattening and overlay injection: node ids are
//! the ordinal of each non-empty character-data text node, which keeps the two
//! passes in agreement.

use html_escape::decode_html_entities;
use lol_html::html_content::{ContentType, TextType};
use lol_html::{doc_text, rewrite_str, RewriteStrSettings};

use super::{NodeId, Surface, TextLeaf};
use crate::error::SurfaceError;
use crate::html::strip_overlay;

/// A rendered HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlSurface {
    html: String,
    leaves: Vec<(NodeId, String)>,
}

impl HtmlSurface {
    /// Read an HTML page.
    ///
    /// Overlay spans from an earlier pass are stripped first, so a decorated
    /// page flattens exactly like the undecorated one.
    pub fn parse(html: &str) -> Result<Self, SurfaceError> {
        let clean = strip_overlay(html)?;

        let mut leaves = Vec::new();
        rewrite_text_nodes(&clean, |node, text| {
            leaves.push((node, text.to_string()));
            None
        })?;

        Ok(Self {
            html: clean,
            leaves,
        })
    }

    /// The page HTML without overlay spans
    pub fn html(&self) -> &str {
        &self.html
    }
}

impl Surface for HtmlSurface {
    fn text_leaves(&self) -> Vec<TextLeaf<'_>> {
        self.leaves
            .iter()
            .map(|(node, text)| TextLeaf { node: *node, text })
            .collect()
    }
}

/// Visit every non-empty character-data text node of `html` in document order.
///
/// The visitor receives the node id and the entity-decoded text. Returning
/// `Some(html)` replaces the node with that markup; `None` keeps it as is.
/// Script and style contents are not visited.
pub(crate) fn rewrite_text_nodes<F>(html: &str, mut visit: F) -> Result<String, SurfaceError>
where
    F: FnMut(NodeId, &str) -> Option<String>,
{
    let mut next_id = 0;
    let mut pending = String::new();

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            document_content_handlers: vec![doc_text!(|chunk| {
                if !matches!(chunk.text_type(), TextType::Data) {
                    return Ok(());
                }

                // A text node may arrive in several chunks; buffer until the last
                pending.push_str(chunk.as_str());
                if !chunk.last_in_text_node() {
                    chunk.remove();
                    return Ok(());
                }
                if pending.is_empty() {
                    return Ok(());
                }

                let raw = std::mem::take(&mut pending);
                let node = NodeId(next_id);
                next_id += 1;

                let decoded = decode_html_entities(&raw);
                match visit(node, &decoded) {
                    Some(replacement) => chunk.replace(&replacement, ContentType::Html),
                    None => chunk.replace(&raw, ContentType::Html),
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| SurfaceError::RewriteError(e.to_string()));
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{flatten, SurfacePosition};

    const PAGE_1: &str = "<h2>Page 1</h2><p>This is <strong>page 1</strong> content. Lorem ipsum dolor sit amet, consectetur adipiscing elit.</p>";

    #[test]
    fn test_parse_page() {
        let surface = HtmlSurface::parse(PAGE_1).unwrap();
        let flat = flatten(&surface);

        assert!(flat.text().starts_with("Page 1This is page 1 content."));
        assert_eq!(flat.segments().len(), 4);
        assert_eq!(
            flat.linear_offset(SurfacePosition::new(NodeId(2), 0)),
            Some("Page 1This is ".len())
        );
    }

    #[test]
    fn test_entities_are_decoded() {
        let surface = HtmlSurface::parse("<p>Fish &amp; chips &lt;3</p>").unwrap();
        assert_eq!(flatten(&surface).text(), "Fish & chips <3");
    }

    #[test]
    fn test_script_and_style_are_ignored() {
        let html = "<style>p { color: red }</style><p>Hello</p><script>var x = 1;</script>";
        let surface = HtmlSurface::parse(html).unwrap();

        assert_eq!(flatten(&surface).text(), "Hello");
    }

    #[test]
    fn test_no_text_is_empty_surface() {
        let surface = HtmlSurface::parse("<div><img src=\"a.png\"><br></div>").unwrap();
        assert!(flatten(&surface).is_empty());
    }

    #[test]
    fn test_overlay_spans_are_stripped() {
        let plain = HtmlSurface::parse("<p>ab CD ef</p>").unwrap();
        let decorated = HtmlSurface::parse(
            "<p>ab <span data-ll-overlay=\"highlight\" class=\"ll-highlight\">CD</span> ef</p>",
        )
        .unwrap();

        assert_eq!(decorated.html(), "<p>ab CD ef</p>");
        assert_eq!(flatten(&decorated), flatten(&plain));
    }

    #[test]
    fn test_rewrite_keeps_untouched_nodes() {
        let html = "<p>Fish &amp; chips</p><p>Tea</p>";
        let out = rewrite_text_nodes(html, |node, text| {
            (node == NodeId(1)).then(|| text.to_uppercase())
        })
        .unwrap();

        assert_eq!(out, "<p>Fish &amp; chips</p><p>TEA</p>");
    }
}
