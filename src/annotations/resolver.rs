//! Anchor creation and resolution
//!
//! Creating an anchor maps a UI selection through the surface's reverse map
//! and records both exact offsets and a quote with up to N words of context
//! on each side. Resolving goes the other way: exact offsets are trusted when
//! they are still in bounds and still cover the quoted text; otherwise the
//! quote is searched for in the fresh surface.

use serde::Deserialize;
use std::ops::Range;
use std::str::FromStr;

use super::types::{Anchor, TextQuote};
use crate::error::{AnnotationError, Result};
use crate::surface::{FlattenedSurface, SurfacePosition};

/// Default number of context words kept on each side of a quote
pub const DEFAULT_CONTEXT_WORDS: usize = 5;

/// Which selectors are consulted when resolving an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Exact offsets first, quote search as fallback
    #[default]
    ExactThenContext,
    /// Exact offsets only
    ExactOnly,
    /// Quote search only
    ContextOnly,
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact-then-context" | "auto" => Ok(ResolutionStrategy::ExactThenContext),
            "exact" => Ok(ResolutionStrategy::ExactOnly),
            "context" => Ok(ResolutionStrategy::ContextOnly),
            other => Err(format!("unknown resolution strategy: {}", other)),
        }
    }
}

/// How a range was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    Exact,
    Context,
}

/// A resolved anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub range: Range<usize>,
    pub method: ResolutionMethod,
}

/// Creates anchors from selections and resolves them against surfaces
#[derive(Debug, Clone)]
pub struct AnchorResolver {
    context_words: usize,
    strategy: ResolutionStrategy,
}

impl Default for AnchorResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WORDS, ResolutionStrategy::default())
    }
}

impl AnchorResolver {
    pub fn new(context_words: usize, strategy: ResolutionStrategy) -> Self {
        Self {
            context_words,
            strategy,
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Create an anchor from a selection given in surface coordinates.
    ///
    /// Fails with `SelectionOutOfBounds` when an endpoint is not inside a
    /// tracked text leaf, and with `EmptySelection` when the end does not
    /// come after the start.
    pub fn create_anchor(
        &self,
        surface: &FlattenedSurface,
        page: u32,
        start: SurfacePosition,
        end: SurfacePosition,
    ) -> Result<Anchor> {
        let start = surface.linear_offset(start).ok_or_else(|| {
            AnnotationError::SelectionOutOfBounds(format!(
                "start {}:{} is not inside a text node",
                start.node.0, start.offset
            ))
        })?;
        let end = surface.linear_offset(end).ok_or_else(|| {
            AnnotationError::SelectionOutOfBounds(format!(
                "end {}:{} is not inside a text node",
                end.node.0, end.offset
            ))
        })?;

        self.create_anchor_from_offsets(surface, page, start, end)
    }

    /// Create an anchor from linear offsets into the flattened text
    pub fn create_anchor_from_offsets(
        &self,
        surface: &FlattenedSurface,
        page: u32,
        start: usize,
        end: usize,
    ) -> Result<Anchor> {
        if page == 0 {
            return Err(AnnotationError::InvalidPage(page));
        }
        if start > surface.len() || end > surface.len() {
            return Err(AnnotationError::SelectionOutOfBounds(format!(
                "{}..{} exceeds surface length {}",
                start,
                end,
                surface.len()
            )));
        }
        if end <= start {
            return Err(AnnotationError::EmptySelection);
        }

        let anchor = Anchor::exact(page, start, end).with_quote(self.quote_for(surface, start..end));
        tracing::debug!(page, start, end, "Created anchor");
        Ok(anchor)
    }

    /// Create a context-only anchor from a quoted snippet
    pub fn anchor_from_snippet(
        &self,
        page: u32,
        literal: &str,
        before: &str,
        after: &str,
    ) -> Result<Anchor> {
        let anchor = Anchor::context(
            page,
            literal,
            last_words(before, self.context_words),
            first_words(after, self.context_words),
        );
        anchor.validate()?;
        Ok(anchor)
    }

    /// Snapshot the quote and context words around a range
    pub fn quote_for(&self, surface: &FlattenedSurface, range: Range<usize>) -> TextQuote {
        let text = surface.text();
        let start = surface.byte_offset(range.start);
        let end = surface.byte_offset(range.end).max(start);

        TextQuote {
            exact: text[start..end].to_string(),
            prefix: last_words(&text[..start], self.context_words).to_string(),
            suffix: first_words(&text[end..], self.context_words).to_string(),
        }
    }

    /// Resolve an anchor against a freshly flattened surface
    pub fn resolve(&self, anchor: &Anchor, surface: &FlattenedSurface) -> Result<ResolvedRange> {
        let exact = || {
            resolve_exact(anchor, surface).map(|range| ResolvedRange {
                range,
                method: ResolutionMethod::Exact,
            })
        };
        let context = || {
            resolve_context(anchor, surface).map(|range| ResolvedRange {
                range,
                method: ResolutionMethod::Context,
            })
        };

        let resolved = match self.strategy {
            ResolutionStrategy::ExactThenContext => exact().or_else(context),
            ResolutionStrategy::ExactOnly => exact(),
            ResolutionStrategy::ContextOnly => context(),
        };

        match resolved {
            Some(resolved) => {
                if resolved.method == ResolutionMethod::Context && anchor.position.is_some() {
                    tracing::debug!(
                        page = anchor.page,
                        start = resolved.range.start,
                        end = resolved.range.end,
                        "Anchor drifted, recovered from context"
                    );
                }
                Ok(resolved)
            }
            None => Err(AnnotationError::AnchorUnresolvable { page: anchor.page }),
        }
    }
}

/// Exact offsets, valid while in bounds and still covering the quoted text
fn resolve_exact(anchor: &Anchor, surface: &FlattenedSurface) -> Option<Range<usize>> {
    let position = anchor.position?;
    if position.start >= position.end || position.end > surface.len() {
        return None;
    }

    if let Some(literal) = anchor.literal() {
        if surface.slice(position.start..position.end)? != literal {
            return None;
        }
    }

    Some(position.start..position.end)
}

/// First occurrence of the quote whose surroundings match its context
fn resolve_context(anchor: &Anchor, surface: &FlattenedSurface) -> Option<Range<usize>> {
    let quote = anchor.quote.as_ref()?;
    if quote.exact.is_empty() {
        return None;
    }

    let text = surface.text();
    let prefix = quote.prefix.trim();
    let suffix = quote.suffix.trim();

    let mut from = 0;
    while let Some(found) = text[from..].find(quote.exact.as_str()) {
        let start = from + found;
        let end = start + quote.exact.len();

        if text[..start].trim_end().ends_with(prefix) && text[end..].trim_start().starts_with(suffix)
        {
            return Some(surface.char_offset(start)..surface.char_offset(end));
        }

        // Step one char so overlapping occurrences are considered
        from = start + text[start..].chars().next().map_or(1, char::len_utf8);
    }

    None
}

/// The last `n` whitespace-delimited words of `text`, as they appear
fn last_words(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }

    let trimmed = text.trim_end();
    let mut count = 0;
    let mut start = trimmed.len();
    let mut in_word = false;

    for (idx, ch) in trimmed.char_indices().rev() {
        if ch.is_whitespace() {
            if in_word {
                count += 1;
                in_word = false;
                if count == n {
                    break;
                }
            }
        } else {
            in_word = true;
            start = idx;
        }
    }

    &trimmed[start..]
}

/// The first `n` whitespace-delimited words of `text`, as they appear
fn first_words(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }

    let trimmed = text.trim_start();
    let mut count = 0;
    let mut end = 0;
    let mut in_word = false;

    for (idx, ch) in trimmed.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                count += 1;
                in_word = false;
                if count == n {
                    break;
                }
            }
        } else {
            in_word = true;
            end = idx + ch.len_utf8();
        }
    }

    &trimmed[..end]
}
