//! Key-value storage for annotations
//!
//! Annotations are kept in memory in insertion order and persisted as two
//! JSON arrays, one for highlights and one for notes, through a
//! [`KeyValueStore`] backend.

use serde::{Deserialize, Serialize};

use super::types::{Anchor, Annotation, AnnotationSet, Highlight, Note, TextPosition, TextQuote};
use crate::error::{AnnotationError, Result};
use crate::storage::KeyValueStore;

/// Suffix of the key a corrupt blob is copied to before it is ignored
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// Keys the two annotation arrays are stored under
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageKeys {
    pub highlights: String,
    pub notes: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            highlights: "highlights".to_string(),
            notes: "notes".to_string(),
        }
    }
}

/// Something that went wrong while loading, without stopping the load
#[derive(Debug)]
pub enum StorageWarning {
    /// A blob could not be parsed; it was copied to `backup_key` and ignored
    Corrupt {
        backup_key: String,
        error: AnnotationError,
    },
    /// A single record was parsed but does not describe a valid annotation
    InvalidRecord {
        key: String,
        index: usize,
        error: AnnotationError,
    },
}

impl std::fmt::Display for StorageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageWarning::Corrupt { backup_key, error } => {
                write!(f, "{} (saved as {:?})", error, backup_key)
            }
            StorageWarning::InvalidRecord { key, index, error } => {
                write!(f, "Skipped record {} under {:?}: {}", index, key, error)
            }
        }
    }
}

/// Anchor fields shared by both record kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorRecord {
    text: String,
    page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_after: Option<String>,
    /// Position in the combined collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order: Option<u64>,
}

impl AnchorRecord {
    fn from_anchor(anchor: &Anchor, order: usize) -> Self {
        let quote = anchor.quote.as_ref();
        Self {
            text: quote.map(|q| q.exact.clone()).unwrap_or_default(),
            page: anchor.page,
            start_offset: anchor.position.map(|p| p.start),
            end_offset: anchor.position.map(|p| p.end),
            context_before: quote.map(|q| q.prefix.clone()),
            context_after: quote.map(|q| q.suffix.clone()),
            order: Some(order as u64),
        }
    }

    fn into_anchor(self) -> Anchor {
        let position = match (self.start_offset, self.end_offset) {
            (Some(start), Some(end)) => Some(TextPosition { start, end }),
            _ => None,
        };
        let quote = (!self.text.is_empty()).then(|| TextQuote {
            exact: self.text,
            prefix: self.context_before.unwrap_or_default(),
            suffix: self.context_after.unwrap_or_default(),
        });

        Anchor {
            page: self.page,
            position,
            quote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HighlightRecord {
    color: String,
    #[serde(flatten)]
    anchor: AnchorRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteRecord {
    title: String,
    category: String,
    note_content: String,
    #[serde(flatten)]
    anchor: AnchorRecord,
}

/// In-memory annotation collection backed by a key-value store
pub struct AnnotationStore<S: KeyValueStore> {
    backend: S,
    keys: StorageKeys,
    annotations: Vec<Annotation>,
}

impl<S: KeyValueStore> AnnotationStore<S> {
    /// Load both arrays from the backend.
    ///
    /// Corrupt blobs are copied aside and treated as empty; nothing already
    /// persisted is cleared. Only backend failures are returned as errors.
    pub fn open(mut backend: S, keys: StorageKeys) -> Result<(Self, Vec<StorageWarning>)> {
        let mut warnings = Vec::new();

        let highlights: Vec<HighlightRecord> =
            load_records(&mut backend, &keys.highlights, &mut warnings)?;
        let notes: Vec<NoteRecord> = load_records(&mut backend, &keys.notes, &mut warnings)?;

        // Unordered records follow ordered ones, highlights before notes
        let mut loaded: Vec<(Option<u64>, usize, &str, usize, Annotation)> = Vec::new();
        for (index, record) in highlights.into_iter().enumerate() {
            let order = record.anchor.order;
            let annotation = Annotation::Highlight(Highlight {
                anchor: record.anchor.into_anchor(),
                color: record.color,
            });
            loaded.push((order, loaded.len(), keys.highlights.as_str(), index, annotation));
        }
        for (index, record) in notes.into_iter().enumerate() {
            let order = record.anchor.order;
            let annotation = Annotation::Note(Note {
                anchor: record.anchor.into_anchor(),
                title: record.title,
                category: record.category,
                body: record.note_content,
            });
            loaded.push((order, loaded.len(), keys.notes.as_str(), index, annotation));
        }
        loaded.sort_by_key(|(order, seq, ..)| (order.is_none(), *order, *seq));

        let mut annotations = Vec::with_capacity(loaded.len());
        for (_, _, key, index, annotation) in loaded {
            match annotation.anchor().validate() {
                Ok(()) => annotations.push(annotation),
                Err(error) => {
                    tracing::warn!(key, index, %error, "Skipping invalid stored annotation");
                    warnings.push(StorageWarning::InvalidRecord {
                        key: key.to_string(),
                        index,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            annotations = annotations.len(),
            warnings = warnings.len(),
            "Opened annotation store"
        );

        Ok((
            Self {
                backend,
                keys,
                annotations,
            },
            warnings,
        ))
    }

    /// Append an annotation after validating its anchor
    pub fn append(&mut self, annotation: Annotation) -> Result<()> {
        annotation.anchor().validate()?;
        self.annotations.push(annotation);
        Ok(())
    }

    /// The annotations of one page, in insertion order
    pub fn load_for_page(&self, page: u32) -> AnnotationSet {
        AnnotationSet {
            page,
            annotations: self
                .annotations
                .iter()
                .filter(|a| a.page() == page)
                .cloned()
                .collect(),
        }
    }

    /// Write the whole collection, every page, to the backend
    pub fn persist(&mut self) -> Result<()> {
        let mut highlights = Vec::new();
        let mut notes = Vec::new();

        for (order, annotation) in self.annotations.iter().enumerate() {
            match annotation {
                Annotation::Highlight(h) => highlights.push(HighlightRecord {
                    color: h.color.clone(),
                    anchor: AnchorRecord::from_anchor(&h.anchor, order),
                }),
                Annotation::Note(n) => notes.push(NoteRecord {
                    title: n.title.clone(),
                    category: n.category.clone(),
                    note_content: n.body.clone(),
                    anchor: AnchorRecord::from_anchor(&n.anchor, order),
                }),
            }
        }

        let highlights_json = serde_json::to_string(&highlights)?;
        let notes_json = serde_json::to_string(&notes)?;

        // Both keys change together or not at all
        let previous = self.backend.get(&self.keys.highlights)?;
        self.backend.set(&self.keys.highlights, &highlights_json)?;
        if let Err(e) = self.backend.set(&self.keys.notes, &notes_json) {
            let restored = match &previous {
                Some(blob) => self.backend.set(&self.keys.highlights, blob),
                None => self.backend.remove(&self.keys.highlights),
            };
            if let Err(restore_error) = restored {
                tracing::warn!(
                    key = %self.keys.highlights,
                    error = %restore_error,
                    "Could not restore highlights after a failed persist"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            highlights = highlights.len(),
            notes = notes.len(),
            "Persisted annotations"
        );
        Ok(())
    }

    /// Remove the first annotation equal to `annotation`
    pub fn remove(&mut self, annotation: &Annotation) -> bool {
        match self.position(annotation) {
            Some(idx) => {
                self.annotations.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Index of the first annotation equal to `annotation`
    pub fn position(&self, annotation: &Annotation) -> Option<usize> {
        self.annotations.iter().position(|a| a == annotation)
    }

    /// Drop everything appended after the first `len` annotations
    pub(crate) fn truncate(&mut self, len: usize) {
        self.annotations.truncate(len);
    }

    pub(crate) fn remove_at(&mut self, idx: usize) -> Annotation {
        self.annotations.remove(idx)
    }

    pub(crate) fn insert_at(&mut self, idx: usize, annotation: Annotation) {
        let idx = idx.min(self.annotations.len());
        self.annotations.insert(idx, annotation);
    }

    /// Drop every annotation, in memory and in the backend
    pub fn clear(&mut self) -> Result<()> {
        self.annotations.clear();
        self.backend.remove(&self.keys.highlights)?;
        self.backend.remove(&self.keys.notes)?;
        tracing::info!("Cleared annotation store");
        Ok(())
    }

    /// Every annotation, in insertion order
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn into_backend(self) -> S {
        self.backend
    }
}

/// Read and parse one array, setting corrupt blobs aside
fn load_records<S, T>(
    backend: &mut S,
    key: &str,
    warnings: &mut Vec<StorageWarning>,
) -> Result<Vec<T>>
where
    S: KeyValueStore,
    T: for<'de> Deserialize<'de>,
{
    let raw = match backend.get(key)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(Vec::new()),
    };

    match serde_json::from_str(&raw) {
        Ok(records) => Ok(records),
        Err(source) => {
            let backup_key = format!("{}{}", key, CORRUPT_SUFFIX);
            backend.set(&backup_key, &raw)?;
            tracing::warn!(key, backup_key = %backup_key, error = %source, "Stored annotations are corrupt");

            warnings.push(StorageWarning::Corrupt {
                backup_key,
                error: AnnotationError::StorageCorrupt {
                    key: key.to_string(),
                    source,
                },
            });
            Ok(Vec::new())
        }
    }
}
