//! Overlay render plans
//!
//! Turns the resolved ranges of a page's annotations into a [`RenderPlan`]:
//! an ordered list of runs covering the whole flattened text, each carrying
//! the decorations active over it. Input ranges may overlap, abut or nest;
//! output runs never overlap.
//!
//! Decorations on a run are ordered by their position in the input slice,
//! which is the page's insertion order. The lowest layer is the outermost
//! wrapper, so a note added after a highlight nests inside the highlight span.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

/// What a decoration draws
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Decoration {
    /// Colored highlight span
    Highlight { color: String },
    /// Note marker nested inside whatever wraps it
    NoteMarker {
        title: String,
        category: String,
        body: String,
    },
}

impl Decoration {
    /// Short name used in markup and logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            Decoration::Highlight { .. } => "highlight",
            Decoration::NoteMarker { .. } => "note",
        }
    }
}

/// An annotation whose anchor has been resolved against the current surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnnotation {
    /// Character range in the flattened text
    pub range: Range<usize>,
    pub decoration: Decoration,
}

impl ResolvedAnnotation {
    pub fn new(range: Range<usize>, decoration: Decoration) -> Self {
        Self { range, decoration }
    }
}

/// A decoration as applied to a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDecoration {
    /// Index of the annotation in the plan input
    pub layer: usize,
    pub decoration: Decoration,
}

/// A maximal text segment sharing one set of decorations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Outermost first
    pub decorations: Vec<AppliedDecoration>,
}

impl Run {
    pub fn is_decorated(&self) -> bool {
        !self.decorations.is_empty()
    }

    /// Layers of the decorations on this run, outermost first
    pub fn layers(&self) -> impl Iterator<Item = usize> + '_ {
        self.decorations.iter().map(|d| d.layer)
    }
}

/// Decoration whose range collapsed to a single offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub offset: usize,
    pub layer: usize,
    pub decoration: Decoration,
}

/// Ordered runs covering a page's flattened text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderPlan {
    runs: Vec<Run>,
    markers: Vec<Marker>,
    len: usize,
}

impl RenderPlan {
    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// Zero-width decorations, sorted by offset then layer
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Length in characters of the text the plan covers
    pub fn text_len(&self) -> usize {
        self.len
    }

    /// Concatenation of all run texts
    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn decorated_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter().filter(|run| run.is_decorated())
    }

    /// The run containing `offset`
    pub fn run_at(&self, offset: usize) -> Option<&Run> {
        let idx = self.runs.partition_point(|run| run.end <= offset);
        self.runs.get(idx)
    }
}

/// Build the render plan for `text` and its resolved annotations.
///
/// Pure and deterministic: the same inputs always give the same plan.
/// Ranges are clamped to the text; a range that collapses becomes a
/// [`Marker`] instead of a run.
pub fn build_plan(text: &str, annotations: &[ResolvedAnnotation]) -> RenderPlan {
    let char_bytes: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = char_bytes.len() - 1;

    let ranges: Vec<Range<usize>> = annotations
        .iter()
        .map(|annotation| {
            let start = annotation.range.start.min(len);
            let end = annotation.range.end.min(len).max(start);
            start..end
        })
        .collect();

    let mut boundaries = BTreeSet::from([0, len]);
    let mut markers = Vec::new();
    for (layer, range) in ranges.iter().enumerate() {
        if range.is_empty() {
            markers.push(Marker {
                offset: range.start,
                layer,
                decoration: annotations[layer].decoration.clone(),
            });
        } else {
            boundaries.insert(range.start);
            boundaries.insert(range.end);
        }
    }
    markers.sort_by_key(|marker| (marker.offset, marker.layer));

    let boundaries: Vec<usize> = boundaries.into_iter().collect();
    let mut runs: Vec<Run> = Vec::new();

    for window in boundaries.windows(2) {
        let (a, b) = (window[0], window[1]);
        let layers: Vec<usize> = ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| !range.is_empty() && range.start <= a && range.end >= b)
            .map(|(layer, _)| layer)
            .collect();
        let segment = &text[char_bytes[a]..char_bytes[b]];

        if let Some(last) = runs.last_mut() {
            if last.layers().eq(layers.iter().copied()) {
                last.end = b;
                last.text.push_str(segment);
                continue;
            }
        }

        runs.push(Run {
            start: a,
            end: b,
            text: segment.to_string(),
            decorations: layers
                .into_iter()
                .map(|layer| AppliedDecoration {
                    layer,
                    decoration: annotations[layer].decoration.clone(),
                })
                .collect(),
        });
    }

    tracing::debug!(
        annotations = annotations.len(),
        runs = runs.len(),
        markers = markers.len(),
        "Built render plan"
    );

    RenderPlan { runs, markers, len }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn highlight(range: Range<usize>, color: &str) -> ResolvedAnnotation {
        ResolvedAnnotation::new(
            range,
            Decoration::Highlight {
                color: color.to_string(),
            },
        )
    }

    fn note(range: Range<usize>, title: &str) -> ResolvedAnnotation {
        ResolvedAnnotation::new(
            range,
            Decoration::NoteMarker {
                title: title.to_string(),
                category: "general".to_string(),
                body: String::new(),
            },
        )
    }

    fn shape(plan: &RenderPlan) -> Vec<(&str, Vec<usize>)> {
        plan.runs()
            .iter()
            .map(|run| (run.text.as_str(), run.layers().collect()))
            .collect()
    }

    #[test]
    fn test_single_highlight() {
        let plan = build_plan("ab CD ef", &[highlight(3..5, "red")]);

        assert_eq!(
            shape(&plan),
            vec![("ab ", vec![]), ("CD", vec![0]), (" ef", vec![])]
        );
        assert_eq!(
            plan.runs()[1].decorations[0].decoration,
            Decoration::Highlight {
                color: "red".to_string()
            }
        );
    }

    #[test]
    fn test_overlapping_ranges() {
        let plan = build_plan("abcdef", &[highlight(0..4, "red"), highlight(2..6, "blue")]);

        assert_eq!(
            shape(&plan),
            vec![("ab", vec![0]), ("cd", vec![0, 1]), ("ef", vec![1])]
        );
        assert_eq!((plan.runs()[1].start, plan.runs()[1].end), (2, 4));
    }

    #[test]
    fn test_note_nests_inside_highlight() {
        let plan = build_plan(
            "the quick brown fox",
            &[highlight(4..15, "yellow"), note(10..15, "color")],
        );

        let brown = plan.run_at(12).unwrap();
        assert_eq!(brown.text, "brown");
        assert_eq!(brown.decorations[0].decoration.kind_name(), "highlight");
        assert_eq!(brown.decorations[1].decoration.kind_name(), "note");
    }

    #[test]
    fn test_no_annotations_single_run() {
        let plan = build_plan("plain page", &[]);

        assert_eq!(plan.runs().len(), 1);
        assert_eq!(plan.runs()[0].text, "plain page");
        assert!(!plan.runs()[0].is_decorated());
    }

    #[test]
    fn test_empty_text() {
        let plan = build_plan("", &[highlight(0..3, "red")]);

        assert!(plan.runs().is_empty());
        assert_eq!(plan.markers().len(), 1);
        assert_eq!(plan.text_len(), 0);
    }

    #[test]
    fn test_collapsed_range_becomes_marker() {
        let plan = build_plan("abcdef", &[highlight(0..6, "red"), highlight(3..3, "blue")]);

        assert_eq!(shape(&plan), vec![("abcdef", vec![0])]);
        assert_eq!(plan.markers()[0].offset, 3);
        assert_eq!(plan.markers()[0].layer, 1);
    }

    #[test]
    fn test_abutting_ranges_stay_separate() {
        let plan = build_plan("abcdef", &[highlight(0..3, "red"), highlight(3..6, "red")]);

        assert_eq!(shape(&plan), vec![("abc", vec![0]), ("def", vec![1])]);
    }

    #[test]
    fn test_out_of_range_annotations_are_clamped() {
        let plan = build_plan("abc", &[highlight(1..40, "red"), highlight(10..20, "blue")]);

        assert_eq!(shape(&plan), vec![("a", vec![]), ("bc", vec![0])]);
        assert_eq!(plan.markers()[0].offset, 3);
    }

    #[test]
    fn test_multibyte_text() {
        let plan = build_plan("añb€c", &[highlight(1..4, "red")]);

        assert_eq!(shape(&plan), vec![("a", vec![]), ("ñb€", vec![0]), ("c", vec![])]);
    }

    #[test]
    fn test_plan_serializes_for_the_ui() {
        let plan = build_plan("ab CD ef", &[note(3..5, "Remember")]);
        let json = serde_json::to_string(&plan).unwrap();

        assert!(json.contains("\"kind\":\"noteMarker\""));
        assert!(json.contains("\"title\":\"Remember\""));
    }

    fn arb_annotations() -> impl Strategy<Value = Vec<ResolvedAnnotation>> {
        prop::collection::vec((0usize..48, 0usize..48, 0usize..3), 0..6).prop_map(|specs| {
            specs
                .into_iter()
                .map(|(a, b, kind)| {
                    let range = a.min(b)..a.max(b);
                    match kind {
                        0 => highlight(range, "red"),
                        1 => highlight(range, "green"),
                        _ => note(range, "n"),
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_runs_cover_text(text in "[a-zé ]{0,40}", annotations in arb_annotations()) {
            let plan = build_plan(&text, &annotations);

            prop_assert_eq!(plan.text(), text.clone());
            let mut expected_start = 0;
            for run in plan.runs() {
                prop_assert_eq!(run.start, expected_start);
                prop_assert!(run.end > run.start);
                expected_start = run.end;
            }
            prop_assert_eq!(expected_start, text.chars().count());
        }

        #[test]
        fn prop_build_plan_is_idempotent(text in "[a-z ]{0,40}", annotations in arb_annotations()) {
            prop_assert_eq!(build_plan(&text, &annotations), build_plan(&text, &annotations));
        }

        #[test]
        fn prop_decorations_follow_insertion_order(text in "[a-z ]{0,40}", annotations in arb_annotations()) {
            let plan = build_plan(&text, &annotations);
            let len = text.chars().count();

            for run in plan.runs() {
                let layers: Vec<usize> = run.layers().collect();
                prop_assert!(layers.windows(2).all(|w| w[0] < w[1]));

                let expected: Vec<usize> = annotations
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| {
                        let start = a.range.start.min(len);
                        let end = a.range.end.min(len);
                        start < end && start <= run.start && end >= run.end
                    })
                    .map(|(layer, _)| layer)
                    .collect();
                prop_assert_eq!(layers, expected);
            }

            for pair in plan.runs().windows(2) {
                prop_assert!(!pair[0].layers().eq(pair[1].layers()));
            }
        }
    }
}
