//! Annotator
//!
//! Wires the gateway, store, resolver and overlay renderer into the two flows
//! a reader UI needs: committing a selection and rendering a page.

use crate::annotations::{AnchorResolver, Annotation, AnnotationStore, StorageWarning};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::{SelectionGateway, SelectionRequest, SelectionResponse};
use crate::html::{inject_overlay, OverlayConfig};
use crate::overlay::{build_plan, RenderPlan, ResolvedAnnotation};
use crate::storage::{FileStore, KeyValueStore};
use crate::surface::{flatten, FlattenedSurface, HtmlSurface};

/// A page's render plan and the annotations that could not be placed
#[derive(Debug, Clone)]
pub struct PageRender {
    pub page: u32,
    pub plan: RenderPlan,
    /// Annotations whose anchor did not resolve, in insertion order
    pub skipped: Vec<Annotation>,
}

/// A page render materialized onto HTML
#[derive(Debug, Clone)]
pub struct HtmlPageRender {
    pub html: String,
    pub render: PageRender,
    pub decorated_count: usize,
    pub marker_count: usize,
}

/// Outcome of committing a selection
#[derive(Debug, Clone)]
pub struct Commit {
    pub response: SelectionResponse,
    /// The page as it renders after the commit
    pub render: PageRender,
}

pub struct Annotator<S: KeyValueStore> {
    store: AnnotationStore<S>,
    gateway: SelectionGateway,
    resolver: AnchorResolver,
    overlay: OverlayConfig,
}

impl Annotator<FileStore> {
    /// Open an annotator persisting to the configured directory
    pub fn open_dir(config: &Config) -> Result<(Self, Vec<StorageWarning>)> {
        let backend = FileStore::new(&config.storage.dir)?;
        Self::open(backend, config)
    }
}

impl<S: KeyValueStore> Annotator<S> {
    pub fn open(backend: S, config: &Config) -> Result<(Self, Vec<StorageWarning>)> {
        let (store, warnings) = AnnotationStore::open(backend, config.storage.keys.clone())?;
        for warning in &warnings {
            tracing::warn!(%warning, "Annotation storage warning");
        }

        let resolver = AnchorResolver::new(config.anchoring.context_words, config.anchoring.strategy);
        let gateway = SelectionGateway::new(resolver.clone(), config.palette.clone());

        Ok((
            Self {
                store,
                gateway,
                resolver,
                overlay: config.overlay.clone(),
            },
            warnings,
        ))
    }

    /// Turn a selection into an annotation, persist it and re-plan the page.
    ///
    /// A rejected selection leaves the store untouched. If persisting fails
    /// the annotation is dropped again before the error is returned.
    pub fn commit_selection(
        &mut self,
        surface: &FlattenedSurface,
        request: &SelectionRequest,
    ) -> Result<Commit> {
        let response = self.gateway.handle(surface, request);

        if let SelectionResponse::AnchorCreated { annotation } = &response {
            let len_before = self.store.len();
            self.store.append(annotation.clone())?;
            if let Err(e) = self.store.persist() {
                self.store.truncate(len_before);
                return Err(e);
            }
        }

        let render = self.render_page(request.page, surface);
        Ok(Commit { response, render })
    }

    /// Resolve the page's annotations in insertion order and plan the overlay
    pub fn render_page(&self, page: u32, surface: &FlattenedSurface) -> PageRender {
        let set = self.store.load_for_page(page);
        let mut resolved = Vec::with_capacity(set.len());
        let mut skipped = Vec::new();

        for annotation in set.annotations {
            match self.resolver.resolve(annotation.anchor(), surface) {
                Ok(range) => resolved.push(ResolvedAnnotation::new(range.range, annotation.decoration())),
                Err(e) => {
                    tracing::warn!(page, error = %e, "Skipping annotation that no longer anchors");
                    skipped.push(annotation);
                }
            }
        }

        let plan = build_plan(surface.text(), &resolved);
        tracing::debug!(
            page,
            resolved = resolved.len(),
            skipped = skipped.len(),
            runs = plan.runs().len(),
            "Planned page overlay"
        );

        PageRender {
            page,
            plan,
            skipped,
        }
    }

    /// Render a page given as HTML, returning the decorated markup
    pub fn render_html_page(&self, page: u32, html: &str) -> Result<HtmlPageRender> {
        let parsed = HtmlSurface::parse(html)?;
        let surface = flatten(&parsed);
        let render = self.render_page(page, &surface);
        let injected = inject_overlay(parsed.html(), &render.plan, &self.overlay)?;

        Ok(HtmlPageRender {
            html: injected.html,
            render,
            decorated_count: injected.decorated_count,
            marker_count: injected.marker_count,
        })
    }

    /// Remove an annotation and persist the change.
    ///
    /// If persisting fails the annotation goes back to its old position.
    pub fn remove(&mut self, annotation: &Annotation) -> Result<bool> {
        let Some(idx) = self.store.position(annotation) else {
            return Ok(false);
        };

        let removed = self.store.remove_at(idx);
        if let Err(e) = self.store.persist() {
            self.store.insert_at(idx, removed);
            return Err(e);
        }
        Ok(true)
    }

    pub fn store(&self) -> &AnnotationStore<S> {
        &self.store
    }

    pub fn gateway(&self) -> &SelectionGateway {
        &self.gateway
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{Anchor, StorageKeys};
    use crate::gateway::{RejectionReason, RequestedDecoration};
    use crate::overlay::Decoration;
    use crate::storage::flaky::{FailSwitch, FlakyStore};
    use crate::storage::MemoryStore;
    use crate::surface::{NodeId, SurfacePosition};
    use tempfile::TempDir;

    const PAGE_ONE: &str = "<div class=\"page\"><p>Lorem ipsum <b>dolor</b> sit amet, consectetur adipiscing elit.</p><p>Sed do eiusmod tempor.</p></div>";

    fn annotator() -> Annotator<MemoryStore> {
        let (annotator, warnings) = Annotator::open(MemoryStore::new(), &Config::default()).unwrap();
        assert!(warnings.is_empty());
        annotator
    }

    fn select(page: u32, start: usize, end: usize, decoration: RequestedDecoration) -> SelectionRequest {
        SelectionRequest {
            page,
            start: SurfacePosition::new(NodeId(0), start),
            end: SurfacePosition::new(NodeId(0), end),
            decoration,
        }
    }

    fn red() -> RequestedDecoration {
        RequestedDecoration::Highlight {
            color: "red".to_string(),
        }
    }

    #[test]
    fn test_commit_and_render() {
        let mut annotator = annotator();
        let surface = FlattenedSurface::from_text("ab CD ef");

        let commit = annotator.commit_selection(&surface, &select(1, 3, 5, red())).unwrap();

        assert!(commit.response.annotation().is_some());
        let texts: Vec<&str> = commit.render.plan.runs().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["ab ", "CD", " ef"]);
        assert_eq!(
            commit.render.plan.runs()[1].decorations[0].decoration,
            Decoration::Highlight {
                color: "red".to_string()
            }
        );
        assert!(annotator.store().backend().contains_key("highlights"));
    }

    #[test]
    fn test_rejected_selection_leaves_store_untouched() {
        let mut annotator = annotator();
        let surface = FlattenedSurface::from_text("ab CD ef");

        let commit = annotator.commit_selection(&surface, &select(1, 4, 4, red())).unwrap();

        assert_eq!(
            commit.response,
            SelectionResponse::RejectedSelection {
                reason: RejectionReason::EmptySelection
            }
        );
        assert!(annotator.store().is_empty());
        assert!(!annotator.store().backend().contains_key("highlights"));
        assert_eq!(commit.render.plan.decorated_runs().count(), 0);
    }

    #[test]
    fn test_overlapping_commits_nest_by_insertion() {
        let mut annotator = annotator();
        let surface = FlattenedSurface::from_text("abcdef");
        let note = RequestedDecoration::Note {
            title: "B".to_string(),
            category: "c".to_string(),
            body: "b".to_string(),
        };

        annotator.commit_selection(&surface, &select(1, 0, 4, red())).unwrap();
        let commit = annotator.commit_selection(&surface, &select(1, 2, 6, note)).unwrap();

        let layers: Vec<Vec<usize>> = commit
            .render
            .plan
            .runs()
            .iter()
            .map(|r| r.layers().collect())
            .collect();
        assert_eq!(layers, vec![vec![0], vec![0, 1], vec![1]]);
    }

    #[test]
    fn test_render_skips_unresolvable() {
        let backend = MemoryStore::new().with_entry(
            "highlights",
            r#"[{"text":"gone","color":"red","page":1,"startOffset":0,"endOffset":4,"order":0},
                {"text":"ab","color":"blue","page":1,"startOffset":0,"endOffset":2,"order":1}]"#,
        );
        let (annotator, _) = Annotator::open(backend, &Config::default()).unwrap();

        let render = annotator.render_page(1, &FlattenedSurface::from_text("ab CD ef"));

        assert_eq!(render.skipped.len(), 1);
        assert_eq!(render.skipped[0].anchor().literal(), Some("gone"));
        assert_eq!(render.plan.decorated_runs().count(), 1);
    }

    #[test]
    fn test_render_recovers_drift() {
        let mut annotator = annotator();
        let original = FlattenedSurface::from_text("alpha beta gamma delta");
        annotator.commit_selection(&original, &select(1, 11, 16, red())).unwrap();

        let edited = FlattenedSurface::from_text("intro alpha beta gamma delta");
        let render = annotator.render_page(1, &edited);

        assert!(render.skipped.is_empty());
        let run = render.plan.decorated_runs().next().unwrap();
        assert_eq!((run.start, run.end, run.text.as_str()), (17, 22, "gamma"));
    }

    #[test]
    fn test_pages_are_independent() {
        let mut annotator = annotator();
        let surface = FlattenedSurface::from_text("ab CD ef");
        annotator.commit_selection(&surface, &select(2, 0, 2, red())).unwrap();

        assert_eq!(annotator.render_page(1, &surface).plan.decorated_runs().count(), 0);
        assert_eq!(annotator.render_page(2, &surface).plan.decorated_runs().count(), 1);
    }

    #[test]
    fn test_render_html_page() {
        let mut annotator = annotator();
        let parsed = HtmlSurface::parse(PAGE_ONE).unwrap();
        let surface = flatten(&parsed);
        let start = surface.text().find("dolor").unwrap();
        let request = SelectionRequest {
            page: 1,
            start: surface.position_at(start).unwrap(),
            end: surface.position_at(start + 5).unwrap(),
            decoration: RequestedDecoration::Note {
                title: "Latin".to_string(),
                category: "language".to_string(),
                body: "pain".to_string(),
            },
        };
        annotator.commit_selection(&surface, &request).unwrap();

        let rendered = annotator.render_html_page(1, PAGE_ONE).unwrap();
        assert_eq!(rendered.decorated_count, 1);
        assert!(rendered.html.contains("<b><span data-ll-overlay"));
        assert!(rendered.html.contains("data-note-title=\"Latin\""));

        // Rendering already decorated markup gives the same result
        let again = annotator.render_html_page(1, &rendered.html).unwrap();
        assert_eq!(again.html, rendered.html);
    }

    #[test]
    fn test_remove_persists() {
        let mut annotator = annotator();
        let surface = FlattenedSurface::from_text("ab CD ef");
        let commit = annotator.commit_selection(&surface, &select(1, 3, 5, red())).unwrap();
        let annotation = commit.response.annotation().unwrap().clone();

        assert!(annotator.remove(&annotation).unwrap());
        assert!(!annotator.remove(&annotation).unwrap());
        assert_eq!(
            annotator.store().backend().get("highlights").unwrap().as_deref(),
            Some("[]")
        );
    }

    fn flaky_annotator() -> (Annotator<FlakyStore>, FailSwitch) {
        let (backend, switch) = FlakyStore::new();
        let (annotator, _) = Annotator::open(backend, &Config::default()).unwrap();
        (annotator, switch)
    }

    #[test]
    fn test_failed_commit_keeps_insertion_order() {
        let (mut annotator, switch) = flaky_annotator();
        let surface = FlattenedSurface::from_text("abcdef");
        let blue = RequestedDecoration::Highlight {
            color: "blue".to_string(),
        };
        annotator.commit_selection(&surface, &select(1, 0, 4, red())).unwrap();
        annotator.commit_selection(&surface, &select(1, 2, 6, blue)).unwrap();
        let before = annotator.store().annotations().to_vec();

        switch.fail_writes_to("*");
        assert!(annotator.commit_selection(&surface, &select(1, 0, 4, red())).is_err());

        assert_eq!(annotator.store().annotations(), before.as_slice());
    }

    #[test]
    fn test_failed_commit_is_not_persisted() {
        let (mut annotator, switch) = flaky_annotator();
        let surface = FlattenedSurface::from_text("ab CD ef");

        switch.fail_writes_to("notes");
        assert!(annotator.commit_selection(&surface, &select(1, 3, 5, red())).is_err());
        assert!(annotator.store().is_empty());

        let backend = annotator.store().backend().inner.clone();
        let (reopened, _) = Annotator::open(backend, &Config::default()).unwrap();
        assert!(reopened.store().is_empty());
    }

    #[test]
    fn test_failed_remove_restores_position() {
        let (mut annotator, switch) = flaky_annotator();
        let surface = FlattenedSurface::from_text("abcdef");
        let first = annotator
            .commit_selection(&surface, &select(1, 0, 2, red()))
            .unwrap()
            .response
            .annotation()
            .cloned()
            .unwrap();
        annotator.commit_selection(&surface, &select(1, 3, 5, red())).unwrap();
        let before = annotator.store().annotations().to_vec();

        switch.fail_writes_to("notes");
        assert!(annotator.remove(&first).is_err());
        assert_eq!(annotator.store().annotations(), before.as_slice());

        let backend = annotator.store().backend().inner.clone();
        let (reopened, _) = Annotator::open(backend, &Config::default()).unwrap();
        assert_eq!(reopened.store().annotations(), before.as_slice());

        switch.heal();
        assert!(annotator.remove(&first).unwrap());
        assert_eq!(annotator.store().len(), 1);
    }

    #[test]
    fn test_annotations_survive_sessions() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.dir = dir.path().to_path_buf();
        config.storage.keys = StorageKeys {
            highlights: "book.highlights".to_string(),
            notes: "book.notes".to_string(),
        };
        let surface = FlattenedSurface::from_text("ab CD ef");

        {
            let (mut annotator, _) = Annotator::open_dir(&config).unwrap();
            annotator.commit_selection(&surface, &select(1, 3, 5, red())).unwrap();
        }

        let (annotator, warnings) = Annotator::open_dir(&config).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(annotator.store().len(), 1);
        assert_eq!(
            annotator.store().annotations()[0].anchor().position,
            Anchor::exact(1, 3, 5).position
        );
    }
}
