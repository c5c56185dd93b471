use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::highlight::{AnchorHandle, HighlightReconciler, OverlayBox, PendingAnchor};
use crate::index::RegionIndex;
use crate::interaction::{self, Gesture, GestureOutcome, JumpTo};
use crate::region::{Sentence, SentenceId};
use crate::scroll::{ScrollBehavior, ScrollController, ScrollRequest};
use crate::DocumentId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug)]
pub struct LoadedDocument {
    pub id: DocumentId,
    pub path: PathBuf,
    pub index: RegionIndex,
    /// Unknown until the renderer reports completion.
    pub page_count: Option<usize>,
    pub load_state: LoadState,
}

impl LoadedDocument {
    pub fn is_ready(&self) -> bool {
        self.load_state == LoadState::Ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSelection {
    pub active: Option<SentenceId>,
    pub auto_scroll: bool,
}

#[derive(Debug, Clone)]
pub enum Command {
    SetActive { sentence: Option<SentenceId> },
    SetAutoScroll { enabled: bool },
    ToggleAutoScroll,
    JumpTo { sentence: SentenceId },
    StepSentence { delta: isize },
    PagesLoaded { document: DocumentId, total: usize },
    LoadFailed { document: DocumentId, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentReplaced(DocumentId),
    PagesLoaded { document: DocumentId, total: usize },
    LoadFailed { document: DocumentId, reason: String },
    RedrawNeeded(DocumentId),
    JumpRequested { document: DocumentId, jump: JumpTo },
    ScrollIntoView(ScrollRequest),
}

/// Playback side of the sync: takes jump commands and reports which
/// sentence is being spoken.
pub trait PlaybackTransport {
    fn jump_to(&mut self, sentence: SentenceId);
    fn poll_active(&mut self, now: Instant) -> Option<SentenceId>;
}

pub struct Session {
    document: Option<LoadedDocument>,
    selection: ActiveSelection,
    reconciler: HighlightReconciler,
    scroll: ScrollController,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(auto_scroll: bool) -> Self {
        Self {
            document: None,
            selection: ActiveSelection {
                active: None,
                auto_scroll,
            },
            reconciler: HighlightReconciler::new(Uuid::nil()),
            scroll: ScrollController::new(auto_scroll),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_scroll_behavior(mut self, behavior: ScrollBehavior) -> Self {
        self.scroll = self.scroll.with_behavior(behavior);
        self
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn document(&self) -> Option<&LoadedDocument> {
        self.document.as_ref()
    }

    pub fn selection(&self) -> ActiveSelection {
        self.selection
    }

    /// Swaps in a new sentence collection. Regions, the active id, pending
    /// scrolls and anchor registrations of the previous document are all
    /// discarded before anything of the new one becomes visible.
    #[instrument(skip(self, sentences), fields(sentences = sentences.len()))]
    pub fn replace_document(&mut self, id: DocumentId, path: &Path, sentences: Vec<Sentence>) {
        let previous = self.document.as_ref().map(|doc| doc.id);
        let index = RegionIndex::build(sentences);

        self.reconciler.reset(id);
        self.scroll.reset();
        self.selection.active = None;
        self.document = Some(LoadedDocument {
            id,
            path: path.to_path_buf(),
            index,
            page_count: None,
            load_state: LoadState::Pending,
        });

        let mut events = self.events.lock();
        if let Some(previous) = previous {
            events.retain(|event| match event {
                SessionEvent::ScrollIntoView(request) => request.document != previous,
                SessionEvent::RedrawNeeded(document) => *document != previous,
                SessionEvent::JumpRequested { document, .. } => *document != previous,
                _ => true,
            });
        }
        events.push(SessionEvent::DocumentReplaced(id));
        info!(%id, path = %path.display(), "document replaced");
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetActive { sentence } => self.set_active(sentence),
            Command::SetAutoScroll { enabled } => self.set_auto_scroll(enabled),
            Command::ToggleAutoScroll => self.set_auto_scroll(!self.selection.auto_scroll),
            Command::JumpTo { sentence } => self.request_jump(sentence),
            Command::StepSentence { delta } => {
                let Some(doc) = self.document.as_ref() else {
                    return;
                };
                let target = match self.selection.active {
                    Some(active) => doc.index.offset_from(active, delta),
                    None => doc.index.sentences().first().map(|s| s.id),
                };
                match target {
                    Some(sentence) => self.request_jump(sentence),
                    None => debug!(delta, "no sentence to step to"),
                }
            }
            Command::PagesLoaded { document, total } => {
                let Some(doc) = self.current_mut(document) else {
                    debug!(%document, "dropping completion for replaced document");
                    return;
                };
                doc.page_count = Some(total);
                doc.load_state = LoadState::Ready;
                self.push(SessionEvent::PagesLoaded { document, total });
                self.push(SessionEvent::RedrawNeeded(document));
            }
            Command::LoadFailed { document, reason } => {
                let Some(doc) = self.current_mut(document) else {
                    debug!(%document, "dropping failure for replaced document");
                    return;
                };
                warn!(%document, %reason, "document failed to load");
                doc.page_count = None;
                doc.load_state = LoadState::Failed(reason.clone());
                self.push(SessionEvent::LoadFailed { document, reason });
                self.push(SessionEvent::RedrawNeeded(document));
            }
        }
    }

    /// Pulls the spoken sentence from the transport; a change becomes a
    /// `SetActive`.
    pub fn sync_playback(&mut self, transport: &mut dyn PlaybackTransport, now: Instant) {
        let active = transport.poll_active(now);
        if active != self.selection.active {
            self.apply(Command::SetActive { sentence: active });
        }
    }

    /// Overlay boxes for `page`. Nothing is drawn until the document's pages
    /// have loaded.
    pub fn overlay_for_page(&self, page: u32) -> Vec<OverlayBox> {
        match self.document.as_ref() {
            Some(doc) if doc.is_ready() => self.reconciler.render(&doc.index, page),
            _ => Vec::new(),
        }
    }

    pub fn pending_anchor(&self) -> Option<PendingAnchor> {
        let doc = self.document.as_ref().filter(|doc| doc.is_ready())?;
        self.reconciler.needs_anchor_registration(&doc.index)
    }

    /// Phase two of the anchor protocol: the surface reports where the
    /// active sentence's anchor ended up.
    pub fn register_anchor(&mut self, handle: AnchorHandle) -> bool {
        match self.selection.active {
            Some(sentence) => self.reconciler.register_anchor(sentence, handle),
            None => false,
        }
    }

    /// Runs once per mounted frame. Emits at most one scroll request.
    pub fn after_mount(&mut self) -> Option<ScrollRequest> {
        let request = self.scroll.resolve(&self.reconciler)?;
        debug!(sentence = request.sentence, top = request.anchor.top, "scroll into view");
        self.push(SessionEvent::ScrollIntoView(request));
        Some(request)
    }

    /// Routes a gesture on `page`. A consumed gesture has already queued its
    /// jump; the caller runs page-level handling only on `Propagate`.
    pub fn route_gesture(&mut self, page: u32, gesture: Gesture) -> GestureOutcome {
        let boxes = self.overlay_for_page(page);
        let outcome = interaction::route_gesture(gesture, &boxes);
        if let GestureOutcome::Consumed(jump) = outcome {
            self.request_jump(jump.sentence);
        }
        outcome
    }

    fn set_active(&mut self, sentence: Option<SentenceId>) {
        if let Some(id) = sentence {
            if !self.knows(id) {
                debug!(id, "ignoring unknown active sentence");
                return;
            }
        }
        self.selection.active = sentence;
        let changed = self.reconciler.activate(sentence);
        self.scroll.observe(sentence, self.selection.auto_scroll);
        if changed {
            debug!(active = ?sentence, "active sentence changed");
            if let Some(document) = self.document.as_ref().map(|doc| doc.id) {
                self.push(SessionEvent::RedrawNeeded(document));
            }
        }
    }

    fn set_auto_scroll(&mut self, enabled: bool) {
        if self.selection.auto_scroll == enabled {
            return;
        }
        debug!(enabled, "auto-scroll toggled");
        self.selection.auto_scroll = enabled;
        self.scroll.observe(self.selection.active, enabled);
        if let Some(document) = self.document.as_ref().map(|doc| doc.id) {
            self.push(SessionEvent::RedrawNeeded(document));
        }
    }

    fn request_jump(&mut self, sentence: SentenceId) {
        let Some(document) = self
            .document
            .as_ref()
            .filter(|doc| doc.index.contains(sentence))
            .map(|doc| doc.id)
        else {
            debug!(sentence, "ignoring jump to unknown sentence");
            return;
        };
        self.push(SessionEvent::JumpRequested {
            document,
            jump: JumpTo { sentence },
        });
    }

    fn knows(&self, sentence: SentenceId) -> bool {
        self.document
            .as_ref()
            .is_some_and(|doc| doc.index.contains(sentence))
    }

    fn current_mut(&mut self, document: DocumentId) -> Option<&mut LoadedDocument> {
        self.document.as_mut().filter(|doc| doc.id == document)
    }

    fn push(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::GestureKind;
    use crate::new_document_id;
    use crate::region::Region;

    fn region(page: u32, x: f32, y: f32) -> Region {
        Region {
            page,
            x,
            y,
            width: 60.0,
            height: 20.0,
            page_width: 600.0,
            page_height: 800.0,
        }
    }

    fn sentences() -> Vec<Sentence> {
        vec![
            Sentence::new(3, "Three.", vec![region(1, 60.0, 700.0)]),
            Sentence::new(5, "Five.", vec![region(1, 60.0, 400.0), region(2, 60.0, 700.0)]),
            Sentence::new(7, "Seven.", vec![region(2, 300.0, 400.0)]),
            Sentence::new(9, "Unplaced.", Vec::new()),
        ]
    }

    fn loaded(auto_scroll: bool) -> (Session, DocumentId) {
        let mut session = Session::new(auto_scroll);
        let id = new_document_id();
        session.replace_document(id, Path::new("book.pdf"), sentences());
        session.apply(Command::PagesLoaded {
            document: id,
            total: 2,
        });
        session.drain_events();
        (session, id)
    }

    fn handle(document: DocumentId, top: f32) -> AnchorHandle {
        AnchorHandle {
            document,
            page: 1,
            top,
            height: 20.0,
        }
    }

    fn jump(document: DocumentId, sentence: SentenceId) -> SessionEvent {
        SessionEvent::JumpRequested {
            document,
            jump: JumpTo { sentence },
        }
    }

    fn scrolls(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ScrollIntoView(_)))
            .count()
    }

    #[test]
    fn nothing_renders_before_pages_load() {
        let mut session = Session::new(true);
        let id = new_document_id();
        session.replace_document(id, Path::new("book.pdf"), sentences());
        assert!(session.overlay_for_page(1).is_empty());
        assert_eq!(session.document().unwrap().page_count, None);

        session.apply(Command::PagesLoaded {
            document: id,
            total: 2,
        });
        assert_eq!(session.overlay_for_page(1).len(), 2);
        assert_eq!(session.document().unwrap().page_count, Some(2));
    }

    #[test]
    fn activation_scrolls_once_with_auto_scroll() {
        let (mut session, id) = loaded(true);
        session.apply(Command::SetActive { sentence: Some(5) });

        let pending = session.pending_anchor().unwrap();
        assert_eq!(pending.sentence, 5);
        assert_eq!(pending.page, 1);
        assert!(session.register_anchor(handle(id, 300.0)));

        let request = session.after_mount().unwrap();
        assert_eq!(request.sentence, 5);
        assert!(session.after_mount().is_none());
        assert_eq!(scrolls(&session.drain_events()), 1);
    }

    #[test]
    fn activation_without_auto_scroll_never_scrolls() {
        let (mut session, id) = loaded(false);
        session.apply(Command::SetActive { sentence: Some(5) });
        session.register_anchor(handle(id, 300.0));
        assert!(session.after_mount().is_none());
        assert_eq!(scrolls(&session.drain_events()), 0);
    }

    #[test]
    fn replacing_document_discards_pending_scroll() {
        let (mut session, old) = loaded(true);
        session.apply(Command::SetActive { sentence: Some(3) });
        assert!(session.pending_anchor().is_some());

        let next = new_document_id();
        session.replace_document(next, Path::new("other.pdf"), sentences());
        assert_eq!(session.selection().active, None);
        assert!(!session.register_anchor(handle(old, 10.0)));
        assert!(session.after_mount().is_none());

        let events = session.drain_events();
        assert_eq!(scrolls(&events), 0);
        assert!(events
            .iter()
            .all(|e| !matches!(e, SessionEvent::RedrawNeeded(id) if *id == old)));
        assert_eq!(events.last(), Some(&SessionEvent::DocumentReplaced(next)));
    }

    #[test]
    fn replacement_purges_queued_scrolls_for_old_document() {
        let (mut session, old) = loaded(true);
        session.apply(Command::SetActive { sentence: Some(3) });
        session.register_anchor(handle(old, 40.0));
        session.after_mount();

        session.replace_document(new_document_id(), Path::new("other.pdf"), sentences());
        assert_eq!(scrolls(&session.drain_events()), 0);
    }

    #[test]
    fn replacement_discards_jumps_queued_for_old_document() {
        let (mut session, old) = loaded(true);
        let gesture = Gesture {
            kind: GestureKind::DoubleActivate,
            x_pct: 55.0,
            y_pct: 48.0,
        };
        assert!(session.route_gesture(2, gesture).is_consumed());
        session.apply(Command::JumpTo { sentence: 3 });

        // Ids restart per upload, so the new collection reuses 7.
        let next = new_document_id();
        session.replace_document(
            next,
            Path::new("other.pdf"),
            vec![Sentence::new(7, "Different new sentence.", Vec::new())],
        );
        let events = session.drain_events();
        assert!(!events.iter().any(|e| matches!(
            e,
            SessionEvent::JumpRequested { document, .. } if *document == old
        )));
        assert_eq!(events, vec![SessionEvent::DocumentReplaced(next)]);

        session.apply(Command::JumpTo { sentence: 7 });
        assert_eq!(session.drain_events(), vec![jump(next, 7)]);
    }

    #[test]
    fn double_activation_emits_one_jump_and_is_consumed() {
        let (mut session, id) = loaded(true);
        // Sentence 7 sits at x 50..60 %, top 47.5..50 % of page two.
        let gesture = Gesture {
            kind: GestureKind::DoubleActivate,
            x_pct: 55.0,
            y_pct: 48.0,
        };
        let outcome = session.route_gesture(2, gesture);
        assert_eq!(outcome, GestureOutcome::Consumed(JumpTo { sentence: 7 }));
        assert_eq!(
            session.drain_events(),
            vec![jump(id, 7)]
        );

        let press = Gesture {
            kind: GestureKind::Press,
            ..gesture
        };
        assert_eq!(session.route_gesture(2, press), GestureOutcome::Propagate);
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn stale_ids_are_no_ops() {
        let (mut session, id) = loaded(true);
        session.apply(Command::SetActive { sentence: Some(42) });
        session.apply(Command::JumpTo { sentence: 42 });
        assert_eq!(session.selection().active, None);
        assert!(session.drain_events().is_empty());

        session.apply(Command::JumpTo { sentence: 9 });
        assert_eq!(
            session.drain_events(),
            vec![jump(id, 9)]
        );
    }

    #[test]
    fn completions_for_replaced_documents_are_dropped() {
        let mut session = Session::new(true);
        let old = new_document_id();
        session.replace_document(old, Path::new("a.pdf"), sentences());
        let current = new_document_id();
        session.replace_document(current, Path::new("b.pdf"), sentences());
        session.drain_events();

        session.apply(Command::PagesLoaded {
            document: old,
            total: 9,
        });
        assert_eq!(session.document().unwrap().load_state, LoadState::Pending);
        assert!(session.drain_events().is_empty());

        session.apply(Command::LoadFailed {
            document: current,
            reason: "broken xref".into(),
        });
        let doc = session.document().unwrap();
        assert_eq!(doc.load_state, LoadState::Failed("broken xref".into()));
        assert!(session.overlay_for_page(1).is_empty());
    }

    #[test]
    fn stepping_walks_collection_order() {
        let (mut session, id) = loaded(true);
        session.apply(Command::StepSentence { delta: 1 });
        assert_eq!(
            session.drain_events(),
            vec![jump(id, 3)]
        );

        session.apply(Command::SetActive { sentence: Some(5) });
        session.drain_events();
        session.apply(Command::StepSentence { delta: 1 });
        session.apply(Command::StepSentence { delta: -1 });
        assert_eq!(
            session.drain_events(),
            vec![
                jump(id, 7),
                jump(id, 3),
            ]
        );
    }

    #[test]
    fn re_enabling_auto_scroll_is_not_retroactive() {
        let (mut session, id) = loaded(false);
        session.apply(Command::SetActive { sentence: Some(3) });
        session.apply(Command::ToggleAutoScroll);
        assert!(session.selection().auto_scroll);
        session.register_anchor(handle(id, 0.0));
        assert!(session.after_mount().is_none());
    }

    struct ScriptedTransport {
        active: Option<SentenceId>,
        jumps: Vec<SentenceId>,
    }

    impl PlaybackTransport for ScriptedTransport {
        fn jump_to(&mut self, sentence: SentenceId) {
            self.jumps.push(sentence);
            self.active = Some(sentence);
        }

        fn poll_active(&mut self, _now: Instant) -> Option<SentenceId> {
            self.active
        }
    }

    #[test]
    fn playback_drives_active_sentence() {
        let (mut session, _) = loaded(true);
        let mut transport = ScriptedTransport {
            active: None,
            jumps: Vec::new(),
        };
        session.sync_playback(&mut transport, Instant::now());
        assert!(session.drain_events().is_empty());

        transport.jump_to(7);
        session.sync_playback(&mut transport, Instant::now());
        assert_eq!(session.selection().active, Some(7));
        assert_eq!(transport.jumps, vec![7]);
    }
}
