use tracing::debug;

use crate::highlight::{AnchorHandle, HighlightReconciler};
use crate::region::SentenceId;
use crate::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollRequest {
    pub document: DocumentId,
    pub sentence: SentenceId,
    pub anchor: AnchorHandle,
    pub behavior: ScrollBehavior,
}

/// Issues at most one centered scroll-into-view per active sentence change
/// while auto-scroll is on. Renders caused by anything else never trigger it.
#[derive(Debug)]
pub struct ScrollController {
    last_active: Option<SentenceId>,
    auto_scroll: bool,
    pending: Option<SentenceId>,
    behavior: ScrollBehavior,
}

impl ScrollController {
    pub fn new(auto_scroll: bool) -> Self {
        Self {
            last_active: None,
            auto_scroll,
            pending: None,
            behavior: ScrollBehavior::Smooth,
        }
    }

    pub fn with_behavior(mut self, behavior: ScrollBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub fn pending(&self) -> Option<SentenceId> {
        self.pending
    }

    /// Feeds the current selection state. Only a change of the active id
    /// arms a scroll; re-enabling auto-scroll does not.
    pub fn observe(&mut self, active: Option<SentenceId>, auto_scroll: bool) {
        if auto_scroll != self.auto_scroll {
            self.auto_scroll = auto_scroll;
            if !auto_scroll && self.pending.take().is_some() {
                debug!("auto-scroll disabled; dropping pending scroll");
            }
        }

        if active != self.last_active {
            self.last_active = active;
            self.pending = if self.auto_scroll { active } else { None };
        }
    }

    /// Consumes the armed scroll once the anchor had its chance to mount.
    /// A missing anchor silently drops the request.
    pub fn resolve(&mut self, reconciler: &HighlightReconciler) -> Option<ScrollRequest> {
        let sentence = self.pending.take()?;
        let Some(anchor) = reconciler.anchor(sentence) else {
            debug!(sentence, "no anchor mounted for scroll target");
            return None;
        };
        if anchor.document != reconciler.document() {
            return None;
        }
        Some(ScrollRequest {
            document: reconciler.document(),
            sentence,
            anchor: *anchor,
            behavior: self.behavior,
        })
    }

    /// Forgets everything tied to the previous document.
    pub fn reset(&mut self) {
        self.last_active = None;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn mounted(sentence: SentenceId) -> HighlightReconciler {
        let doc = Uuid::new_v4();
        let mut reconciler = HighlightReconciler::new(doc);
        reconciler.activate(Some(sentence));
        reconciler.register_anchor(
            sentence,
            AnchorHandle {
                document: doc,
                page: 1,
                top: 120.0,
                height: 12.0,
            },
        );
        reconciler
    }

    #[test]
    fn fires_once_for_new_active_sentence() {
        let reconciler = mounted(5);
        let mut controller = ScrollController::new(true);
        controller.observe(Some(5), true);

        let request = controller.resolve(&reconciler).unwrap();
        assert_eq!(request.sentence, 5);
        assert_eq!(request.behavior, ScrollBehavior::Smooth);
        assert!(controller.resolve(&reconciler).is_none());

        controller.observe(Some(5), true);
        assert!(controller.resolve(&reconciler).is_none());
    }

    #[test]
    fn stays_quiet_when_auto_scroll_is_off() {
        let reconciler = mounted(5);
        let mut controller = ScrollController::new(false);
        controller.observe(Some(5), false);
        assert!(controller.resolve(&reconciler).is_none());
    }

    #[test]
    fn re_enabling_does_not_scroll_retroactively() {
        let mut controller = ScrollController::new(false);
        controller.observe(Some(5), false);
        controller.observe(Some(5), true);
        assert!(controller.resolve(&mounted(5)).is_none());

        controller.observe(Some(6), true);
        assert_eq!(controller.resolve(&mounted(6)).map(|r| r.sentence), Some(6));
    }

    #[test]
    fn disabling_drops_pending_request() {
        let mut controller = ScrollController::new(true);
        controller.observe(Some(2), true);
        assert_eq!(controller.pending(), Some(2));
        controller.observe(Some(2), false);
        assert_eq!(controller.pending(), None);
        assert!(controller.resolve(&mounted(2)).is_none());
    }

    #[test]
    fn missing_anchor_is_a_silent_no_op() {
        let reconciler = HighlightReconciler::new(Uuid::new_v4());
        let mut controller = ScrollController::new(true);
        controller.observe(Some(9), true);
        assert!(controller.resolve(&reconciler).is_none());
        assert_eq!(controller.pending(), None);
    }

    #[test]
    fn clearing_active_sentence_cancels_scroll() {
        let mut controller = ScrollController::new(true);
        controller.observe(Some(3), true);
        controller.observe(None, true);
        assert!(controller.resolve(&mounted(3)).is_none());
    }

    #[test]
    fn reset_forgets_previous_document() {
        let mut controller = ScrollController::new(true);
        controller.observe(Some(3), true);
        controller.reset();
        assert_eq!(controller.pending(), None);

        controller.observe(Some(3), true);
        assert_eq!(controller.pending(), Some(3));
    }
}
