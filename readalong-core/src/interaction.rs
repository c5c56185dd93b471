use std::time::{Duration, Instant};

use tracing::debug;

use crate::highlight::OverlayBox;
use crate::region::SentenceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Press,
    DoubleActivate,
}

/// A pointer gesture located on a page, in page percentages from the
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gesture {
    pub kind: GestureKind,
    pub x_pct: f32,
    pub y_pct: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTo {
    pub sentence: SentenceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// A region took the gesture; page-level handlers must not see it.
    Consumed(JumpTo),
    Propagate,
}

impl GestureOutcome {
    pub fn is_consumed(&self) -> bool {
        matches!(self, GestureOutcome::Consumed(_))
    }
}

pub fn on_region_activate(sentence: SentenceId) -> GestureOutcome {
    debug!(sentence, "region activated");
    GestureOutcome::Consumed(JumpTo { sentence })
}

/// Topmost box under the point. Boxes are drawn in slice order, so the last
/// match wins overlaps.
pub fn hit_test(boxes: &[OverlayBox], x_pct: f32, y_pct: f32) -> Option<&OverlayBox> {
    boxes
        .iter()
        .rev()
        .find(|b| !b.rect.is_empty() && b.rect.contains(x_pct, y_pct))
}

/// Only a double-activation on a region box is taken; presses and gestures
/// over the gaps between regions fall through to the page.
pub fn route_gesture(gesture: Gesture, boxes: &[OverlayBox]) -> GestureOutcome {
    if gesture.kind != GestureKind::DoubleActivate {
        return GestureOutcome::Propagate;
    }
    match hit_test(boxes, gesture.x_pct, gesture.y_pct) {
        Some(target) => on_region_activate(target.key.sentence),
        None => GestureOutcome::Propagate,
    }
}

/// Turns raw presses into presses or double-activations: two presses at the
/// same position within `interval`. The pair is consumed, so a third press
/// starts over.
#[derive(Debug, Clone)]
pub struct ActivationDetector<P> {
    interval: Duration,
    last: Option<(Instant, P)>,
}

impl<P: Copy + PartialEq> ActivationDetector<P> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn press(&mut self, at: Instant, position: P) -> GestureKind {
        match self.last.take() {
            Some((previous, last_position))
                if last_position == position
                    && at.saturating_duration_since(previous) <= self.interval =>
            {
                GestureKind::DoubleActivate
            }
            _ => {
                self.last = Some((at, position));
                GestureKind::Press
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
