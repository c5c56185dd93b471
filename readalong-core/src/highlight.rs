use std::sync::Arc;

use tracing::{debug, warn};

use crate::index::{RegionIndex, RegionRef};
use crate::region::{normalize, NormalizedBox, SentenceId};
use crate::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayKey {
    pub sentence: SentenceId,
    pub slot: RegionRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub key: OverlayKey,
    pub rect: NormalizedBox,
    pub is_active: bool,
    pub tooltip: Arc<str>,
    pub is_anchor: bool,
}

/// A mounted anchor element, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorHandle {
    pub document: DocumentId,
    pub page: u32,
    pub top: f32,
    pub height: f32,
}

impl AnchorHandle {
    pub fn center(&self) -> f32 {
        self.top + self.height / 2.0
    }
}

/// Overlay boxes for `page` in draw order. Regions that cannot be normalized
/// are skipped without affecting the rest of the page.
pub fn render_overlay(
    index: &RegionIndex,
    page: u32,
    active: Option<SentenceId>,
) -> Vec<OverlayBox> {
    let anchor = active.and_then(|id| index.anchor_of(id));
    let entries = index.regions_on_page(page);
    let mut boxes = Vec::with_capacity(entries.len());

    for entry in entries {
        let rect = match normalize(entry.region) {
            Ok(rect) => rect,
            Err(err) => {
                warn!(sentence = entry.sentence.id, %err, "skipping malformed region");
                continue;
            }
        };
        boxes.push(OverlayBox {
            key: OverlayKey {
                sentence: entry.sentence.id,
                slot: entry.slot,
            },
            rect,
            is_active: Some(entry.sentence.id) == active,
            tooltip: Arc::clone(&entry.sentence.text),
            is_anchor: Some(entry.slot) == anchor,
        });
    }

    boxes
}

#[derive(Debug, Default)]
struct AnchorRegistry {
    entry: Option<(SentenceId, AnchorHandle)>,
}

impl AnchorRegistry {
    fn get(&self, sentence: SentenceId) -> Option<&AnchorHandle> {
        match &self.entry {
            Some((id, handle)) if *id == sentence => Some(handle),
            _ => None,
        }
    }

    fn set(&mut self, sentence: SentenceId, handle: AnchorHandle) {
        self.entry = Some((sentence, handle));
    }

    fn clear(&mut self) {
        self.entry = None;
    }
}

/// The anchor the surface still has to mount for the active sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAnchor {
    pub sentence: SentenceId,
    pub page: u32,
    pub slot: RegionRef,
}

#[derive(Debug)]
pub struct HighlightReconciler {
    document: DocumentId,
    active: Option<SentenceId>,
    registry: AnchorRegistry,
}

impl HighlightReconciler {
    pub fn new(document: DocumentId) -> Self {
        Self {
            document,
            active: None,
            registry: AnchorRegistry::default(),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn active(&self) -> Option<SentenceId> {
        self.active
    }

    /// Drops every registration and switches to a new document.
    pub fn reset(&mut self, document: DocumentId) {
        self.document = document;
        self.active = None;
        self.registry.clear();
    }

    /// Records the new active sentence. Returns whether it changed; a change
    /// invalidates the previous anchor registration.
    pub fn activate(&mut self, active: Option<SentenceId>) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        self.registry.clear();
        true
    }

    pub fn render(&self, index: &RegionIndex, page: u32) -> Vec<OverlayBox> {
        render_overlay(index, page, self.active)
    }

    /// Reports the anchor that still lacks a handle, if any.
    pub fn needs_anchor_registration(&self, index: &RegionIndex) -> Option<PendingAnchor> {
        let sentence = self.active?;
        if self.registry.get(sentence).is_some() {
            return None;
        }
        let slot = index.anchor_of(sentence)?;
        let region = index.region(slot)?;
        Some(PendingAnchor {
            sentence,
            page: region.page,
            slot,
        })
    }

    /// Binds the active sentence's anchor to a mounted element. Handles for
    /// another sentence or another document are refused.
    pub fn register_anchor(&mut self, sentence: SentenceId, handle: AnchorHandle) -> bool {
        if self.active != Some(sentence) {
            debug!(sentence, active = ?self.active, "ignoring anchor for inactive sentence");
            return false;
        }
        if handle.document != self.document {
            debug!(sentence, "ignoring anchor from a replaced document");
            return false;
        }
        self.registry.set(sentence, handle);
        true
    }

    pub fn anchor(&self, sentence: SentenceId) -> Option<&AnchorHandle> {
        self.registry.get(sentence)
    }
}
