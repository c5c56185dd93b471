use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use uuid::Uuid;

pub mod config;
pub mod highlight;
pub mod index;
pub mod interaction;
pub mod layout;
pub mod manifest;
pub mod region;
pub mod scroll;
pub mod session;

pub use config::{Config, ConfigError, Fill};
pub use highlight::{
    render_overlay, AnchorHandle, HighlightReconciler, OverlayBox, OverlayKey, PendingAnchor,
};
pub use index::{PageEntry, RegionIndex, RegionRef};
pub use interaction::{
    hit_test, on_region_activate, route_gesture, ActivationDetector, Gesture, GestureKind,
    GestureOutcome, JumpTo,
};
pub use layout::{render_width_for, LayoutAdapter, ResizeBus, ResizeObserver};
pub use manifest::{Manifest, ManifestError, ManifestOptions};
pub use region::{normalize, NormalizedBox, PixelBox, Region, RegionError, Sentence, SentenceId};
pub use scroll::{ScrollBehavior, ScrollController, ScrollRequest};
pub use session::{
    ActiveSelection, Command, LoadState, LoadedDocument, PlaybackTransport, Session, SessionEvent,
};

/// Identifies one loaded document instance. Loading the same file twice
/// yields two ids.
pub type DocumentId = Uuid;

pub fn new_document_id() -> DocumentId {
    Uuid::new_v4()
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Native page size in document units (points for PDF).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    /// Rendered height for a page drawn `width` pixels wide.
    pub fn height_at(&self, width: u32) -> u32 {
        if self.width <= 0.0 || !self.width.is_finite() || !self.height.is_finite() {
            return 0;
        }
        (width as f32 * self.height / self.width).round().max(0.0) as u32
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_sizes: Vec<PageSize>,
    pub metadata: DocumentMetadata,
}

impl DocumentInfo {
    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    pub fn page_size(&self, page_number: u32) -> Option<PageSize> {
        let idx = (page_number as usize).checked_sub(1)?;
        self.page_sizes.get(idx).copied()
    }
}

/// Asks the rendering subsystem for one page, 1-based, at a pixel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub page_number: u32,
    pub target_width: u32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait PageSource: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageSource>>;
}

/// Rendered pages of the current document, cached per render width.
pub struct DocumentPages {
    pub document: DocumentId,
    source: Arc<dyn PageSource>,
    capacity: usize,
    render_cache: Mutex<HashMap<CacheKey, Arc<RenderImage>>>,
}

impl DocumentPages {
    pub fn new(document: DocumentId, source: Arc<dyn PageSource>, capacity: usize) -> Self {
        Self {
            document,
            source,
            capacity: capacity.max(1),
            render_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn info(&self) -> &DocumentInfo {
        self.source.info()
    }

    pub fn page_count(&self) -> usize {
        self.source.info().page_count()
    }

    /// Renders `page_number` at `width`, evicting the cached pages farthest
    /// from `reference_page` when over capacity.
    pub fn render(
        &self,
        page_number: u32,
        width: u32,
        reference_page: u32,
    ) -> Result<Arc<RenderImage>> {
        if page_number == 0 || page_number as usize > self.page_count() {
            return Err(anyhow!("page {} out of range", page_number));
        }

        let key = CacheKey {
            page_number,
            width,
        };
        if let Some(image) = self.render_cache.lock().get(&key).cloned() {
            return Ok(image);
        }

        let image = Arc::new(self.source.render_page(RenderRequest {
            page_number,
            target_width: width,
        })?);
        self.store_cached_render(key, &image, reference_page);
        Ok(image)
    }

    pub fn clear_cache(&self) {
        self.render_cache.lock().clear();
    }

    fn store_cached_render(&self, key: CacheKey, image: &Arc<RenderImage>, reference_page: u32) {
        let mut cache = self.render_cache.lock();
        cache.insert(key, Arc::clone(image));

        if cache.len() > self.capacity {
            let mut keys: Vec<_> = cache.keys().cloned().collect();
            keys.sort_by_key(|k| (k.width != key.width, k.distance(reference_page)));
            for stale in keys.into_iter().skip(self.capacity) {
                cache.remove(&stale);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page_number: u32,
    width: u32,
}

impl CacheKey {
    fn distance(&self, reference_page: u32) -> u32 {
        self.page_number.abs_diff(reference_page)
    }
}
