use std::time::{Duration, Instant};

use readalong_core::{AnchorHandle, DocumentId, NormalizedBox, PageSize, ScrollBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub page: u32,
    pub top: u32,
    pub height: u32,
}

impl PageSlot {
    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePoint {
    pub page: u32,
    pub x_pct: f32,
    pub y_pct: f32,
}

/// Pages stacked at the render width. Positions are surface pixels, y growing
/// down from the top of the first page.
#[derive(Debug, Clone, Default)]
pub struct PageStrip {
    width: u32,
    gap: u32,
    slots: Vec<PageSlot>,
    total_height: u32,
}

impl PageStrip {
    pub fn layout(page_sizes: &[PageSize], width: u32, gap: u32) -> Self {
        let mut slots = Vec::with_capacity(page_sizes.len());
        let mut top = 0u32;
        for (idx, size) in page_sizes.iter().enumerate() {
            if idx > 0 {
                top = top.saturating_add(gap);
            }
            let height = size.height_at(width);
            slots.push(PageSlot {
                page: idx as u32 + 1,
                top,
                height,
            });
            top = top.saturating_add(height);
        }
        Self {
            width,
            gap,
            slots,
            total_height: top,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn gap(&self) -> u32 {
        self.gap
    }

    pub fn total_height(&self) -> u32 {
        self.total_height
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    pub fn slot(&self, page: u32) -> Option<&PageSlot> {
        let idx = (page as usize).checked_sub(1)?;
        self.slots.get(idx)
    }

    /// Page under surface row `y`, with the row relative to the page top.
    /// Gaps between pages belong to no page.
    pub fn page_at(&self, y: u32) -> Option<(u32, u32)> {
        let idx = self.slots.partition_point(|slot| slot.bottom() <= y);
        let slot = self.slots.get(idx)?;
        (y >= slot.top).then(|| (slot.page, y - slot.top))
    }

    pub fn point_at(&self, x: u32, y: u32) -> Option<PagePoint> {
        if x >= self.width {
            return None;
        }
        let (page, local_y) = self.page_at(y)?;
        let slot = self.slot(page)?;
        if slot.height == 0 {
            return None;
        }
        Some(PagePoint {
            page,
            x_pct: 100.0 * (x as f32 + 0.5) / self.width as f32,
            y_pct: 100.0 * (local_y as f32 + 0.5) / slot.height as f32,
        })
    }

    pub fn visible(&self, offset: u32, height: u32) -> impl Iterator<Item = &PageSlot> + '_ {
        let end = offset.saturating_add(height);
        self.slots
            .iter()
            .filter(move |slot| slot.bottom() > offset && slot.top < end)
    }

    pub fn mount(
        &self,
        document: DocumentId,
        page: u32,
        rect: &NormalizedBox,
    ) -> Option<AnchorHandle> {
        let slot = self.slot(page)?;
        let pixels = rect.to_pixels(self.width as f32, slot.height as f32);
        Some(AnchorHandle {
            document,
            page,
            top: slot.top as f32 + pixels.y,
            height: pixels.height,
        })
    }

    pub fn max_offset(&self, viewport_height: u32) -> u32 {
        self.total_height.saturating_sub(viewport_height)
    }

    /// Offset that puts the anchor's vertical center in the middle of the
    /// viewport, clamped to the strip.
    pub fn centered_offset(&self, anchor: &AnchorHandle, viewport_height: u32) -> u32 {
        let target = anchor.center() - viewport_height as f32 / 2.0;
        if !target.is_finite() || target <= 0.0 {
            return 0;
        }
        (target.round() as u32).min(self.max_offset(viewport_height))
    }
}

#[derive(Debug, Clone)]
pub struct SmoothScroll {
    duration: Duration,
    from: f32,
    current: f32,
    target: f32,
    started: Option<Instant>,
}

impl SmoothScroll {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            from: 0.0,
            current: 0.0,
            target: 0.0,
            started: None,
        }
    }

    pub fn offset(&self) -> u32 {
        self.current.round().max(0.0) as u32
    }

    pub fn target(&self) -> u32 {
        self.target.round().max(0.0) as u32
    }

    pub fn is_animating(&self) -> bool {
        self.started.is_some()
    }

    pub fn scroll_to(&mut self, target: u32, behavior: ScrollBehavior, now: Instant) {
        let target = target as f32;
        if behavior == ScrollBehavior::Instant || self.duration.is_zero() {
            self.jump(target);
            return;
        }
        self.from = self.current;
        self.target = target;
        self.started = Some(now);
    }

    /// Manual scrolling; cancels any animation.
    pub fn scroll_by(&mut self, delta: i64, max_offset: u32) {
        let next = (self.current as i64 + delta).clamp(0, max_offset as i64);
        self.jump(next as f32);
    }

    pub fn clamp(&mut self, max_offset: u32) {
        let max = max_offset as f32;
        if self.target > max {
            self.target = max;
        }
        if self.current > max {
            self.current = max;
            self.from = self.from.min(max);
        }
    }

    /// Advances the animation. Returns whether the offset moved.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(started) = self.started else {
            return false;
        };
        let before = self.offset();
        let t = now.saturating_duration_since(started).as_secs_f32()
            / self.duration.as_secs_f32();
        if t >= 1.0 {
            self.jump(self.target);
        } else {
            let eased = 1.0 - (1.0 - t).powi(3);
            self.current = self.from + (self.target - self.from) * eased;
        }
        self.offset() != before
    }

    fn jump(&mut self, target: f32) {
        self.from = target;
        self.current = target;
        self.target = target;
        self.started = None;
    }
}
