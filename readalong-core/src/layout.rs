use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct BusInner {
    next_id: u64,
    observers: HashMap<u64, Option<f32>>,
}

#[derive(Debug, Clone, Default)]
pub struct ResizeBus {
    inner: Arc<Mutex<BusInner>>,
}

impl ResizeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ResizeObserver {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.insert(id, None);
        ResizeObserver {
            id,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Delivers a new content width to every live observer. Only the latest
    /// width per observer is kept.
    pub fn dispatch(&self, width: f32) {
        let mut inner = self.inner.lock();
        for slot in inner.observers.values_mut() {
            *slot = Some(width);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

/// Subscription handle; unsubscribes on drop.
#[derive(Debug)]
pub struct ResizeObserver {
    id: u64,
    bus: Arc<Mutex<BusInner>>,
}

impl ResizeObserver {
    pub fn take(&self) -> Option<f32> {
        self.bus
            .lock()
            .observers
            .get_mut(&self.id)
            .and_then(Option::take)
    }
}

impl Drop for ResizeObserver {
    fn drop(&mut self) {
        self.bus.lock().observers.remove(&self.id);
    }
}

pub fn render_width_for(container_width: f32, fixed_padding: f32) -> u32 {
    let width = container_width - fixed_padding;
    if width.is_finite() && width > 0.0 {
        width.floor() as u32
    } else {
        0
    }
}

#[derive(Debug)]
pub struct LayoutAdapter {
    fixed_padding: f32,
    observer: Option<ResizeObserver>,
    render_width: Option<u32>,
}

impl LayoutAdapter {
    pub fn new(fixed_padding: f32) -> Self {
        Self {
            fixed_padding,
            observer: None,
            render_width: None,
        }
    }

    /// Subscribes to the surface and takes the initial measurement.
    pub fn attach(&mut self, bus: &ResizeBus, initial_width: f32) -> u32 {
        self.observer = Some(bus.subscribe());
        let width = render_width_for(initial_width, self.fixed_padding);
        self.render_width = Some(width);
        debug!(initial_width, width, "layout adapter attached");
        width
    }

    pub fn detach(&mut self) {
        self.observer = None;
        self.render_width = None;
    }

    pub fn is_attached(&self) -> bool {
        self.observer.is_some()
    }

    /// Consumes any observed resize. Returns the new render width only when
    /// it differs from the current one.
    pub fn poll(&mut self) -> Option<u32> {
        let container_width = self.observer.as_ref()?.take()?;
        let width = render_width_for(container_width, self.fixed_padding);
        if self.render_width == Some(width) {
            return None;
        }
        debug!(container_width, width, "render width changed");
        self.render_width = Some(width);
        Some(width)
    }

    pub fn render_width(&self) -> Option<u32> {
        self.render_width
    }
}
