use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::cursor;
use crossterm::terminal::{self, Clear, ClearType};
use readalong_core::{
    Config, DocumentPages, Gesture, GestureKind, LayoutAdapter, LoadState, ResizeBus,
    ScrollRequest, Session,
};
use readalong_tty::{
    compose_viewport, write_status_line, DrawParams, Fills, KittyRenderer, PagePoint, PageStrip,
    SmoothScroll,
};
use tracing::debug;

const FALLBACK_CELL_WIDTH: f32 = 8.0;
const FALLBACK_CELL_HEIGHT: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl CellMetrics {
    pub fn query() -> Result<Self> {
        let window = terminal::window_size()?;
        Ok(Self::from_window(
            window.columns,
            window.rows,
            window.width,
            window.height,
        ))
    }

    /// Terminals that do not report pixel sizes get a typical cell size.
    pub fn from_window(columns: u16, rows: u16, width: u16, height: u16) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let (cell_width, cell_height) = if width == 0 || height == 0 {
            (FALLBACK_CELL_WIDTH, FALLBACK_CELL_HEIGHT)
        } else {
            (
                f32::from(width) / f32::from(columns),
                f32::from(height) / f32::from(rows),
            )
        };
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    pub fn surface_width(&self) -> f32 {
        f32::from(self.columns) * self.cell_width
    }

    /// Rows available to the page image; the last row holds the status line.
    pub fn image_rows(&self) -> u16 {
        self.rows.saturating_sub(1).max(1)
    }

    pub fn viewport_height(&self) -> u32 {
        (f32::from(self.image_rows()) * self.cell_height).round() as u32
    }
}

/// Where the last frame was placed, for mapping pointer cells back onto the
/// strip.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frame {
    start_col: u16,
    columns: u16,
    offset: u32,
}

pub struct Viewer {
    pub cells: CellMetrics,
    pub bus: ResizeBus,
    pub status: Option<String>,
    layout: LayoutAdapter,
    strip: PageStrip,
    scroll: SmoothScroll,
    pages: Option<DocumentPages>,
    fills: Fills,
    page_gap: u32,
    scroll_duration: Duration,
    frame: Option<Frame>,
}

impl Viewer {
    pub fn new(config: &Config, cells: CellMetrics) -> Self {
        let scroll_duration = if config.smooth_scroll {
            config.smooth_scroll_duration
        } else {
            Duration::ZERO
        };
        Self {
            cells,
            bus: ResizeBus::new(),
            status: None,
            layout: LayoutAdapter::new(config.fixed_padding_px),
            strip: PageStrip::default(),
            scroll: SmoothScroll::new(scroll_duration),
            pages: None,
            fills: Fills {
                active: config.active_fill,
                inactive: config.inactive_fill,
            },
            page_gap: config.page_gap_px,
            scroll_duration,
            frame: None,
        }
    }

    /// Drops everything tied to the previous document. Completion of the new
    /// load attaches the layout again.
    pub fn detach(&mut self) {
        self.layout.detach();
        self.pages = None;
        self.strip = PageStrip::default();
        self.scroll = SmoothScroll::new(self.scroll_duration);
        self.frame = None;
    }

    pub fn attach(&mut self, pages: DocumentPages) {
        let width = self.layout.attach(&self.bus, self.cells.surface_width());
        self.pages = Some(pages);
        self.relayout(width);
    }

    pub fn document(&self) -> Option<&DocumentPages> {
        self.pages.as_ref()
    }

    pub fn resized(&mut self, cells: CellMetrics) {
        self.cells = cells;
        self.scroll.clamp(self.strip.max_offset(cells.viewport_height()));
        self.bus.dispatch(cells.surface_width());
    }

    /// Applies a width change observed by the layout adapter. Returns whether
    /// anything moved.
    pub fn poll_layout(&mut self) -> bool {
        match self.layout.poll() {
            Some(width) => {
                self.relayout(width);
                true
            }
            None => false,
        }
    }

    fn relayout(&mut self, width: u32) {
        let Some(pages) = self.pages.as_ref() else {
            return;
        };
        if self.strip.width() != 0 && self.strip.width() != width {
            pages.clear_cache();
        }
        self.strip = PageStrip::layout(&pages.info().page_sizes, width, self.page_gap);
        self.scroll.clamp(self.strip.max_offset(self.cells.viewport_height()));
        debug!(width, height = self.strip.total_height(), "page strip laid out");
    }

    /// Mounts the active sentence's anchor, if one is still unregistered,
    /// and hands its position back to the session.
    pub fn mount_anchor(&self, session: &mut Session) {
        let Some(pending) = session.pending_anchor() else {
            return;
        };
        let Some(pages) = self.pages.as_ref() else {
            return;
        };
        let handle = session
            .overlay_for_page(pending.page)
            .into_iter()
            .find(|overlay| overlay.is_anchor)
            .and_then(|anchor| self.strip.mount(pages.document, pending.page, &anchor.rect));
        if let Some(handle) = handle {
            session.register_anchor(handle);
        }
    }

    pub fn scroll_into_view(&mut self, request: &ScrollRequest, now: Instant) {
        if self.pages.as_ref().map(|p| p.document) != Some(request.document) {
            return;
        }
        let viewport = self.cells.viewport_height();
        let target = self.strip.centered_offset(&request.anchor, viewport);
        self.scroll.scroll_to(target, request.behavior, now);
    }

    pub fn scroll_rows(&mut self, rows: i64) {
        let delta = (rows as f32 * self.cells.cell_height).round() as i64;
        let max = self.strip.max_offset(self.cells.viewport_height());
        self.scroll.scroll_by(delta, max);
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        self.scroll.tick(now)
    }

    pub fn is_animating(&self) -> bool {
        self.scroll.is_animating()
    }

    pub fn locate(&self, column: u16, row: u16) -> Option<PagePoint> {
        let frame = self.frame?;
        if row >= self.cells.image_rows() || column < frame.start_col {
            return None;
        }
        let col = column - frame.start_col;
        if col >= frame.columns {
            return None;
        }
        let scale_x = self.strip.width() as f32 / (f32::from(frame.columns) * self.cells.cell_width);
        let x = ((f32::from(col) + 0.5) * self.cells.cell_width * scale_x) as u32;
        let y = frame.offset + ((f32::from(row) + 0.5) * self.cells.cell_height) as u32;
        self.strip.point_at(x, y)
    }

    /// Routes a pointer gesture to the session; anything the overlay does not
    /// take becomes page-level feedback.
    pub fn pointer(&mut self, session: &mut Session, column: u16, row: u16, kind: GestureKind) {
        let Some(point) = self.locate(column, row) else {
            return;
        };
        let gesture = Gesture {
            kind,
            x_pct: point.x_pct,
            y_pct: point.y_pct,
        };
        if !session.route_gesture(point.page, gesture).is_consumed() {
            self.status = Some(format!("page {}", point.page));
        }
    }

    pub fn redraw(
        &mut self,
        renderer: &mut KittyRenderer<io::Stdout>,
        session: &Session,
        status: &str,
    ) -> Result<()> {
        renderer.begin_sync_update()?;
        let ready = match (self.pages.as_ref(), session.document()) {
            (Some(pages), Some(doc)) => doc.is_ready() && doc.id == pages.document,
            _ => false,
        };
        let drawn = ready && self.draw_pages(renderer, session)?;
        if !drawn {
            self.frame = None;
            renderer.clear_all()?;
        }
        draw_status_line(renderer, self.cells, status)?;
        renderer.end_sync_update()
    }

    fn draw_pages(
        &mut self,
        renderer: &mut KittyRenderer<io::Stdout>,
        session: &Session,
    ) -> Result<bool> {
        let Some(pages) = self.pages.as_ref() else {
            return Ok(false);
        };
        if self.strip.width() == 0 || self.strip.total_height() == 0 {
            return Ok(false);
        }

        let offset = self.scroll.offset();
        let viewport = self.cells.viewport_height();
        let width = self.strip.width();
        let reference = self
            .strip
            .page_at(offset + viewport / 2)
            .map(|(page, _)| page)
            .unwrap_or(1);

        let image = compose_viewport(
            &self.strip,
            offset,
            viewport,
            self.fills,
            |page| pages.render(page, width, reference),
            |page| session.overlay_for_page(page),
        )?;

        let columns = ((width as f32 / self.cells.cell_width).round() as u16)
            .clamp(1, self.cells.columns);
        let start_col = (self.cells.columns - columns) / 2;
        {
            let mut writer = renderer.writer();
            crossterm::execute!(
                &mut writer,
                Clear(ClearType::All),
                cursor::MoveTo(start_col, 0)
            )?;
        }
        renderer.draw(
            &image,
            DrawParams::clamped(u32::from(columns), u32::from(self.cells.image_rows())),
        )?;

        self.frame = Some(Frame {
            start_col,
            columns,
            offset,
        });
        Ok(true)
    }
}

pub fn document_status(session: &Session, viewer: &Viewer, playing: bool) -> String {
    let Some(doc) = session.document() else {
        return "no document".to_string();
    };
    let name = doc
        .path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<unknown>");

    let mut status = match &doc.load_state {
        LoadState::Pending => format!("{name} | loading"),
        LoadState::Failed(reason) => format!("{name} | failed to load: {reason}"),
        LoadState::Ready => {
            let selection = session.selection();
            let sentence = selection
                .active
                .and_then(|id| doc.index.position(id).map(|pos| (id, pos)))
                .map(|(id, pos)| format!("sentence {id} ({}/{})", pos + 1, doc.index.sentence_count()))
                .unwrap_or_else(|| "no sentence".to_string());
            format!(
                "{name} | {} pages | {sentence} | auto-scroll {} | {}",
                doc.page_count.unwrap_or_default(),
                if selection.auto_scroll { "on" } else { "off" },
                if playing { "playing" } else { "paused" }
            )
        }
    };
    if let Some(extra) = viewer.status.as_deref() {
        status.push_str(" | ");
        status.push_str(extra);
    }
    status
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    cells: CellMetrics,
    status: &str,
) -> Result<()> {
    let status_row = cells.rows.saturating_sub(1);
    let max_chars = usize::from(cells.columns);
    let line: String = status.chars().take(max_chars).collect();
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, status_row),
        Clear(ClearType::CurrentLine)
    )?;
    write_status_line(&mut writer, &line)?;
    Ok(())
}
