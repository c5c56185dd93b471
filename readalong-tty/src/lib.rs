use std::io::{self, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind},
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use readalong_core::{ActivationDetector, Command, GestureKind, RenderImage};
use tracing::{debug, trace};

pub mod compose;
pub mod strip;

pub use compose::{compose_viewport, Fills};
pub use strip::{PagePoint, PageSlot, PageStrip, SmoothScroll};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `image` and places it at the cursor, replacing the previous
    /// frame, which shares the same image and placement ids.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        trace!(
            width = image.width,
            height = image.height,
            bytes = encoded.len(),
            "transmitting frame"
        );
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal shows the buffered frame at
    /// once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    TogglePlayback,
    /// Manual scroll by terminal rows; negative moves up.
    Scroll { rows: i64 },
    Pointer {
        column: u16,
        row: u16,
        kind: GestureKind,
    },
    Resized { columns: u16, rows: u16 },
    NextDocument,
    Quit,
    None,
}

#[derive(Debug)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    activations: ActivationDetector<(u16, u16)>,
}

impl EventMapper {
    pub const SCROLL_STEP: i64 = 3;

    pub fn new(double_activation: Duration) -> Self {
        Self {
            pending_count: None,
            pending_digits: String::new(),
            activations: ActivationDetector::new(double_activation),
        }
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        self.map_event_at(event, Instant::now())
    }

    pub fn map_event_at(&mut self, event: Event, now: Instant) -> UiEvent {
        match event {
            Event::Key(key) if key.kind != KeyEventKind::Release => self.map_key(key),
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => {
                    self.reset_count();
                    let kind = self.activations.press(now, (mouse.column, mouse.row));
                    UiEvent::Pointer {
                        column: mouse.column,
                        row: mouse.row,
                        kind,
                    }
                }
                MouseEventKind::ScrollDown => UiEvent::Scroll {
                    rows: Self::SCROLL_STEP,
                },
                MouseEventKind::ScrollUp => UiEvent::Scroll {
                    rows: -Self::SCROLL_STEP,
                },
                _ => UiEvent::None,
            },
            Event::Resize(columns, rows) => {
                debug!(columns, rows, "terminal resized; pending activation dropped");
                self.activations.reset();
                UiEvent::Resized { columns, rows }
            }
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, key: KeyEvent) -> UiEvent {
        match (key.code, key.modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::ToggleAutoScroll)
            }
            (KeyCode::Char(' '), _) => {
                self.reset_count();
                UiEvent::TogglePlayback
            }
            (KeyCode::Char('n'), KeyModifiers::NONE) | (KeyCode::Right, KeyModifiers::NONE) => {
                let delta = self.take_count() as isize;
                UiEvent::Command(Command::StepSentence { delta })
            }
            (KeyCode::Char('p'), KeyModifiers::NONE) | (KeyCode::Left, KeyModifiers::NONE) => {
                let delta = -(self.take_count() as isize);
                UiEvent::Command(Command::StepSentence { delta })
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                let rows = self.take_count() as i64 * Self::SCROLL_STEP;
                UiEvent::Scroll { rows }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                let rows = self.take_count() as i64 * Self::SCROLL_STEP;
                UiEvent::Scroll { rows: -rows }
            }
            (KeyCode::Tab, _) => {
                self.reset_count();
                UiEvent::NextDocument
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
