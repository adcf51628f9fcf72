//! Per-connection session engine.
//!
//! A `Session` owns one user's terminal state: screen geometry, cursor,
//! and the editable input buffer. It is driven exclusively by its own
//! connection task — keystrokes and resizes come in, rendering bytes come
//! out — and talks to the rest of the service only through the shared
//! [`ChatRoom`]. Nothing here ever touches another session's state.
//!
//! Cursor math is display-cell based: each buffered token (one logical
//! character) occupies the number of columns the font catalog estimates
//! for it, so backspace and arrow keys behave correctly around CJK and
//! other two-column glyphs.

use std::sync::Arc;

use bytes::BytesMut;

use crate::chat::ChatRoom;
use crate::font::FontCatalog;
use crate::input::{self, Key};
use crate::layout;
use crate::render::{self, ScreenView};

/// The literal input line that ends a session.
pub const QUIT_COMMAND: &str = "/quit";

/// First input column, 1-based: right after the `│ > ` prefix.
pub const MIN_INPUT_X: u16 = 5;

/// Geometry floor; anything smaller cannot hold the frame.
pub const MIN_ROWS: u16 = 6;
pub const MIN_COLS: u16 = 8;

/// Terminal dimensions, updated on resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub rows: u16,
    pub cols: u16,
}

impl Geometry {
    /// Clamp reported dimensions to the smallest drawable frame.
    pub fn clamped(rows: u16, cols: u16) -> Self {
        Self {
            rows: rows.max(MIN_ROWS),
            cols: cols.max(MIN_COLS),
        }
    }

    /// Row of the input line, 1-based (just above the bottom border).
    fn input_row(&self) -> u16 {
        self.rows - 1
    }

    /// Visible message lines: everything except top border, divider,
    /// input line, and bottom border.
    fn message_rows(&self) -> usize {
        usize::from(self.rows) - 4
    }
}

/// What the connection task should do after a batch of keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// The user submitted the quit command; close the connection. The
    /// leave notice is the close path's job, so it is emitted exactly
    /// once no matter how the session ends.
    Quit,
}

pub struct Session {
    username: String,
    geometry: Geometry,
    /// Tracked cursor, 1-based terminal coordinates.
    cursor_x: u16,
    cursor_y: u16,
    /// Pending input line, one token per logical character.
    buffer: Vec<char>,
    room: ChatRoom,
    fonts: Arc<FontCatalog>,
    /// Service identity for the status segment.
    identity: String,
}

impl Session {
    pub fn new(
        username: String,
        geometry: Geometry,
        room: ChatRoom,
        fonts: Arc<FontCatalog>,
        identity: String,
    ) -> Self {
        let mut session = Self {
            username,
            geometry,
            cursor_x: MIN_INPUT_X,
            cursor_y: 0,
            buffer: Vec::new(),
            room,
            fonts,
            identity,
        };
        session.cursor_y = session.geometry.input_row();
        session
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_x, self.cursor_y)
    }

    pub fn buffer_line(&self) -> String {
        self.buffer.iter().collect()
    }

    /// Handle one inbound keystroke chunk, then repaint into `out`.
    ///
    /// Unrecognized or malformed byte sequences fall through to the
    /// repaint without touching the buffer or cursor.
    pub fn handle_input(&mut self, data: &[u8], out: &mut BytesMut) -> Action {
        let action = match input::decode(data) {
            Some(Key::Backspace) => {
                self.backspace();
                Action::Continue
            }
            Some(Key::Enter) => self.submit(),
            Some(Key::ArrowLeft) => {
                self.cursor_x = self.cursor_x.saturating_sub(1).max(MIN_INPUT_X);
                Action::Continue
            }
            Some(Key::ArrowRight) => {
                self.cursor_x = (self.cursor_x + 1).min(self.input_end_x());
                Action::Continue
            }
            Some(Key::Text(text)) => {
                self.insert_text(&text);
                Action::Continue
            }
            None => Action::Continue,
        };
        if action == Action::Quit {
            return action;
        }
        self.redraw(out);
        action
    }

    /// Apply a geometry change: reposition the cursor onto the (possibly
    /// moved) input line, clamp it into the valid input span, repaint.
    pub fn handle_resize(&mut self, rows: u16, cols: u16, out: &mut BytesMut) {
        self.geometry = Geometry::clamped(rows, cols);
        self.cursor_y = self.geometry.input_row();
        self.cursor_x = self.cursor_x.clamp(MIN_INPUT_X, self.input_end_x());
        tracing::debug!(
            session = %self.username,
            rows = self.geometry.rows,
            cols = self.geometry.cols,
            "window change"
        );
        self.redraw(out);
    }

    /// Repaint this session's whole screen from the shared log.
    pub fn redraw(&self, out: &mut BytesMut) {
        let messages = self.room.recent(self.geometry.message_rows());
        let input = self.buffer_line();
        let status = format!(
            "{} · {} · {}x{} · {} online",
            self.identity,
            self.username,
            self.geometry.cols,
            self.geometry.rows,
            self.room.online(),
        );
        let view = ScreenView {
            rows: self.geometry.rows,
            cols: self.geometry.cols,
            messages: &messages,
            input: &input,
            status: &status,
            cursor: (self.cursor_x, self.cursor_y),
        };
        render::paint(&view, &self.fonts, out);
    }

    /// One past the last input column: left margin plus the buffer's
    /// total display width.
    fn input_end_x(&self) -> u16 {
        let width: usize = self
            .buffer
            .iter()
            .map(|&ch| layout::char_width(ch, &self.fonts))
            .sum();
        MIN_INPUT_X + width as u16
    }

    /// Remove the token whose display span covers the column immediately
    /// left of the cursor, and step the cursor back by its width.
    fn backspace(&mut self) {
        let offset = usize::from(self.cursor_x - MIN_INPUT_X);
        if offset == 0 {
            return;
        }
        let target = offset - 1;
        let mut span_start = 0;
        for i in 0..self.buffer.len() {
            let width = layout::char_width(self.buffer[i], &self.fonts);
            if target >= span_start && target < span_start + width {
                self.buffer.remove(i);
                self.cursor_x -= width as u16;
                return;
            }
            span_start += width;
        }
        // Cursor sits past the buffer's span (zero-width tail); nothing
        // to remove.
    }

    /// Submit the pending line: quit command, or a message to the room.
    fn submit(&mut self) -> Action {
        if self.buffer.is_empty() {
            return Action::Continue;
        }
        let line = self.buffer_line();
        if line == QUIT_COMMAND {
            return Action::Quit;
        }
        self.buffer.clear();
        self.cursor_x = MIN_INPUT_X;
        self.room.post(&self.username, line);
        Action::Continue
    }

    /// Normalize and append literal text at the end of the buffer,
    /// advancing the cursor by its total display width.
    fn insert_text(&mut self, text: &str) {
        let normalized = input::normalize(text);
        if normalized.is_empty() {
            return;
        }
        let mut advance = 0usize;
        for ch in normalized.chars() {
            advance += layout::char_width(ch, &self.fonts);
            self.buffer.push(ch);
        }
        self.cursor_x += advance as u16;
    }
}
