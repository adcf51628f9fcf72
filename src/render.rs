//! Full-screen ANSI rendering of a session's view.
//!
//! Every repaint is a complete frame: clear, home, box, message area,
//! divider, input line, bottom border with the status segment, then a
//! cursor reposition to the session's tracked coordinates. Lines are
//! emitted top to bottom separated by CRLF; each line is exactly
//! `cols` columns wide, with message and input content column-budgeted
//! through [`crate::layout`] so wide glyphs never break the frame.
//!
//! Box-drawing characters are always treated as one column — they are
//! chrome, not chat content, and never go through the font average.

use bytes::BytesMut;

use crate::font::FontCatalog;
use crate::layout::{clip_width, fit_width};

/// Audible notification byte.
pub const BELL: u8 = 0x07;

const CLEAR_SCREEN: &str = "\x1b[2J";
const CURSOR_HOME: &str = "\x1b[0;0H";

/// Everything needed to paint one session's screen.
pub struct ScreenView<'a> {
    pub rows: u16,
    pub cols: u16,
    /// Visible log lines, oldest first; at most `rows - 4` entries.
    pub messages: &'a [String],
    /// The not-yet-submitted input line.
    pub input: &'a str,
    /// Status segment for the bottom border.
    pub status: &'a str,
    /// Tracked cursor position, 1-based (column, row).
    pub cursor: (u16, u16),
}

/// Paint a complete frame into `out`.
pub fn paint(view: &ScreenView<'_>, fonts: &FontCatalog, out: &mut BytesMut) {
    let cols = view.cols as usize;
    let rows = view.rows as usize;
    let message_rows = rows.saturating_sub(4);

    let mut frame = String::with_capacity(rows * (cols + 2) + 16);
    frame.push_str(CLEAR_SCREEN);
    frame.push_str(CURSOR_HOME);

    // Top border.
    frame.push('┌');
    push_rule(&mut frame, cols.saturating_sub(2));
    frame.push_str("┐\r\n");

    // Message area, newest at the bottom: leading slots stay blank until
    // the log is deep enough.
    let blank_slots = message_rows.saturating_sub(view.messages.len());
    for slot in 0..message_rows {
        frame.push_str("│ ");
        match slot.checked_sub(blank_slots).and_then(|i| view.messages.get(i)) {
            Some(line) => frame.push_str(&fit_width(line, cols - 3, fonts)),
            None => frame.push_str(&fit_width("", cols - 3, fonts)),
        }
        frame.push_str("│\r\n");
    }

    // Divider between messages and input.
    frame.push('├');
    push_rule(&mut frame, cols.saturating_sub(2));
    frame.push_str("┤\r\n");

    // Input line.
    frame.push_str("│ > ");
    frame.push_str(&fit_width(view.input, cols - 5, fonts));
    frame.push_str("│\r\n");

    // Bottom border carrying the status segment. The box spans the full
    // terminal height, so the status lives inside the border row.
    let (status, status_width) = clip_width(view.status, cols.saturating_sub(5), fonts);
    frame.push_str("└─ ");
    frame.push_str(&status);
    frame.push(' ');
    push_rule(&mut frame, cols.saturating_sub(5).saturating_sub(status_width));
    frame.push('┘');

    // Restore the tracked cursor.
    let (x, y) = view.cursor;
    frame.push_str(&format!("\x1b[{y};{x}H"));

    out.extend_from_slice(frame.as_bytes());
}

fn push_rule(frame: &mut String, count: usize) {
    for _ in 0..count {
        frame.push('─');
    }
}
