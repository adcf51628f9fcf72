//! Local terminal handling for the thin client.

use std::io;

use crossterm::terminal;

/// RAII guard for terminal raw mode.
///
/// Raw mode is needed so every keystroke (backspace, arrows, the quit
/// line) reaches the server instead of being cooked locally. Dropping
/// the guard restores the previous state, panic included.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Current terminal size as (rows, cols).
///
/// crossterm reports (cols, rows); swapped here to match the protocol's
/// rows-first convention.
pub fn terminal_size() -> io::Result<(u16, u16)> {
    let (cols, rows) = terminal::size()?;
    Ok((rows, cols))
}
