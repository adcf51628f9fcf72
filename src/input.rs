//! Keystroke decoding and input normalization.
//!
//! The transport delivers raw byte chunks. A chunk either matches one of
//! the recognized control sequences or is treated as literal text after
//! normalization. Anything that is neither (invalid UTF-8, unknown escape
//! sequences) decodes to nothing and must be a silent no-op upstream.

/// Maximum username length, in characters.
pub const MAX_USERNAME_LEN: usize = 16;

/// One decoded keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Enter,
    ArrowLeft,
    ArrowRight,
    /// Literal input, not yet normalized.
    Text(String),
}

/// Decode one inbound byte chunk.
///
/// Recognized sequences: backspace `0x7F`, enter `0x0D`, left arrow
/// `1B 5B 44`, right arrow `1B 5B 43`. Everything else is literal text if
/// it is valid UTF-8, and `None` otherwise.
pub fn decode(data: &[u8]) -> Option<Key> {
    match data {
        [0x7F] => Some(Key::Backspace),
        [0x0D] => Some(Key::Enter),
        [0x1B, 0x5B, 0x44] => Some(Key::ArrowLeft),
        [0x1B, 0x5B, 0x43] => Some(Key::ArrowRight),
        [] => None,
        other => std::str::from_utf8(other)
            .ok()
            .map(|s| Key::Text(s.to_string())),
    }
}

/// Normalize literal text input.
///
/// Full-width ASCII variants (U+FF01..=U+FF5E) fold to their half-width
/// equivalents by the fixed 0xFEE0 offset, and C0 control bytes are
/// stripped. The result can be empty, which callers treat as a no-op.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0),
            c if (c as u32) < 0x20 => None,
            c => Some(c),
        })
        .collect()
}

/// Validate a username at authentication time.
///
/// Names must be non-empty, at most [`MAX_USERNAME_LEN`] characters, and
/// survive [`normalize`] unchanged (no control characters, no full-width
/// variants that would alias another name on screen).
pub fn validate_username(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("username must not be empty".into());
    }
    let chars = name.chars().count();
    if chars > MAX_USERNAME_LEN {
        return Err(format!(
            "username too long ({chars} chars, max {MAX_USERNAME_LEN})"
        ));
    }
    if normalize(name) != name {
        return Err("username contains control or full-width characters".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_control_sequences() {
        assert_eq!(decode(&[0x7F]), Some(Key::Backspace));
        assert_eq!(decode(&[0x0D]), Some(Key::Enter));
        assert_eq!(decode(&[0x1B, 0x5B, 0x44]), Some(Key::ArrowLeft));
        assert_eq!(decode(&[0x1B, 0x5B, 0x43]), Some(Key::ArrowRight));
    }

    #[test]
    fn decodes_text_chunks() {
        assert_eq!(decode(b"hello"), Some(Key::Text("hello".into())));
        // Multi-byte UTF-8 arrives as one chunk.
        assert_eq!(decode("中".as_bytes()), Some(Key::Text("中".into())));
    }

    #[test]
    fn unknown_sequences_decode_to_nothing() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0xFF, 0xFE]), None);
        // Up arrow is not handled, but it IS valid UTF-8, so it decodes as
        // text; normalization strips the ESC control byte later.
        assert_eq!(
            decode(&[0x1B, 0x5B, 0x41]),
            Some(Key::Text("\u{1B}[A".into()))
        );
    }

    #[test]
    fn normalize_folds_full_width() {
        assert_eq!(normalize("ａｂｃ１２３"), "abc123");
        assert_eq!(normalize("／quit"), "/quit");
    }

    #[test]
    fn normalize_strips_c0() {
        assert_eq!(normalize("a\u{1B}[Ab"), "a[Ab");
        assert_eq!(normalize("\t\r\n"), "");
    }

    #[test]
    fn normalize_keeps_wide_glyphs() {
        assert_eq!(normalize("你好"), "你好");
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("中文名").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username(&"x".repeat(17)).is_err());
        assert!(validate_username(&"x".repeat(16)).is_ok());
        assert!(validate_username("bad\u{7}name").is_err());
        assert!(validate_username("ｗｉｄｅ").is_err());
    }
}
