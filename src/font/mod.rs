//! Glyph metrics: estimating how many terminal columns a character needs.
//!
//! The service ships a directory of TrueType fonts. At startup every font
//! is parsed once into a [`FontCatalog`]; the catalog is immutable from
//! then on and shared read-only across all sessions. A character's "width
//! rate" is its advance width averaged over every font that covers it,
//! expressed in half-cells of the probe font size — in practice 1 for
//! ASCII and 2 for most CJK ideographs.

mod reader;
mod sfnt;

pub use sfnt::FontMetrics;

use std::path::Path;

/// Errors from font parsing and width lookups.
///
/// All of these are non-fatal to the service: a parse error skips the font
/// at load time, a lookup error drops that font from one character's
/// average, and [`FontError::NoCoverage`] tells the caller no font could
/// vote at all.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("font data ends before the structure it should contain")]
    Truncated,
    #[error("required table missing: {0}")]
    MissingTable(&'static str),
    #[error("unitsPerEm is zero")]
    ZeroScale,
    #[error("no Unicode (platform 0, encoding 3) cmap record")]
    NoUnicodeRecord,
    #[error("no advance width for {0:?}")]
    GlyphOutOfRange(char),
    #[error("no font covers {0:?}")]
    NoCoverage(char),
}

/// All fonts available to the process, parsed once.
pub struct FontCatalog {
    fonts: Vec<(String, FontMetrics)>,
}

impl FontCatalog {
    /// An empty catalog: every non-ASCII width lookup errors.
    pub fn empty() -> Self {
        Self { fonts: Vec::new() }
    }

    /// Parse every `*.ttf` file in `dir`.
    ///
    /// A file that fails to parse is logged and skipped; it never
    /// participates in any later width computation. An unreadable
    /// directory is an error — the operator pointed us somewhere wrong.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut fonts = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ttf") {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let data = std::fs::read(&path)?;
            match FontMetrics::parse(&data) {
                Ok(metrics) => {
                    tracing::debug!(font = %name, glyphs = metrics.glyph_count(), "loaded font");
                    fonts.push((name, metrics));
                }
                Err(err) => {
                    tracing::warn!(font = %name, %err, "skipping unparsable font");
                }
            }
        }
        if fonts.is_empty() {
            tracing::warn!(dir = %dir.display(), "no usable fonts; non-ASCII widths will be unknown");
        }
        Ok(Self { fonts })
    }

    /// Number of usable fonts.
    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Estimated width of `ch` in half-cells of `font_size`.
    ///
    /// ASCII never consults the fonts and is always 1. For everything else
    /// the advance widths of all covering fonts are averaged; fonts that
    /// error for this character abstain. No font covering the character is
    /// an error the caller must decide about (rendering treats it as 0).
    pub fn width_rate(&self, ch: char, font_size: u16) -> Result<u16, FontError> {
        if ch.is_ascii() {
            return Ok(1);
        }
        let size = f64::from(font_size);
        let mut sum = 0.0;
        let mut votes = 0u32;
        for (name, metrics) in &self.fonts {
            match metrics.advance_for(ch, size) {
                Ok(width) => {
                    sum += width;
                    votes += 1;
                }
                Err(err) => {
                    tracing::trace!(font = %name, %err, "font abstains from width vote");
                }
            }
        }
        if votes == 0 {
            return Err(FontError::NoCoverage(ch));
        }
        let avg = sum / f64::from(votes);
        Ok((avg / size * 2.0).round() as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_one_without_fonts() {
        let catalog = FontCatalog::empty();
        assert_eq!(catalog.width_rate('A', 16).unwrap(), 1);
        assert_eq!(catalog.width_rate('~', 16).unwrap(), 1);
    }

    #[test]
    fn non_ascii_without_fonts_is_no_coverage() {
        let catalog = FontCatalog::empty();
        assert!(matches!(
            catalog.width_rate('中', 16),
            Err(FontError::NoCoverage('中'))
        ));
    }
}
