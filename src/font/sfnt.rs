//! Minimal sfnt (TrueType container) parse: just enough of the `cmap`,
//! `head`, `glyf`, and `hmtx` tables to estimate advance widths.
//!
//! This is deliberately NOT a conformant font parser. Two approximations
//! are load-bearing and must be preserved:
//!
//! - The `cmap` subtables are never decoded. The encoding record for
//!   platform 0 / encoding 3 (Unicode BMP) contributes only its raw
//!   subtable *offset*, which is used as a glyph-id base added to a
//!   character's code point. Averaged across several fonts this still
//!   separates 1-column from 2-column glyphs, which is all the caller needs.
//! - The `glyf` table is treated as a run of fixed 10-byte glyph summary
//!   records; only the record count matters, as the bound on how many
//!   `hmtx` entries to read.

use std::collections::HashMap;

use super::{reader::Reader, FontError};

/// Size of one glyph summary record in `glyf`: numberOfContours plus the
/// four bounding-box coordinates, each 16 bits.
const GLYF_RECORD_SIZE: usize = 10;

/// Offset of unitsPerEm within `head`: version, fontRevision,
/// checkSumAdjustment, magicNumber (4 bytes each) then flags (2 bytes).
const HEAD_UNITS_PER_EM_OFFSET: usize = 18;

/// Encoding-record key for platform 0 / encoding 3 (Unicode BMP).
const UNICODE_BMP: u32 = 3;

/// Advance-width metrics extracted from one font file.
///
/// Parsed once per font source and never mutated afterwards.
pub struct FontMetrics {
    /// `(platform_id << 16) | encoding_id` to the record's raw subtable
    /// offset, kept as an approximate glyph-id base.
    codepoint_to_glyph: HashMap<u32, u32>,
    /// Scale converting advance units to font-size-relative widths.
    units_per_em: u16,
    /// Per-glyph advance widths, indexed by approximate glyph id.
    advance_widths: Vec<u16>,
}

impl FontMetrics {
    /// Parse a font file. Any structural problem (missing table, short
    /// table, zero scale) rejects the whole font; the catalog skips it.
    pub fn parse(data: &[u8]) -> Result<Self, FontError> {
        let mut r = Reader::new(data);

        let _sfnt_version = r.read_u32()?;
        let num_tables = r.read_u16()?;
        // searchRange, entrySelector, rangeShift
        r.skip(6)?;

        let mut tables: Vec<([u8; 4], usize, usize)> = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let tag = r.read_tag()?;
            let _checksum = r.read_u32()?;
            let offset = r.read_u32()? as usize;
            let length = r.read_u32()? as usize;
            tables.push((tag, offset, length));
        }

        let table = |tag: &[u8; 4]| -> Result<&[u8], FontError> {
            let (_, offset, length) = tables
                .iter()
                .find(|(t, _, _)| t == tag)
                .ok_or(FontError::MissingTable(table_name(tag)))?;
            data.get(*offset..*offset + *length)
                .ok_or(FontError::Truncated)
        };

        // cmap: version, record count, then (platform, encoding, offset)
        // triplets. The offsets are retained raw, not decoded.
        let mut cmap = Reader::new(table(b"cmap")?);
        let _version = cmap.read_u16()?;
        let record_count = cmap.read_u16()?;
        let mut codepoint_to_glyph = HashMap::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let platform_id = cmap.read_u16()?;
            let encoding_id = cmap.read_u16()?;
            let subtable_offset = cmap.read_u32()?;
            let key = (u32::from(platform_id) << 16) | u32::from(encoding_id);
            codepoint_to_glyph.insert(key, subtable_offset);
        }

        let mut head = Reader::new(table(b"head")?);
        head.skip(HEAD_UNITS_PER_EM_OFFSET)?;
        let units_per_em = head.read_u16()?;
        if units_per_em == 0 {
            return Err(FontError::ZeroScale);
        }

        // Only the count of summary records is needed; it bounds hmtx.
        let glyph_count = table(b"glyf")?.len() / GLYF_RECORD_SIZE;

        let mut hmtx = Reader::new(table(b"hmtx")?);
        let mut advance_widths = Vec::with_capacity(glyph_count);
        for _ in 0..glyph_count {
            let advance = hmtx.read_u16()?;
            let _left_side_bearing = hmtx.read_u16()?;
            advance_widths.push(advance);
        }

        Ok(Self {
            codepoint_to_glyph,
            units_per_em,
            advance_widths,
        })
    }

    /// Advance width of `ch` at the given font size, in pixels.
    ///
    /// Errors (no Unicode encoding record, code point past the end of the
    /// advance table) mean this font cannot vote for this character; the
    /// catalog drops it from the average.
    pub fn advance_for(&self, ch: char, font_size: f64) -> Result<f64, FontError> {
        let base = self
            .codepoint_to_glyph
            .get(&UNICODE_BMP)
            .copied()
            .ok_or(FontError::NoUnicodeRecord)?;
        let glyph_id = base as usize + ch as usize;
        let advance = self
            .advance_widths
            .get(glyph_id)
            .copied()
            .ok_or(FontError::GlyphOutOfRange(ch))?;
        Ok(f64::from(advance) * font_size / f64::from(self.units_per_em))
    }

    /// Number of advance-width entries read, for diagnostics.
    pub fn glyph_count(&self) -> usize {
        self.advance_widths.len()
    }
}

fn table_name(tag: &[u8; 4]) -> &'static str {
    match tag {
        b"cmap" => "cmap",
        b"head" => "head",
        b"glyf" => "glyf",
        b"hmtx" => "hmtx",
        _ => "unknown",
    }
}
