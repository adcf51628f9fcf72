//! Big-endian cursor over a font byte slice.
//!
//! The sfnt container stores all multi-byte integers in network byte order.
//! Every read is bounds-checked; running off the end of a table surfaces as
//! [`FontError::Truncated`] rather than a panic, so a corrupt font file can
//! never take a session down.

use super::FontError;

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FontError> {
        if self.remaining() < n {
            return Err(FontError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), FontError> {
        self.take(n).map(|_| ())
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, FontError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FontError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a 4-byte table tag as raw ASCII.
    pub(crate) fn read_tag(&mut self) -> Result<[u8; 4], FontError> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}
