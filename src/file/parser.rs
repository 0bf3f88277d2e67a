//! Cursor-based byte stream parser for class-file decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a bounds-checked cursor over a
//! byte slice. Class files are big-endian throughout, so the typed reads decode big-endian
//! values; every read validates that enough data remains before touching the buffer.
//!
//! # Usage Examples
//!
//! ```rust
//! use shadowclass::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! parser.advance_by(2)?;
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! assert!(!parser.has_more_data());
//! # Ok::<(), shadowclass::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked, big-endian cursor over a byte slice.
///
/// `Parser` keeps a position into borrowed data and hands out typed values or sub-slices,
/// advancing the position as it goes. Slices returned by [`Parser::read_bytes`] borrow from the
/// underlying buffer, not from the parser, so they outlive the cursor.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to exactly the end of the buffer is allowed; any read from there fails.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing would exceed the data length.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        self.position = self.calc_end_position(step)?;
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes left between the cursor and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Ensures that at least `needed` bytes are available from the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `needed` bytes remain.
    pub fn ensure_remaining(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(OutOfBounds);
        }
        Ok(())
    }

    /// Computes `position + length`, checking for overflow and for running past the data.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the result would overflow or exceed the data.
    pub fn calc_end_position(&self, length: usize) -> Result<usize> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;

        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(end)
    }

    /// Peek at the byte under the cursor without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a big-endian value of type `T` and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at(self.data, &mut self.position)
    }

    /// Read `length` raw bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `length` bytes would exceed the data.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.calc_end_position(length)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Skip forward so that the position becomes a multiple of `alignment`, measured from
    /// `base`. Used for the padding in front of `tableswitch` / `lookupswitch` operands.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the data.
    pub fn align_from(&mut self, base: usize, alignment: usize) -> Result<()> {
        let relative = self.position.saturating_sub(base);
        let padding = (alignment - relative % alignment) % alignment;
        self.advance_by(padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads_are_big_endian() -> Result<()> {
        let data = [0x12, 0x34, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x01];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_be::<u16>()?, 0x1234);
        assert_eq!(parser.read_be::<i16>()?, -2);
        assert_eq!(parser.read_be::<u32>()?, 1);
        assert!(!parser.has_more_data());
        Ok(())
    }

    #[test]
    fn error_handling() {
        let data = [0x01];
        let mut parser = Parser::new(&data);

        assert!(parser.read_be::<u16>().is_err());
        assert_eq!(parser.pos(), 0);
        assert!(parser.advance_by(2).is_err());
        assert!(parser.seek(2).is_err());
        assert!(parser.seek(1).is_ok());
        assert!(parser.peek_byte().is_err());
    }

    #[test]
    fn read_bytes_outlives_parser() -> Result<()> {
        let data = [0x01, 0x02, 0x03, 0x04];
        let slice = {
            let mut parser = Parser::new(&data);
            parser.advance()?;
            parser.read_bytes(2)?
        };
        assert_eq!(slice, &[0x02, 0x03]);
        Ok(())
    }

    #[test]
    fn align_from_code_start() -> Result<()> {
        let data = [0u8; 16];
        let mut parser = Parser::new(&data);

        // Code starts at 2; a switch opcode at code offset 0 ends at absolute 3.
        parser.seek(3)?;
        parser.align_from(2, 4)?;
        assert_eq!(parser.pos(), 6);

        parser.align_from(2, 4)?;
        assert_eq!(parser.pos(), 6);
        Ok(())
    }
}
