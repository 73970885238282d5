//! Bounds-aware walker over a single packet buffer.
//!
//! A cursor never fails by itself. Every advance goes through
//! [`Cursor::consume`], which checks `position + len <= end` before moving,
//! so a failed parse leaves the position exactly where it was.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

use crate::error::ParseError;

/// Location of a parsed header of type `H` inside a cursor's buffer
pub struct Span<H> {
    offset: usize,
    len: usize,
    _header: PhantomData<fn() -> H>,
}

impl<H> Span<H> {
    pub(crate) fn new(offset: usize, len: usize) -> Self {
        Self {
            offset,
            len,
            _header: PhantomData,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes, including any options for variable-length headers
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

impl<H> Clone for Span<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for Span<H> {}

impl<H> PartialEq for Span<H> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.len == other.len
    }
}

impl<H> Eq for Span<H> {}

impl<H> fmt::Debug for Span<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("header", &std::any::type_name::<H>())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Read/write position within one packet buffer.
///
/// `B` is any byte buffer handle: `&[u8]` for the ingress path, `&mut [u8]`
/// or `Vec<u8>` when headers are written through.
#[derive(Debug, Clone)]
pub struct Cursor<B> {
    buf: B,
    start: usize,
    end: usize,
    pos: usize,
}

impl<B: AsRef<[u8]>> Cursor<B> {
    /// Bind a cursor to `buf`, positioned at its first byte
    pub fn new(buf: B) -> Self {
        let end = buf.as_ref().len();
        Self {
            buf,
            start: 0,
            end,
            pos: 0,
        }
    }

    /// Rebind to another buffer and rewind
    pub fn init(&mut self, buf: B) {
        self.start = 0;
        self.end = buf.as_ref().len();
        self.buf = buf;
        self.reset();
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last readable byte
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    pub fn reset(&mut self) {
        self.pos = self.start;
    }

    /// Copy bounds and position into `dst`; the buffer contents are shared, not copied
    pub fn clone_to(&self, dst: &mut Self)
    where
        B: Clone,
    {
        dst.clone_from(self);
    }

    /// Read-only cursor with the same bounds and position, for speculative parsing
    pub fn lookahead(&self) -> Cursor<&[u8]> {
        Cursor {
            buf: self.buf.as_ref(),
            start: self.start,
            end: self.end,
            pos: self.pos,
        }
    }

    /// Skip `len` bytes without interpreting them
    pub fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.consume(len).map(|_| ())
    }

    /// The whole bound buffer, independent of the current position
    pub fn buffer(&self) -> &[u8] {
        &self.buf.as_ref()[self.start..self.end]
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Checked consume: advance by `len` iff `[position, position + len)` lies
    /// inside the buffer. Returns the offset the consumed bytes start at.
    pub(crate) fn consume(&mut self, len: usize) -> Result<usize, ParseError> {
        let offset = self.pos;
        match offset.checked_add(len) {
            Some(next) if next <= self.end => {
                self.pos = next;
                Ok(offset)
            }
            _ => Err(ParseError::Truncated {
                offset,
                needed: len,
                available: self.remaining(),
            }),
        }
    }

    pub(crate) fn span_bytes<H>(&self, span: Span<H>) -> Result<&[u8], ParseError> {
        self.check_span(span)?;
        Ok(&self.buf.as_ref()[span.range()])
    }

    fn check_span<H>(&self, span: Span<H>) -> Result<(), ParseError> {
        match span.offset.checked_add(span.len) {
            Some(stop) if span.offset >= self.start && stop <= self.end => Ok(()),
            _ => Err(ParseError::Truncated {
                offset: span.offset,
                needed: span.len,
                available: self.end.saturating_sub(span.offset),
            }),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Cursor<B> {
    pub(crate) fn span_bytes_mut<H>(&mut self, span: Span<H>) -> Result<&mut [u8], ParseError> {
        self.check_span(span)?;
        Ok(&mut self.buf.as_mut()[span.range()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_cursor_bounds() {
        let buf = [0u8; 34];
        let cursor = Cursor::new(&buf[..]);
        assert_eq!(cursor.start(), 0);
        assert_eq!(cursor.end(), 34);
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.remaining(), 34);
    }

    #[test]
    fn test_consume_and_reset() {
        let buf = [0u8; 10];
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(cursor.consume(4), Ok(0));
        assert_eq!(cursor.consume(6), Ok(4));
        assert_eq!(cursor.remaining(), 0);

        cursor.reset();
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_consume_past_end_leaves_position() {
        let buf = [0u8; 10];
        let mut cursor = Cursor::new(&buf[..]);
        cursor.skip(8).unwrap();

        let err = cursor.consume(3).unwrap_err();
        assert_eq!(
            err,
            ParseError::Truncated {
                offset: 8,
                needed: 3,
                available: 2
            }
        );
        assert_eq!(cursor.position(), 8);
    }

    #[test]
    fn test_consume_overflow_is_truncation() {
        let buf = [0u8; 4];
        let mut cursor = Cursor::new(&buf[..]);
        cursor.skip(1).unwrap();
        assert!(cursor.consume(usize::MAX).is_err());
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_init_rebinds_and_rewinds() {
        let first = [0u8; 8];
        let second = [0u8; 3];
        let mut cursor = Cursor::new(&first[..]);
        cursor.skip(5).unwrap();

        cursor.init(&second[..]);
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.end(), 3);
    }

    #[test]
    fn test_clone_to_is_independent() {
        let buf = [0u8; 16];
        let mut cursor = Cursor::new(&buf[..]);
        cursor.skip(4).unwrap();

        let mut ahead = Cursor::new(&buf[..0]);
        cursor.clone_to(&mut ahead);
        assert_eq!(ahead.position(), 4);
        assert_eq!(ahead.end(), 16);

        ahead.skip(10).unwrap();
        assert!(ahead.skip(10).is_err());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_lookahead_from_mutable_cursor() {
        let mut buf = vec![0u8; 12];
        let mut cursor = Cursor::new(&mut buf[..]);
        cursor.skip(2).unwrap();

        let mut ahead = cursor.lookahead();
        ahead.skip(10).unwrap();
        assert_eq!(ahead.remaining(), 0);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_span_outside_buffer_rejected() {
        let buf = [0u8; 10];
        let cursor = Cursor::new(&buf[..]);
        let span: Span<()> = Span::new(8, 4);
        assert!(cursor.span_bytes(span).is_err());
        assert_eq!(cursor.span_bytes(Span::<()>::new(6, 4)).unwrap().len(), 4);
    }

    proptest! {
        /// Consume succeeds iff position + len <= end, and never moves on failure
        #[test]
        fn proptest_consume_bounds(len in 0usize..128, pre in 0usize..64, req in 0usize..128) {
            let buf = vec![0u8; len];
            let mut cursor = Cursor::new(&buf[..]);
            let pre = pre.min(len);
            cursor.skip(pre).unwrap();

            let result = cursor.consume(req);
            if pre + req <= len {
                prop_assert_eq!(result, Ok(pre));
                prop_assert_eq!(cursor.position(), pre + req);
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(cursor.position(), pre);
            }
            prop_assert!(cursor.position() <= cursor.end());
        }
    }
}
