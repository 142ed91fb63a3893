use std::iter::FusedIterator;

use memchr::memchr;

use crate::processor::constants::{FIELD_SEPARATOR, LINE_TERMINATOR};

/// Lazy `(key, value)` splitter over a buffer of `key;value` lines.
///
/// Lines without a separator (including empty lines) are skipped and counted
/// instead of being reported as errors. A last line without terminator is
/// still yielded.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
    skipped: u64,
}

impl<'a> Records<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Records {
            buf,
            pos: 0,
            skipped: 0,
        }
    }

    /// Number of lines skipped so far for having fewer than two fields
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Offset of `field` inside the buffer being split.
    pub fn offset_of(&self, field: &[u8]) -> usize {
        field.as_ptr() as usize - self.buf.as_ptr() as usize
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.buf.len() {
            let rest = &self.buf[self.pos..];
            let (line, advance) = match memchr(LINE_TERMINATOR, rest) {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;

            match memchr(FIELD_SEPARATOR, line) {
                Some(sep) => return Some((&line[..sep], &line[sep + 1..])),
                None => self.skipped += 1,
            }
        }
        None
    }
}

impl FusedIterator for Records<'_> {}
