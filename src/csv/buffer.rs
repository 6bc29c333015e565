//! Growable byte buffer with a cell start mark.

use std::io::{self, Read};

/// Bytes read from the input, with `mark` at the start of the current cell.
///
/// Bytes before the mark belong to cells already emitted and are discarded
/// by [`CharBuffer::shift_to_mark`] before each refill. The buffer doubles
/// when a single cell fills it entirely.
#[derive(Debug)]
pub struct CharBuffer {
    buffer: Vec<u8>,
    size: usize,
    mark: usize,
}

impl CharBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity.max(1)],
            size: 0,
            mark: 0,
        }
    }

    /// Valid bytes
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.size]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn mark(&self) -> usize {
        self.mark
    }

    pub fn set_mark(&mut self, mark: usize) {
        self.mark = mark;
    }

    /// Drop the bytes before the mark, returning how many were dropped
    pub fn shift_to_mark(&mut self) -> usize {
        let shift = self.mark;
        if shift > 0 {
            self.buffer.copy_within(shift..self.size, 0);
            self.size -= shift;
            self.mark = 0;
        }
        shift
    }

    /// Read more bytes after the valid ones; `false` at end of input
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<bool> {
        if self.size == self.buffer.len() {
            let grown = self.buffer.len() * 2;
            self.buffer.resize(grown, 0);
        }
        loop {
            match reader.read(&mut self.buffer[self.size..]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.size += n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Buffer preloaded with `data`
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buffer = Self::new(data.len());
        buffer.buffer[..data.len()].copy_from_slice(data);
        buffer.size = data.len();
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_and_fill() {
        let mut buffer = CharBuffer::new(4);
        let mut input: &[u8] = b"abcdefgh";
        assert!(buffer.fill_from(&mut input).unwrap());
        assert_eq!(buffer.bytes(), b"abcd");

        buffer.set_mark(3);
        assert_eq!(buffer.shift_to_mark(), 3);
        assert_eq!(buffer.bytes(), b"d");
        assert!(buffer.fill_from(&mut input).unwrap());
        assert_eq!(buffer.bytes(), b"defg");
    }

    #[test]
    fn test_grows_when_full_without_mark() {
        let mut buffer = CharBuffer::new(2);
        let mut input: &[u8] = b"abcdef";
        assert!(buffer.fill_from(&mut input).unwrap());
        assert_eq!(buffer.shift_to_mark(), 0);
        assert!(buffer.fill_from(&mut input).unwrap());
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.bytes(), b"abcd");
    }
}
