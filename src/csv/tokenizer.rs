//! Streaming CSV tokenizer.
//!
//! A byte-level state machine over a [`CharBuffer`]. Cells are reported to a
//! [`CellConsumer`] as spans of the tokenizer's own buffer; quoted cells are
//! unescaped in place before they are reported. The tokenizer survives
//! buffer refills at any byte, including between the CR and LF of a CRLF
//! pair and in the middle of a quoted cell.

use std::io::{self, Read};

use crate::csv::buffer::CharBuffer;
use crate::error::{CellErrorKind, MapperError, MapperResult};

/// Some content has been consumed since the mark
const HAS_CONTENT: u8 = 8;
/// Inside a quoted section
const IN_QUOTE: u8 = 4;
/// The row just ended on a CR; a following LF is absorbed
const IN_CR: u8 = 2;
/// Toggled on each quote inside a quoted cell
const QUOTE: u8 = 1;
const ALL_QUOTES: u8 = QUOTE | IN_QUOTE;
const NONE: u8 = 0;

/// Receives cells and row boundaries from the tokenizer.
///
/// The span passed to [`CellConsumer::new_cell`] aliases the tokenizer's
/// buffer and is only valid for the duration of the call.
pub trait CellConsumer {
    fn new_cell(&mut self, buffer: &[u8], start: usize, length: usize);

    fn end_of_row(&mut self);

    /// End of input; flush any partial row
    fn end(&mut self);

    /// The next cell is malformed. It is still reported through `new_cell`.
    fn malformed_cell(&mut self, kind: CellErrorKind) {
        tracing::warn!("Malformed CSV cell: {:?}", kind);
    }

    /// The next cell was quoted in the input
    fn quoted_cell(&mut self) {}
}

/// Tokenizer state for one stream
#[derive(Debug)]
pub struct CsvTokenizer {
    buffer: CharBuffer,
    separator: u8,
    quote: u8,
    current_index: usize,
    state: u8,
    cells_in_row: usize,
}

impl CsvTokenizer {
    /// Tokenizer for a single-byte separator and quote
    pub fn new(separator: char, quote: char, buffer_size: usize) -> MapperResult<Self> {
        let to_byte = |c: char, what: &str| {
            u8::try_from(c)
                .ok()
                .filter(u8::is_ascii)
                .ok_or_else(|| MapperError::Config(format!("{} {:?} must be an ASCII character", what, c)))
        };
        Ok(Self::with_buffer(
            CharBuffer::new(buffer_size),
            to_byte(separator, "separator")?,
            to_byte(quote, "quote")?,
        ))
    }

    /// Tokenizer over bytes that are already in memory
    pub fn from_bytes(data: &[u8], separator: u8, quote: u8) -> Self {
        Self::with_buffer(CharBuffer::from_bytes(data), separator, quote)
    }

    fn with_buffer(buffer: CharBuffer, separator: u8, quote: u8) -> Self {
        Self {
            buffer,
            separator,
            quote,
            current_index: 0,
            state: NONE,
            cells_in_row: 0,
        }
    }

    /// Consume every byte currently in the buffer
    pub fn consume_all<C: CellConsumer + ?Sized>(&mut self, consumer: &mut C) {
        let size = self.buffer.size();
        while self.current_index < size {
            let index = self.current_index;
            let c = self.buffer.bytes()[index];
            self.consume_byte(c, index, consumer);
            self.current_index += 1;
        }
    }

    /// Shift unconsumed bytes to the front and read more; `false` at end of input
    pub fn refill<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<bool> {
        let shift = self.buffer.shift_to_mark();
        self.current_index -= shift;
        self.buffer.fill_from(reader)
    }

    /// Emit the trailing cell, if any, and signal the end of input
    pub fn finish<C: CellConsumer + ?Sized>(&mut self, consumer: &mut C) {
        if self.current_index > self.buffer.mark() || self.cells_in_row > 0 {
            if self.state & IN_QUOTE != 0 {
                consumer.malformed_cell(CellErrorKind::UnterminatedQuote);
            }
            self.new_cell(self.current_index, consumer);
        }
        self.cells_in_row = 0;
        consumer.end();
    }

    /// Tokenize a whole stream: consume, refill, repeat, then finish
    pub fn parse<R: Read + ?Sized, C: CellConsumer + ?Sized>(
        &mut self,
        reader: &mut R,
        consumer: &mut C,
    ) -> io::Result<()> {
        loop {
            self.consume_all(consumer);
            if !self.refill(reader)? {
                break;
            }
        }
        self.finish(consumer);
        Ok(())
    }

    fn consume_byte<C: CellConsumer + ?Sized>(&mut self, c: u8, index: usize, consumer: &mut C) {
        let in_quote = self.state & IN_QUOTE != 0;
        if c == self.separator {
            self.state &= !IN_CR;
            if in_quote {
                self.state |= HAS_CONTENT;
            } else {
                self.new_cell(index, consumer);
            }
        } else if c == self.quote {
            self.state &= !IN_CR;
            self.on_quote();
        } else if c == b'\n' {
            if in_quote {
                self.state |= HAS_CONTENT;
            } else if self.state & IN_CR != 0 {
                self.state &= !IN_CR;
                self.buffer.set_mark(index + 1);
            } else {
                self.end_of_row(index, consumer);
            }
        } else if c == b'\r' {
            if in_quote {
                self.state |= HAS_CONTENT;
            } else {
                self.end_of_row(index, consumer);
                self.state |= IN_CR;
            }
        } else {
            self.state = (self.state & !IN_CR) | HAS_CONTENT;
        }
    }

    /// A leading quote opens a quoted section; any later quote toggles it,
    /// so a doubled quote stays inside and a lone one closes it.
    fn on_quote(&mut self) {
        if self.state & HAS_CONTENT == 0 {
            self.state |= IN_QUOTE | HAS_CONTENT;
        } else {
            self.state ^= ALL_QUOTES;
        }
    }

    fn end_of_row<C: CellConsumer + ?Sized>(&mut self, index: usize, consumer: &mut C) {
        self.new_cell(index, consumer);
        self.cells_in_row = 0;
        consumer.end_of_row();
    }

    fn new_cell<C: CellConsumer + ?Sized>(&mut self, index: usize, consumer: &mut C) {
        let start = self.buffer.mark();
        let length = index - start;
        let quote = self.quote;
        let bytes = self.buffer.bytes_mut();
        if length > 0 && bytes[start] == quote {
            let (unescaped, trailing) = unescape(bytes, start, length, quote);
            if trailing {
                consumer.malformed_cell(CellErrorKind::TrailingAfterQuote);
            }
            consumer.quoted_cell();
            consumer.new_cell(self.buffer.bytes(), start + 1, unescaped);
        } else {
            consumer.new_cell(self.buffer.bytes(), start, length);
        }
        self.cells_in_row += 1;
        self.buffer.set_mark(index + 1);
        self.state = NONE;
    }
}

/// Unescape the quoted span `bytes[offset..offset + length]` in place.
///
/// The result starts at `offset + 1`. Returns its length and whether
/// content followed the closing quote.
fn unescape(bytes: &mut [u8], offset: usize, length: usize, quote: u8) -> (usize, bool) {
    let first = offset + 1;
    let last = offset + length - 1;
    let mut write = first;
    let mut not_escaped = true;
    let mut trailing = false;
    for i in first..last {
        let c = bytes[i];
        if !not_escaped && c != quote {
            trailing = true;
        }
        not_escaped = c != quote || !not_escaped;
        if not_escaped {
            bytes[write] = c;
            write += 1;
        }
    }
    if last >= first {
        let c = bytes[last];
        if !not_escaped && c != quote {
            trailing = true;
        }
        if c != quote || !not_escaped {
            bytes[write] = c;
            write += 1;
        }
    }
    (write - first, trailing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Cells {
        rows: Vec<Vec<String>>,
        current: Vec<String>,
        malformed: Vec<CellErrorKind>,
        ended: bool,
    }

    impl CellConsumer for Cells {
        fn new_cell(&mut self, buffer: &[u8], start: usize, length: usize) {
            self.current
                .push(String::from_utf8_lossy(&buffer[start..start + length]).into_owned());
        }

        fn end_of_row(&mut self) {
            self.rows.push(std::mem::take(&mut self.current));
        }

        fn end(&mut self) {
            if !self.current.is_empty() {
                self.end_of_row();
            }
            self.ended = true;
        }

        fn malformed_cell(&mut self, kind: CellErrorKind) {
            self.malformed.push(kind);
        }
    }

    fn tokenize(input: &str) -> Cells {
        let mut tokenizer = CsvTokenizer::from_bytes(input.as_bytes(), b',', b'"');
        let mut cells = Cells::default();
        tokenizer.consume_all(&mut cells);
        tokenizer.finish(&mut cells);
        cells
    }

    #[test]
    fn test_unescape_in_place() {
        let mut bytes = b"\"d\"\"e\"".to_vec();
        let (length, trailing) = unescape(&mut bytes, 0, 6, b'"');
        assert_eq!(&bytes[1..1 + length], b"d\"e");
        assert!(!trailing);
    }

    #[test]
    fn test_quoted_cells() {
        let cells = tokenize("a,\"b,c\",\"d\"\"e\",f");
        assert_eq!(cells.rows, vec![vec!["a", "b,c", "d\"e", "f"]]);
        assert!(cells.ended);
    }

    #[test]
    fn test_empty_quoted_cell() {
        let cells = tokenize("\"\",x\n");
        assert_eq!(cells.rows, vec![vec!["", "x"]]);
    }

    #[test]
    fn test_trailing_separator_emits_empty_cell() {
        let cells = tokenize("a,b,");
        assert_eq!(cells.rows, vec![vec!["a", "b", ""]]);
    }

    #[test]
    fn test_quote_inside_unquoted_cell_toggles_quoting() {
        let cells = tokenize("ab\"c,d\"e\n");
        assert_eq!(cells.rows, vec![vec!["ab\"c,d\"e"]]);
        assert!(cells.malformed.is_empty());

        let cells = tokenize("5\" pipe,x");
        assert_eq!(cells.rows, vec![vec!["5\" pipe,x"]]);
        assert_eq!(cells.malformed, vec![CellErrorKind::UnterminatedQuote]);
    }

    #[test]
    fn test_malformed_cells_are_reported() {
        let cells = tokenize("\"ab\"c,d\n\"open");
        assert_eq!(
            cells.malformed,
            vec![CellErrorKind::TrailingAfterQuote, CellErrorKind::UnterminatedQuote]
        );
        assert_eq!(cells.rows, vec![vec!["abc", "d"], vec!["open"]]);
    }

    #[test]
    fn test_non_ascii_dialect_rejected() {
        assert!(CsvTokenizer::new('§', '"', 16).is_err());
    }
}
