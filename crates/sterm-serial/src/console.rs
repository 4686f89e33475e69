//! Console line reader.
//!
//! Reads the operator's input one bounded line at a time. The reader keeps
//! its own buffer instead of wrapping the source in a `BufReader`, so the
//! bridge loop can ask whether a complete line is already buffered before it
//! blocks on the descriptor.

use std::io::{self, Read};
use std::mem;
use std::os::fd::{AsFd, BorrowedFd};

/// Longest line handed to the device in one piece.
pub const MAX_LINE_LEN: usize = 1024;

/// Result of one console read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// A complete line, terminator included, or a [`MAX_LINE_LEN`] piece
    /// of a longer one.
    Line(Vec<u8>),
    /// Some bytes arrived but no complete line yet.
    Pending,
    /// The console reached end-of-input.
    Eof,
}

/// Line reader over a pollable byte source.
#[derive(Debug)]
pub struct ConsoleInput<R> {
    source: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: Read + AsFd> ConsoleInput<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: Vec::with_capacity(MAX_LINE_LEN),
            eof: false,
        }
    }

    /// Returns true if [`ConsoleInput::read_line`] can answer without
    /// touching the source.
    pub fn has_buffered_line(&self) -> bool {
        self.eof || self.buf.len() >= MAX_LINE_LEN || self.buf.contains(&b'\n')
    }

    /// Returns the next buffered line, or performs a single read from the
    /// source and tries again.
    ///
    /// Call only when the source is readable or
    /// [`ConsoleInput::has_buffered_line`] is true; otherwise the read blocks.
    pub fn read_line(&mut self) -> io::Result<ConsoleLine> {
        if let Some(line) = self.take_line() {
            return Ok(ConsoleLine::Line(line));
        }
        if self.eof {
            return Ok(self.take_remainder());
        }

        let mut chunk = [0u8; MAX_LINE_LEN];
        let n = loop {
            match self.source.read(&mut chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ConsoleLine::Pending)
                }
                Err(e) => return Err(e),
            }
        };

        if n == 0 {
            self.eof = true;
            return Ok(self.take_remainder());
        }

        self.buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
        Ok(self
            .take_line()
            .map(ConsoleLine::Line)
            .unwrap_or(ConsoleLine::Pending))
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = match self.buf.iter().position(|&b| b == b'\n') {
            Some(newline) if newline < MAX_LINE_LEN => newline + 1,
            _ if self.buf.len() >= MAX_LINE_LEN => MAX_LINE_LEN,
            _ => return None,
        };
        Some(self.buf.drain(..end).collect())
    }

    /// An unterminated final line is still a line; after it comes EOF.
    fn take_remainder(&mut self) -> ConsoleLine {
        if self.buf.is_empty() {
            ConsoleLine::Eof
        } else {
            ConsoleLine::Line(mem::take(&mut self.buf))
        }
    }
}

impl<R: AsFd> AsFd for ConsoleInput<R> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.source.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn console() -> (ConsoleInput<UnixStream>, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (ConsoleInput::new(ours), theirs)
    }

    #[test]
    fn test_single_line() {
        let (mut input, mut operator) = console();
        operator.write_all(b"AT\n").unwrap();
        assert_eq!(input.read_line().unwrap(), ConsoleLine::Line(b"AT\n".to_vec()));
    }

    #[test]
    fn test_two_lines_in_one_read() {
        let (mut input, mut operator) = console();
        operator.write_all(b"one\ntwo\n").unwrap();

        assert_eq!(input.read_line().unwrap(), ConsoleLine::Line(b"one\n".to_vec()));
        assert!(input.has_buffered_line());
        assert_eq!(input.read_line().unwrap(), ConsoleLine::Line(b"two\n".to_vec()));
        assert!(!input.has_buffered_line());
    }

    #[test]
    fn test_partial_line_is_pending() {
        let (mut input, mut operator) = console();
        operator.write_all(b"hal").unwrap();
        assert_eq!(input.read_line().unwrap(), ConsoleLine::Pending);

        operator.write_all(b"f\n").unwrap();
        assert_eq!(input.read_line().unwrap(), ConsoleLine::Line(b"half\n".to_vec()));
    }

    #[test]
    fn test_long_line_is_split() {
        let (mut input, mut operator) = console();
        let long = vec![b'x'; MAX_LINE_LEN + 10];
        operator.write_all(&long).unwrap();
        operator.write_all(b"\n").unwrap();

        match input.read_line().unwrap() {
            ConsoleLine::Line(piece) => assert_eq!(piece.len(), MAX_LINE_LEN),
            other => panic!("expected a full piece, got {other:?}"),
        }
        match input.read_line().unwrap() {
            ConsoleLine::Line(rest) => {
                assert_eq!(rest.len(), 11);
                assert_eq!(rest.last(), Some(&b'\n'));
            }
            other => panic!("expected the remainder, got {other:?}"),
        }
    }

    #[test]
    fn test_eof_after_unterminated_line() {
        let (mut input, mut operator) = console();
        operator.write_all(b"last").unwrap();
        drop(operator);

        // The first read may only see the bytes; EOF follows on the next.
        let mut lines = Vec::new();
        loop {
            match input.read_line().unwrap() {
                ConsoleLine::Line(line) => lines.push(line),
                ConsoleLine::Pending => continue,
                ConsoleLine::Eof => break,
            }
        }
        assert_eq!(lines, vec![b"last".to_vec()]);
        assert!(input.has_buffered_line());
    }

    #[test]
    fn test_eof_on_closed_console() {
        let (mut input, operator) = console();
        drop(operator);
        assert_eq!(input.read_line().unwrap(), ConsoleLine::Eof);
    }
}
