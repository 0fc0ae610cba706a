//! Pushback line reader.

use memchr::memchr;

use crate::io::Channel;
use crate::Result;

/// Buffered reader that hands out one line at a time while keeping any
/// unconsumed bytes for the next call.
///
/// A line is terminated by `\n`; the terminator and a preceding `\r` are
/// stripped. When the stream ends, the remaining buffered bytes are returned
/// as a final line. A line longer than the buffer capacity is returned in
/// capacity-sized pieces.
///
/// Callers may switch to raw reads on the same channel at any point, as long
/// as they drain [`LineReader::take_buffered`] first.
#[derive(Debug)]
pub struct LineReader {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
}

impl LineReader {
    /// Default capacity used by the protocol drivers.
    pub const DEFAULT_CAPACITY: usize = 8192;

    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            start: 0,
            end: 0,
            eof: false,
        }
    }

    /// Returns the next line, or `None` once the stream is exhausted.
    pub fn read_line(&mut self, chan: &mut dyn Channel) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = memchr(b'\n', &self.buf[self.start..self.end]) {
                let mut line = self.buf[self.start..self.start + pos].to_vec();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                self.start += pos + 1;
                return Ok(Some(line));
            }

            // A single line filling the whole buffer is handed out as-is.
            if self.end - self.start == self.buf.len() {
                let line = self.buf[self.start..self.end].to_vec();
                self.start = self.end;
                return Ok(Some(line));
            }

            if self.eof {
                if self.start < self.end {
                    let line = self.buf[self.start..self.end].to_vec();
                    self.start = self.end;
                    return Ok(Some(line));
                }
                return Ok(None);
            }

            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            let n = chan.read(&mut self.buf[self.end..])?;
            if n == 0 {
                self.eof = true;
            } else {
                self.end += n;
            }
        }
    }

    /// Hands back all buffered-but-unconsumed bytes, emptying the buffer.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        let bytes = self.buf[self.start..self.end].to_vec();
        self.start = self.end;
        bytes
    }

    pub fn buffered_len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_eof(&self) -> bool {
        self.eof && self.start == self.end
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::collections::VecDeque;

    /// Channel fed from fixed chunks, to model short reads.
    struct ChunkChannel {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkChannel {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl Channel for ChunkChannel {
        fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
            match self.chunks.front_mut() {
                None => Ok(0),
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.pop_front();
                    }
                    Ok(n)
                }
            }
        }

        fn write_all(&mut self, _buf: &[u8]) -> crate::Result<()> {
            Err(TransportError::Closed)
        }
    }

    fn lines_of(reader: &mut LineReader, chan: &mut ChunkChannel) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(line) = reader.read_line(chan).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn splits_lines_and_strips_terminators() {
        let mut chan = ChunkChannel::new(&[b"one\r\ntwo\nthree"]);
        let mut reader = LineReader::new(64);
        assert_eq!(
            lines_of(&mut reader, &mut chan),
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[test]
    fn line_split_across_reads() {
        let mut chan = ChunkChannel::new(&[b"hel", b"lo wor", b"ld\r\nrest\n"]);
        let mut reader = LineReader::new(64);
        assert_eq!(
            lines_of(&mut reader, &mut chan),
            vec![b"hello world".to_vec(), b"rest".to_vec()]
        );
    }

    #[test]
    fn overlong_line_is_returned_in_pieces() {
        let mut chan = ChunkChannel::new(&[b"aaaaaaaabbbb\n"]);
        let mut reader = LineReader::new(8);
        let lines = lines_of(&mut reader, &mut chan);
        assert_eq!(lines, vec![b"aaaaaaaa".to_vec(), b"bbbb".to_vec()]);
    }

    #[test]
    fn no_byte_lost_or_duplicated() {
        // Concatenation of all returned lines must equal the stream with
        // terminators removed.
        let stream: &[&[u8]] = &[b"alpha\r\nbet", b"a\ngamma\r", b"\ndelta"];
        let mut chan = ChunkChannel::new(stream);
        let mut reader = LineReader::new(16);
        let joined: Vec<u8> = lines_of(&mut reader, &mut chan).concat();
        assert_eq!(joined, b"alphabetagammadelta".to_vec());
    }

    #[test]
    fn take_buffered_preserves_pending_bytes() {
        let mut chan = ChunkChannel::new(&[b"header\nbody-bytes"]);
        let mut reader = LineReader::new(64);
        assert_eq!(
            reader.read_line(&mut chan).unwrap(),
            Some(b"header".to_vec())
        );
        assert_eq!(reader.take_buffered(), b"body-bytes".to_vec());
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut chan = ChunkChannel::new(&[]);
        let mut reader = LineReader::new(16);
        assert_eq!(reader.read_line(&mut chan).unwrap(), None);
    }
}
