//! ASCII-mode newline translation.
//!
//! FTP ASCII transfers use CRLF on the wire. Downloads strip the `\r`
//! before each `\n`; uploads insert one before each bare `\n`. Both
//! directions carry state across chunk boundaries so a CRLF split between
//! two reads is still translated.

/// Download direction: removes `\r` when followed by `\n`.
#[derive(Debug, Default)]
pub struct AsciiDecoder {
    /// A trailing `\r` held back until the next chunk shows what follows.
    pending_cr: bool,
}

impl AsciiDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates `input` into `out`. `out` must hold `input.len() + 1`
    /// bytes (one for a held-back `\r` that turns out to be literal).
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.clear();
        if self.pending_cr {
            if input.first() != Some(&b'\n') {
                out.push(b'\r');
            }
            self.pending_cr = false;
        }

        let mut i = 0;
        while i < input.len() {
            let b = input[i];
            if b == b'\r' {
                if i + 1 == input.len() {
                    self.pending_cr = true;
                } else if input[i + 1] != b'\n' {
                    out.push(b'\r');
                }
            } else {
                out.push(b);
            }
            i += 1;
        }
    }

    /// Flushes a held-back `\r` once the stream ends.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        out.clear();
        if self.pending_cr {
            out.push(b'\r');
            self.pending_cr = false;
        }
    }
}

/// Upload direction: inserts `\r` before each `\n` that lacks one.
#[derive(Debug, Default)]
pub struct AsciiEncoder {
    last_was_cr: bool,
}

impl AsciiEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, input: &[u8], out: &mut Vec<u8>) {
        out.clear();
        for &b in input {
            if b == b'\n' && !self.last_was_cr {
                out.push(b'\r');
            }
            out.push(b);
            self.last_was_cr = b == b'\r';
        }
    }
}
