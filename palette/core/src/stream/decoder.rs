//! Incremental Decoding
//!
//! Network chunks split wherever they like: in the middle of a line, and in
//! the middle of a multi-byte UTF-8 sequence. [`Utf8Decoder`] carries an
//! incomplete trailing sequence over to the next chunk instead of decoding it
//! early, and [`LineBuffer`] holds the unterminated tail of the text until its
//! separator arrives.

/// Line separator of the event framing
pub const LINE_SEPARATOR: char = '\n';

/// Streaming UTF-8 decoder
///
/// Invalid sequences become U+FFFD, like a non-fatal text decoder. A sequence
/// that is merely cut off at the end of a chunk is held back until more bytes
/// arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with nothing pending
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, keeping any incomplete trailing sequence
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[bad..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is pending at end of input
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    /// Whether bytes of an incomplete sequence are held back
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// The decode buffer: decoded text not yet terminated by a separator
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line it completes, in order
    ///
    /// Returned lines have the separator removed, along with a single
    /// trailing `\r`. The final unterminated fragment stays buffered.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let Some(last_separator) = self.buffer.rfind(LINE_SEPARATOR) else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_separator + LINE_SEPARATOR.len_utf8());
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete[..last_separator]
            .split(LINE_SEPARATOR)
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// The unterminated fragment
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    /// Drop and return the unterminated fragment
    pub fn take_remainder(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}
