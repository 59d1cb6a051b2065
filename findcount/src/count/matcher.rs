use std::collections::VecDeque;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::trace;

use crate::config::EncodingMode;

const BUFFER_CAPACITY: usize = 65536;

/// A read failure part way through a stream, with the matches counted so far
#[derive(Debug, Error)]
#[error("{source} (after {partial} matches)")]
pub struct MatchError {
    pub partial: usize,
    pub source: io::Error,
}

/// Counts occurrences of a fixed substring, overlapping matches included.
///
/// Text is compared character by character (Unicode scalar values), so a
/// multi-byte substring such as `"Го"` matches correctly even when a read
/// boundary splits one of its characters.
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    pattern: Vec<char>,
    encoding_mode: EncodingMode,
}

impl SubstringMatcher {
    /// Creates a matcher that decodes invalid UTF-8 lossily
    pub fn new(substring: &str) -> Self {
        Self::with_encoding(substring, EncodingMode::Lossy)
    }

    pub fn with_encoding(substring: &str, encoding_mode: EncodingMode) -> Self {
        Self {
            pattern: substring.chars().collect(),
            encoding_mode,
        }
    }

    /// An empty substring never matches and never reads its input
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Counts matches in an in-memory string
    pub fn count_str(&self, text: &str) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut window = Window::new(&self.pattern);
        text.chars().for_each(|c| window.push(c));
        window.count
    }

    /// Counts matches in a byte stream, reading it to the end.
    ///
    /// End of stream is a normal finish. Any other read failure (including
    /// invalid UTF-8 under [`EncodingMode::FailFast`]) stops the pass and is
    /// returned together with the partial count.
    pub async fn count<R>(&self, reader: R) -> Result<usize, MatchError>
    where
        R: AsyncRead + Unpin,
    {
        if self.is_empty() {
            return Ok(0);
        }

        let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, reader);
        let mut window = Window::new(&self.pattern);
        let mut decoder = Utf8Decoder::new(self.encoding_mode);

        loop {
            let chunk = match reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(source) => {
                    return Err(MatchError {
                        partial: window.count,
                        source,
                    })
                }
            };
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();
            if let Err(source) = decoder.feed(chunk, &mut window) {
                return Err(MatchError {
                    partial: window.count,
                    source,
                });
            }
            reader.consume(len);
        }

        decoder.finish(&mut window).map_err(|source| MatchError {
            partial: window.count,
            source,
        })?;

        trace!("Stream finished with {} matches", window.count);
        Ok(window.count)
    }
}

/// Sliding window of the last `pattern.len()` characters
struct Window<'p> {
    pattern: &'p [char],
    buf: VecDeque<char>,
    count: usize,
}

impl<'p> Window<'p> {
    fn new(pattern: &'p [char]) -> Self {
        Self {
            pattern,
            buf: VecDeque::with_capacity(pattern.len()),
            count: 0,
        }
    }

    fn push(&mut self, c: char) {
        if self.buf.len() == self.pattern.len() {
            self.buf.pop_front();
        }
        self.buf.push_back(c);
        if self.buf.len() == self.pattern.len() && self.buf.iter().eq(self.pattern.iter()) {
            self.count += 1;
        }
    }
}

/// Incremental UTF-8 decoding across read boundaries
struct Utf8Decoder {
    pending: Vec<u8>,
    mode: EncodingMode,
}

impl Utf8Decoder {
    fn new(mode: EncodingMode) -> Self {
        Self {
            pending: Vec::with_capacity(4),
            mode,
        }
    }

    fn feed(&mut self, chunk: &[u8], window: &mut Window<'_>) -> io::Result<()> {
        if self.pending.is_empty() {
            return self.decode(chunk, window);
        }
        // A character was split by the previous read
        let mut joined = std::mem::take(&mut self.pending);
        joined.extend_from_slice(chunk);
        self.decode(&joined, window)
    }

    fn decode(&mut self, mut bytes: &[u8], window: &mut Window<'_>) -> io::Result<()> {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    text.chars().for_each(|c| window.push(c));
                    return Ok(());
                }
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        text.chars().for_each(|c| window.push(c));
                    }
                    match e.error_len() {
                        // Incomplete sequence at the end, wait for more bytes
                        None => {
                            self.pending.extend_from_slice(rest);
                            return Ok(());
                        }
                        Some(len) => {
                            self.invalid_sequence(window)?;
                            bytes = &rest[len..];
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self, window: &mut Window<'_>) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.clear();
        self.invalid_sequence(window)
    }

    fn invalid_sequence(&self, window: &mut Window<'_>) -> io::Result<()> {
        match self.mode {
            EncodingMode::FailFast => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "stream did not contain valid UTF-8",
            )),
            EncodingMode::Lossy => {
                window.push(char::REPLACEMENT_CHARACTER);
                Ok(())
            }
        }
    }
}
