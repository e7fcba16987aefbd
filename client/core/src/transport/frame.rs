//! Line Framing
//!
//! Splits a raw response body into newline-delimited text frames.
//!
//! # Frame Format
//!
//! ```text
//! +------------------------------+----+------------------------------+----+
//! | UTF-8 text (variable)        | \n | UTF-8 text (variable)        | \n | ...
//! +------------------------------+----+------------------------------+----+
//! ```
//!
//! Chunk boundaries from the network are arbitrary: a chunk may end in the
//! middle of a line, a JSON object, or a multi-byte character. The framer
//! buffers raw bytes and only decodes a line once its `\n` has arrived, so a
//! split character is always reassembled before decoding. A trailing `\r`
//! is stripped and empty lines are skipped.

use futures::stream::{self, Stream, StreamExt};

use super::{ByteStream, TransportError};

/// Minimum buffer capacity for the framer
const MIN_BUFFER_CAPACITY: usize = 4096;

/// One decoded text line from the byte stream
pub type StreamFrame = String;

/// Buffers incoming bytes and yields complete lines
#[derive(Debug)]
pub struct ByteStreamFramer {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for ByteStreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteStreamFramer {
    /// Create a new framer with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet emitted as a frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to take the next complete frame
    ///
    /// Returns `None` when no complete line is buffered. Empty lines are
    /// consumed and skipped.
    pub fn next_frame(&mut self) -> Option<StreamFrame> {
        loop {
            let rest = &self.buffer[self.read_pos..];
            let newline = rest.iter().position(|b| *b == b'\n')?;
            let line_end = self.read_pos + newline;
            let frame = decode_line(&self.buffer[self.read_pos..line_end]);
            self.read_pos = line_end + 1;

            if let Some(frame) = frame {
                return Some(frame);
            }
        }
    }

    /// Flush the carry-over buffer at end of input
    ///
    /// An incomplete trailing line is returned as a final frame; an empty
    /// remainder is discarded.
    pub fn finish(&mut self) -> Option<StreamFrame> {
        let frame = decode_line(&self.buffer[self.read_pos..]);
        self.clear();
        frame
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamFrame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}

/// Turn a byte stream into a lazy stream of frames
///
/// Frames are produced in arrival order. The returned stream owns the body,
/// so it cannot be restarted once consumed. A transport error is yielded
/// once and ends the stream; a partial trailing line at normal end of input
/// is flushed as the last frame.
pub fn frames(body: ByteStream) -> impl Stream<Item = Result<StreamFrame, TransportError>> {
    struct State {
        body: ByteStream,
        framer: ByteStreamFramer,
        done: bool,
    }

    let state = State {
        body,
        framer: ByteStreamFramer::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.framer.next_frame() {
                return Some((Ok(frame), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.framer.push(&chunk),
                Some(Err(e)) => {
                    state.done = true;
                    state.framer.clear();
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    return state.framer.finish().map(|frame| (Ok(frame), state));
                }
            }
        }
    })
}
