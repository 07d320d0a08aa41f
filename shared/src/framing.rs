//! NUL-delimited message framing over a byte stream.
//!
//! Every message is written as its text followed by a single `0` byte. The
//! receiving side feeds whatever the socket returned into a [`FrameBuffer`]
//! and pulls complete messages out of it, so messages that arrive split or
//! coalesced are handled the same way.

use crate::MAX_RX_SIZE;
use thiserror::Error;

pub const FRAME_TERMINATOR: u8 = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Accumulates received bytes and yields complete frames in arrival order.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    limit: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_RX_SIZE)
    }

    /// Creates a buffer that rejects frames longer than `limit` bytes,
    /// terminator included.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete frame, if one has arrived.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        match self.pending.iter().position(|&b| b == FRAME_TERMINATOR) {
            Some(end) if end + 1 > self.limit => Err(FrameError::Oversized { limit: self.limit }),
            Some(end) => {
                let mut frame: Vec<u8> = self.pending.drain(..=end).collect();
                frame.pop();
                String::from_utf8(frame)
                    .map(Some)
                    .map_err(|_| FrameError::InvalidUtf8)
            }
            None if self.pending.len() >= self.limit => {
                Err(FrameError::Oversized { limit: self.limit })
            }
            None => Ok(None),
        }
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a message as a single frame.
pub fn encode_frame(message: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + 1);
    frame.extend_from_slice(message.as_bytes());
    frame.push(FRAME_TERMINATOR);
    frame
}
