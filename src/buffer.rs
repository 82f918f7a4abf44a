//! Byte accumulator between socket reads and the frame parser.

use crate::constants::MAX_BUFFER_SIZE;
use crate::error::{SwitchError, SwitchResult};

/// Growable read buffer with a consumed-prefix cursor.
///
/// The reader task appends raw socket bytes; the parser extracts either
/// everything up to a terminator pattern or an exact byte count. Consumed
/// bytes are reclaimed by [`compact`](Self::compact).
#[derive(Debug, Default)]
pub(crate) struct StreamBuffer {
    data: Vec<u8>,
    consumed: usize,
}

impl StreamBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes from the socket.
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed.
    pub(crate) fn len(&self) -> usize {
        self.data
            .len()
            - self.consumed
    }

    /// Fail if the buffer has grown past the safety cap. A well-behaved peer
    /// never gets close; hitting this means protocol desync or a runaway
    /// sender.
    pub(crate) fn check_size_limits(&self) -> SwitchResult<()> {
        if self
            .data
            .len()
            > MAX_BUFFER_SIZE
        {
            return Err(SwitchError::MalformedBody {
                reason: format!(
                    "read buffer exceeded {} bytes, closing connection",
                    MAX_BUFFER_SIZE
                ),
            });
        }
        Ok(())
    }

    fn pending(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    /// Extract and consume all bytes before `pattern`, consuming the pattern
    /// too. Returns `None` when the pattern has not arrived yet.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let pending = self.pending();
        let pos = pending
            .windows(pattern.len())
            .position(|w| w == pattern)?;
        let out = pending[..pos].to_vec();
        self.consumed += pos + pattern.len();
        Some(out)
    }

    /// Extract and consume exactly `count` bytes, or `None` if fewer are
    /// buffered.
    pub(crate) fn extract_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.len() < count {
            return None;
        }
        let out = self.pending()[..count].to_vec();
        self.consumed += count;
        Some(out)
    }

    /// Drop the consumed prefix so the allocation can be reused.
    pub(crate) fn compact(&mut self) {
        if self.consumed > 0 {
            self.data
                .drain(..self.consumed);
            self.consumed = 0;
        }
    }
}
