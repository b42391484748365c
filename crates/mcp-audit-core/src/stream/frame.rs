use super::{Frame, FrameKind, FramingMode};
use crate::error::DecodeError;

const SSE_DATA_PREFIX: &str = "data:";

/// Incremental reassembly of byte chunks into newline-delimited frames.
///
/// Bytes are decoded as UTF-8 as they arrive. A multi-byte character split
/// across two chunks is carried over rather than rejected, so the emitted frame
/// sequence does not depend on where the transport cut the stream.
#[derive(Debug)]
pub struct FrameReader {
    mode: FramingMode,
    /// Trailing bytes of an incomplete UTF-8 sequence (at most 3).
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    buffer: String,
}

impl FrameReader {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            pending: Vec::new(),
            buffer: String::new(),
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Feed one chunk and return every frame completed by it, in order.
    ///
    /// A chunk containing an invalid UTF-8 sequence is dropped as a whole and
    /// reported as [`DecodeError::InvalidEncoding`]; the reader stays usable.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, DecodeError> {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        match std::str::from_utf8(&bytes) {
            Ok(text) => self.buffer.push_str(text),
            Err(err) if err.error_len().is_none() => {
                let (valid, tail) = bytes.split_at(err.valid_up_to());
                if let Ok(prefix) = std::str::from_utf8(valid) {
                    self.buffer.push_str(prefix);
                }
                self.pending = tail.to_vec();
            }
            Err(err) => {
                return Err(DecodeError::InvalidEncoding {
                    len: chunk.len(),
                    offset: err.valid_up_to(),
                });
            }
        }

        Ok(self.drain_complete_lines())
    }

    /// Flush the unterminated tail once the transport reports end of stream.
    pub fn finish(&mut self) -> Result<Option<Frame>, DecodeError> {
        let tail = std::mem::take(&mut self.buffer);
        if !self.pending.is_empty() {
            let len = std::mem::take(&mut self.pending).len();
            return Err(DecodeError::InvalidEncoding {
                len,
                offset: tail.len(),
            });
        }
        Ok(self.frame_for(tail.trim_end_matches('\r')))
    }

    fn drain_complete_lines(&mut self) -> Vec<Frame> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);
        complete
            .lines()
            .filter_map(|line| self.frame_for(line))
            .collect()
    }

    fn frame_for(&self, line: &str) -> Option<Frame> {
        match self.mode {
            FramingMode::Sse => {
                let payload = line.strip_prefix(SSE_DATA_PREFIX)?;
                let payload = payload.strip_prefix(' ').unwrap_or(payload);
                if payload.trim().is_empty() {
                    return None;
                }
                Some(Frame {
                    kind: FrameKind::DataLine,
                    text: payload.to_string(),
                })
            }
            FramingMode::Ndjson => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(Frame {
                    kind: FrameKind::NdjsonLine,
                    text: trimmed.to_string(),
                })
            }
        }
    }
}
