use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod frame;
pub mod message;

pub use frame::FrameReader;
pub use message::{classify, Message, ResultSignal};

/// How the audit backend delimits records on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Server-Sent Events: only `data:` lines carry payloads.
    Sse,
    /// Newline-delimited JSON: every non-blank line is a record.
    #[default]
    Ndjson,
}

impl FromStr for FramingMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sse" | "event-stream" => Ok(Self::Sse),
            "ndjson" | "jsonl" | "lines" => Ok(Self::Ndjson),
            other => Err(format!(
                "unknown framing mode `{other}` (expected `sse` or `ndjson`)"
            )),
        }
    }
}

/// Origin of a frame's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    DataLine,
    NdjsonLine,
}

/// One reassembled logical record extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub text: String,
}

/// Counters for input that was dropped without failing the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Chunks rejected because they were not valid UTF-8.
    pub skipped_chunks: usize,
    /// Frames that failed JSON decoding or had an unusable payload.
    pub discarded_frames: usize,
    /// Well-formed messages of a kind the pipeline does not consume.
    pub ignored_messages: usize,
}

impl StreamStats {
    pub fn decode_errors(&self) -> usize {
        self.skipped_chunks + self.discarded_frames
    }
}
