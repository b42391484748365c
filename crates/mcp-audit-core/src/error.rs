use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the network transport. These are the only errors that move a
/// session into the `Failed` state; re-running the audit is the recovery path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("audit backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("audit backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("audit stream interrupted: {0}")]
    Stream(String),
    #[error("no data received from the audit backend within {0:?}")]
    Timeout(Duration),
    #[error("invalid response from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

/// Malformed input recovered locally: the offending chunk or frame is skipped
/// and counted, the session keeps streaming.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum DecodeError {
    #[error("chunk of {len} bytes is not valid UTF-8 (invalid sequence at byte {offset})")]
    InvalidEncoding { len: usize, offset: usize },
    #[error("frame is not valid JSON: {reason}")]
    InvalidJson { reason: String },
    #[error("frame JSON has no string `type` discriminant")]
    MissingType,
    #[error("`{kind}` payload has unexpected shape: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// Errors raised by report cache backends. A missing entry is not an error;
/// lookups return `Ok(None)` for that case.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache key `{0}` is not a valid report id")]
    InvalidKey(String),
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Terminal failure of an audit session.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("aborting audit after {count} undecodable chunks or frames")]
    DecodeBudgetExceeded { count: usize },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_errors_serialize_with_error_tag() {
        let cases = vec![
            DecodeError::InvalidEncoding { len: 4, offset: 1 },
            DecodeError::InvalidJson {
                reason: "expected value".into(),
            },
            DecodeError::MissingType,
            DecodeError::InvalidPayload {
                kind: "audit".into(),
                reason: "expected string or array".into(),
            },
        ];
        for err in cases {
            let value = serde_json::to_value(&err).unwrap();
            assert!(value.get("error").is_some(), "untagged: {value}");
            let back: DecodeError = serde_json::from_value(value).unwrap();
            assert_eq!(back, err);
        }
    }

    #[test]
    fn payload_error_keeps_message_kind() {
        let err = DecodeError::InvalidPayload {
            kind: "inspect".into(),
            reason: "missing tools".into(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"error": "invalid_payload", "kind": "inspect", "reason": "missing tools"})
        );
    }
}
