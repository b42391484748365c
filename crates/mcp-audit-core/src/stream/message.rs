use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::Frame;
use crate::error::DecodeError;
use crate::inspect::InspectionData;

static PULL_REQUEST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://github\.com/[\w.-]{1,100}/[\w.-]{1,100}/pull/\d{1,10}")
        .expect("pull request pattern is valid")
});

/// Terminal record of an audit stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSignal {
    pub is_error: bool,
    pub total_cost_usd: Option<f64>,
    /// Secondary link emitted with the result, e.g. a remediation pull request.
    pub link: Option<String>,
}

/// A classified stream record.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Plain text produced by the assistant; tool calls contribute nothing.
    AssistantText(String),
    /// Inspection snapshot streamed ahead of the audit (SSE framing).
    Inspection(InspectionData),
    /// Logical end of the stream.
    Result(ResultSignal),
    /// Any other record kind, including in-band `error`/`system`/`user` records.
    Unknown { kind: String },
}

impl Message {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

/// Decode one frame and tag it by kind.
///
/// Both wire vocabularies are understood: NDJSON `assistant`/`result` records
/// and SSE `inspect`/`audit`/`complete` envelopes.
pub fn classify(frame: &Frame) -> Result<Message, DecodeError> {
    let value: Value =
        serde_json::from_str(&frame.text).map_err(|err| DecodeError::InvalidJson {
            reason: err.to_string(),
        })?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    match kind {
        "assistant" => Ok(Message::AssistantText(
            value.get("content").map(collect_text).unwrap_or_default(),
        )),
        "audit" => Ok(Message::AssistantText(
            value
                .get("data")
                .or_else(|| value.get("content"))
                .map(collect_text)
                .unwrap_or_default(),
        )),
        "inspect" => {
            let data = value.get("data").cloned().unwrap_or(Value::Null);
            serde_json::from_value(data)
                .map(Message::Inspection)
                .map_err(|err| DecodeError::InvalidPayload {
                    kind: kind.to_string(),
                    reason: err.to_string(),
                })
        }
        "result" | "complete" => Ok(Message::Result(result_signal(&value))),
        other => Ok(Message::Unknown {
            kind: other.to_string(),
        }),
    }
}

/// Concatenate the plain-text parts of a content payload.
///
/// Accepts a bare string, an array of strings and/or `{"type":"text"}` items,
/// or an object wrapping either under `content` or `text`.
fn collect_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.as_str()),
                Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                    Some("text") | None => map.get("text").and_then(Value::as_str),
                    Some(_) => None,
                },
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .get("content")
            .or_else(|| map.get("text"))
            .map(collect_text)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn result_signal(value: &Value) -> ResultSignal {
    let payload = value.get("data").filter(|data| data.is_object()).unwrap_or(value);
    let link = ["pr_url", "link"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("result")
                .and_then(Value::as_str)
                .and_then(|text| PULL_REQUEST_URL.find(text))
                .map(|found| found.as_str().to_string())
        });

    ResultSignal {
        is_error: payload
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        total_cost_usd: payload.get("total_cost_usd").and_then(Value::as_f64),
        link,
    }
}
