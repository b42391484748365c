use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::{truncate, Evidence, Finding, Severity, FALLBACK_TAG, MAX_DESCRIPTION_CHARS};

const DEFAULT_KEY: &str = "vulnerabilities";
const DEFAULT_MAX_ARRAY_BYTES: usize = 256 * 1024;
const UNKNOWN_NAME: &str = "Unknown Vulnerability";
const UNKNOWN_CAUSE: &str = "No description available";

/// Extracts findings from a JSON array embedded in the audit text under a
/// fixed key, e.g. the raw-data block of a generated vulnerability report.
#[derive(Debug, Clone)]
pub struct StructuredStrategy {
    key: String,
    max_array_bytes: usize,
}

impl Default for StructuredStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_KEY, DEFAULT_MAX_ARRAY_BYTES)
    }
}

impl StructuredStrategy {
    pub fn new(key: impl Into<String>, max_array_bytes: usize) -> Self {
        Self {
            key: key.into(),
            max_array_bytes,
        }
    }

    /// Parse the last embedded array; any malformation yields an empty list
    /// so the next strategy gets its turn.
    pub fn extract(&self, text: &str) -> Vec<Finding> {
        let Some(raw) = self.locate_array(text) else {
            return Vec::new();
        };
        let entries = match parse_lenient(raw) {
            Some(entries) => entries,
            None => {
                debug!(len = raw.len(), "embedded report array is not valid JSON");
                return Vec::new();
            }
        };
        entries
            .iter()
            .filter_map(Value::as_object)
            .enumerate()
            .map(|(idx, entry)| finding_from_entry(idx, entry))
            .collect()
    }

    /// Find `"<key>": [ ... ]` and return the bracket-balanced array text.
    /// Later occurrences win because a streamed transcript ends with the
    /// final report. All candidates share one `max_array_bytes` scan budget,
    /// so repeated unterminated keys cost no more than a single long array.
    fn locate_array<'t>(&self, text: &'t str) -> Option<&'t str> {
        let quoted = format!("\"{}\"", self.key);
        let mut budget = self.max_array_bytes;
        for (key_pos, _) in text.rmatch_indices(&quoted) {
            if budget == 0 {
                debug!("scan budget exhausted before a balanced report array was found");
                return None;
            }
            let after_key = &text[key_pos + quoted.len()..];
            let rest = after_key.trim_start();
            let Some(rest) = rest.strip_prefix(':') else {
                continue;
            };
            let rest = rest.trim_start();
            if !rest.starts_with('[') {
                continue;
            }
            match balanced_len(rest, budget) {
                Ok(len) => {
                    trace!(offset = key_pos, len, "located embedded report array");
                    return Some(&rest[..len]);
                }
                Err(scanned) => budget = budget.saturating_sub(scanned),
            }
        }
        None
    }
}

/// Length in bytes of the bracketed value at the start of `text`, honoring
/// JSON string escapes. Gives up after `limit` bytes; the error carries the
/// number of bytes inspected.
fn balanced_len(text: &str, limit: usize) -> Result<usize, usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, byte) in text.bytes().enumerate() {
        if idx >= limit {
            return Err(idx);
        }
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1).ok_or(idx + 1)?;
                if depth == 0 {
                    return Ok(idx + 1);
                }
            }
            _ => {}
        }
    }
    Err(text.len())
}

/// Strict JSON first, then JSON5 for the trailing commas and single quotes
/// models like to emit.
fn parse_lenient(raw: &str) -> Option<Vec<Value>> {
    serde_json::from_str::<Vec<Value>>(raw)
        .ok()
        .or_else(|| json5::from_str::<Vec<Value>>(raw).ok())
}

fn finding_from_entry(idx: usize, entry: &Map<String, Value>) -> Finding {
    let name = text_field(entry, &["name", "title"]).unwrap_or(UNKNOWN_NAME);
    let cause = text_field(entry, &["cause", "description"]).unwrap_or(UNKNOWN_CAUSE);
    let label = text_field(entry, &["type", "severity"]);

    Finding {
        id: Finding::numbered_id(idx),
        tag: tag_from_name(name),
        severity: label.map(Severity::from_label).unwrap_or(Severity::Low),
        description: truncate(cause, MAX_DESCRIPTION_CHARS),
        evidence: Evidence {
            request: name.to_string(),
            response: format!("reported severity: {}", label.unwrap_or("unspecified")),
            explanation: cause.to_string(),
        },
    }
}

fn text_field<'a>(entry: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// `"SAFE-T1001: Tool Poisoning"` → `"SAFE-T1001"`; names without a
/// delimiter get the fallback tag.
fn tag_from_name(name: &str) -> String {
    match name.split_once(':') {
        Some((head, _)) if !head.trim().is_empty() => head.trim().to_string(),
        _ => FALLBACK_TAG.to_string(),
    }
}
