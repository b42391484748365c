use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{truncate, Evidence, Finding, Severity, FALLBACK_TAG, MAX_DESCRIPTION_CHARS};

const MAX_EVIDENCE_CHARS: usize = 160;

static TAG_IN_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][A-Z0-9]{1,15}(?:-[A-Z0-9]{1,15}){1,3}\b").expect("tag pattern is valid")
});

static DEFAULT_PATTERNS: Lazy<Vec<TextPattern>> = Lazy::new(|| {
    [
        // **SAFE-T1001: Tool Poisoning** - description
        (
            "bold_tagged",
            r"\*\*(?P<tag>[A-Z][A-Z0-9]{1,15}(?:-[A-Z0-9]{1,15}){1,3})(?:[ \t]*[:\-–][ \t]*(?P<name>[^*\n]{1,120}))?\*\*[ \t]*[:\-–]?[ \t]*(?P<desc>[^\n]{0,400})",
        ),
        // **Command Injection Vulnerability**: description
        (
            "bold_vulnerability_name",
            r"\*\*(?P<name>[A-Za-z][^*\n]{0,100}?(?:Vulnerability|Injection|Poisoning|Exposure|Escalation|Traversal|Leakage|Leak|Execution|Hijacking|Exfiltration))\*\*[ \t]*[:\-–]?[ \t]*(?P<desc>[^\n]{0,400})",
        ),
        // ### 1. Unrestricted file access\n description
        (
            "numbered_header",
            r"(?m)^#{2,4}[ \t]*\d{1,2}[.)][ \t]+(?P<name>[^\n]{1,120})\n+(?P<desc>[^\n#][^\n]{0,399})?",
        ),
        // SAFE-T1102 - description
        (
            "safe_technique_id",
            r"\b(?P<tag>SAFE-T\d{4}(?:\.\d{1,3})?)\b[ \t]*[:\-–]?[ \t]*(?P<desc>[^\n]{0,400})",
        ),
    ]
    .into_iter()
    .map(|(id, pattern)| TextPattern::new(id, pattern).expect("default pattern is valid"))
    .collect()
});

/// Built-in callout templates in precedence order.
pub fn default_patterns() -> &'static [TextPattern] {
    &DEFAULT_PATTERNS
}

/// Errors emitted while validating text pattern templates.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternError {
    #[error("pattern id must not be blank")]
    EmptyId,
    #[error("pattern `{id}` does not compile: {reason}")]
    InvalidRegex { id: String, reason: String },
    #[error("pattern `{id}` must define a `tag`, `name` or `desc` capture group")]
    MissingCaptures { id: String },
}

/// A regex template matching one inline callout format.
///
/// Capture groups: `tag` (identifier), `name` (short title) and `desc`
/// (free-text explanation). At least one must be present.
#[derive(Debug, Clone)]
pub struct TextPattern {
    id: String,
    regex: Regex,
}

impl TextPattern {
    pub fn new(id: impl Into<String>, pattern: &str) -> Result<Self, PatternError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PatternError::EmptyId);
        }
        let regex = Regex::new(pattern).map_err(|err| PatternError::InvalidRegex {
            id: id.clone(),
            reason: err.to_string(),
        })?;
        let has_capture = regex
            .capture_names()
            .flatten()
            .any(|name| matches!(name, "tag" | "name" | "desc"));
        if !has_capture {
            return Err(PatternError::MissingCaptures { id });
        }
        Ok(Self { id, regex })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Every match becomes a HIGH finding: free-form callouts do not state a
    /// severity that could be trusted.
    pub fn extract(&self, text: &str, limit: usize) -> Vec<Finding> {
        self.regex
            .captures_iter(text)
            .take(limit)
            .enumerate()
            .map(|(idx, caps)| self.finding_from(idx, &caps))
            .collect()
    }

    fn finding_from(&self, idx: usize, caps: &Captures<'_>) -> Finding {
        let group = |name: &str| {
            caps.name(name)
                .map(|m| clean_fragment(m.as_str()))
                .filter(|value| !value.is_empty())
        };
        let name = group("name");
        let tag = group("tag")
            .or_else(|| {
                name.as_deref()
                    .and_then(|name| TAG_IN_TEXT.find(name))
                    .map(|found| found.as_str().to_string())
            })
            .unwrap_or_else(|| FALLBACK_TAG.to_string());
        let title = name.clone().unwrap_or_else(|| tag.clone());
        let explanation = group("desc").unwrap_or_else(|| title.clone());
        let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();

        Finding {
            id: Finding::numbered_id(idx),
            tag,
            severity: Severity::High,
            description: truncate(&explanation, MAX_DESCRIPTION_CHARS),
            evidence: Evidence {
                request: title,
                response: truncate(matched.trim(), MAX_EVIDENCE_CHARS),
                explanation,
            },
        }
    }
}

/// Strip markdown emphasis and separator punctuation around a captured fragment.
fn clean_fragment(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | ':' | '-' | '–'))
        .to_string()
}
