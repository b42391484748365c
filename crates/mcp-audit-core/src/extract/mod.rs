use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

pub mod patterns;
pub mod structured;

pub use patterns::{default_patterns, PatternError, TextPattern};
pub use structured::StructuredStrategy;

/// Tag used when a vulnerability name carries no recognizable identifier.
pub const FALLBACK_TAG: &str = "AUDIT";
/// Upper bound on findings produced by the text-pattern fallback.
pub const MAX_PATTERN_MATCHES: usize = 10;
/// Descriptions longer than this many characters are clipped with an ellipsis.
pub const MAX_DESCRIPTION_CHARS: usize = 240;

/// Closed severity scale of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Med,
    Low,
}

impl Severity {
    /// Map the reporting vocabulary onto the closed scale.
    /// Anything that is not critical, high or medium counts as low.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "high" => Self::High,
            "medium" => Self::Med,
            _ => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Med => "MED",
            Self::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub request: String,
    pub response: String,
    pub explanation: String,
}

/// A normalized vulnerability record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub tag: String,
    pub severity: Severity,
    pub description: String,
    pub evidence: Evidence,
}

impl Finding {
    /// Informational finding reported when the audit output names no vulnerability.
    pub fn clean_inspection() -> Self {
        Self {
            id: "INFO-001".into(),
            tag: FALLBACK_TAG.into(),
            severity: Severity::Low,
            description: "Inspection completed: no vulnerabilities were identified in the audit output."
                .into(),
            evidence: Evidence {
                request: "MCP server inspection".into(),
                response: "No findings reported".into(),
                explanation: "The audit transcript contained neither a structured vulnerability report nor recognizable vulnerability callouts."
                    .into(),
            },
        }
    }

    pub(crate) fn numbered_id(index: usize) -> String {
        format!("VULN-{:03}", index + 1)
    }

    /// Whether the finding text names `needle`, ignoring ASCII case.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return false;
        }
        [
            &self.description,
            &self.evidence.request,
            &self.evidence.response,
            &self.evidence.explanation,
        ]
        .iter()
        .any(|field| field.to_ascii_lowercase().contains(&needle))
    }
}

/// One step of the extraction precedence chain.
#[derive(Debug, Clone)]
pub enum ExtractionStrategy {
    /// Embedded JSON report array.
    Structured(StructuredStrategy),
    /// Ordered regex templates; the first template with a match wins.
    TextPatterns(Vec<TextPattern>),
}

impl ExtractionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::TextPatterns(_) => "text_patterns",
        }
    }

    fn extract(&self, text: &str) -> Vec<Finding> {
        match self {
            Self::Structured(strategy) => strategy.extract(text),
            Self::TextPatterns(patterns) => {
                for pattern in patterns {
                    let findings = pattern.extract(text, MAX_PATTERN_MATCHES);
                    if !findings.is_empty() {
                        trace!(pattern = pattern.id(), count = findings.len(), "pattern matched");
                        return findings;
                    }
                }
                Vec::new()
            }
        }
    }
}

/// Turns accumulated audit text into an ordered finding list.
///
/// Strategies run in order and the first non-empty result wins. The result is
/// a pure function of the text, so re-running on the same input yields the same
/// list. An empty list means nothing matched; callers decide how to report that.
#[derive(Debug, Clone)]
pub struct FindingExtractor {
    strategies: Vec<ExtractionStrategy>,
}

impl Default for FindingExtractor {
    fn default() -> Self {
        Self::new(vec![
            ExtractionStrategy::Structured(StructuredStrategy::default()),
            ExtractionStrategy::TextPatterns(default_patterns().to_vec()),
        ])
    }
}

impl FindingExtractor {
    pub fn new(strategies: Vec<ExtractionStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[ExtractionStrategy] {
        &self.strategies
    }

    #[instrument(name = "extract_findings", skip(self, text), fields(text_len = text.len()))]
    pub fn extract(&self, text: &str) -> Vec<Finding> {
        for strategy in &self.strategies {
            let findings = strategy.extract(text);
            if !findings.is_empty() {
                debug!(strategy = strategy.name(), findings = findings.len(), "extraction succeeded");
                return findings;
            }
        }
        debug!("no extraction strategy matched");
        Vec::new()
    }
}

static DEFAULT_EXTRACTOR: Lazy<FindingExtractor> = Lazy::new(FindingExtractor::default);

/// Extract findings with the default strategy chain.
pub fn extract_findings(text: &str) -> Vec<Finding> {
    DEFAULT_EXTRACTOR.extract(text)
}

/// Clip `input` to `max_chars` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}
