use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::extract::{Finding, Severity};

/// Explicit `<n>/100` score phrases, most specific first.
static SCORE_TEMPLATES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)risk\s{0,3}score\**[ \t]{0,3}[:=]?[ \t]{0,3}\**[ \t]{0,3}(\d{1,3})[ \t]{0,3}/[ \t]{0,3}100\b",
        r"(?i)(?:security\s{0,3})?score\**[ \t]{0,3}[:=]?[ \t]{0,3}\**[ \t]{0,3}(\d{1,3})[ \t]{0,3}/[ \t]{0,3}100\b",
        r"\b(\d{1,3})[ \t]{0,3}/[ \t]{0,3}100\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("score template is valid"))
    .collect()
});

/// Safety score when at least one HIGH finding exists: `max(10, 50 - 10 * high)`.
const HIGH_CEILING: i64 = 50;
const HIGH_STEP: i64 = 10;
const HIGH_FLOOR: i64 = 10;
/// `max(20, 100 - 25 * med)`.
const MED_STEP: i64 = 25;
const MED_FLOOR: i64 = 20;
/// `max(60, 100 - 15 * low)`.
const LOW_STEP: i64 = 15;
const LOW_FLOOR: i64 = 60;

/// Resolve the report score: an explicit in-text score wins, otherwise the
/// severity-count formula applies. Always within `0..=100`.
pub fn resolve_score(text: &str, findings: &[Finding]) -> u8 {
    explicit_score(text).unwrap_or_else(|| severity_score(findings))
}

/// First in-range `<n>/100` phrase, trying templates in order.
pub fn explicit_score(text: &str) -> Option<u8> {
    for template in SCORE_TEMPLATES.iter() {
        for caps in template.captures_iter(text) {
            let value = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u16>().ok())
                .filter(|value| *value <= 100);
            if let Some(value) = value {
                trace!(score = value, "explicit score found");
                return Some(value as u8);
            }
        }
    }
    None
}

/// Deterministic score from severity counts; the worst severity present
/// decides which formula applies.
pub fn severity_score(findings: &[Finding]) -> u8 {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count() as i64;
    let (high, med, low) = (count(Severity::High), count(Severity::Med), count(Severity::Low));

    let score = if high > 0 {
        (HIGH_CEILING - HIGH_STEP * high).max(HIGH_FLOOR)
    } else if med > 0 {
        (100 - MED_STEP * med).max(MED_FLOOR)
    } else if low > 0 {
        (100 - LOW_STEP * low).max(LOW_FLOOR)
    } else {
        100
    };
    score.clamp(0, 100) as u8
}

/// Thresholds that map the 0–100 safety score into qualitative risk bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Scores at or above this are low risk.
    pub low: u8,
    /// Scores at or above this (and below `low`) are medium risk.
    pub medium: u8,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low: 80, medium: 50 }
    }
}

/// Classification buckets for the overall risk of an audited server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    /// Map a score (100 = no risk) into a risk band.
    pub fn from_score(score: u8) -> Self {
        Self::from_score_with_thresholds(score, &RiskThresholds::default())
    }

    pub fn from_score_with_thresholds(score: u8, thresholds: &RiskThresholds) -> Self {
        if score >= thresholds.low {
            Self::Low
        } else if score >= thresholds.medium {
            Self::Medium
        } else {
            Self::High
        }
    }
}
