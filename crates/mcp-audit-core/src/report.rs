use std::fmt::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::{AuditText, CacheEntry, ReportCache};
use crate::error::CacheError;
use crate::extract::{Finding, FindingExtractor};
use crate::inspect::InspectionData;
use crate::score::{resolve_score, RiskBand};

const DEFAULT_RECOMMENDATIONS: [&str; 5] = [
    "Validate and sanitize every tool input against its declared input schema before execution.",
    "Review tool, resource and prompt descriptions for hidden or instruction-like content.",
    "Apply least privilege to the server process: restrict filesystem, network and credential access.",
    "Require explicit user confirmation for destructive or externally visible tool actions.",
    "Pin server versions and re-audit whenever tool definitions change.",
];

/// Final, immutable outcome of an audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub target: String,
    /// Safety score, 100 meaning nothing was found.
    pub score: u8,
    pub risk_band: RiskBand,
    /// Never empty; a clean audit carries one informational finding.
    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,
    /// Findings that name at least one capability of the inspected server.
    pub corroborations: usize,
}

/// Builds reports from audit transcripts and writes them back to the cache.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    extractor: FindingExtractor,
    recommendations: Vec<String>,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new(FindingExtractor::default())
    }
}

impl ReportAssembler {
    pub fn new(extractor: FindingExtractor) -> Self {
        Self {
            extractor,
            recommendations: DEFAULT_RECOMMENDATIONS
                .iter()
                .map(|rec| rec.to_string())
                .collect(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Derive the report wholesale from the full transcript.
    ///
    /// The score is resolved against the extracted findings before the clean
    /// inspection placeholder is substituted, so a clean audit scores 100.
    #[instrument(skip(self, inspection, text), fields(text_len = text.len()))]
    pub fn assemble(
        &self,
        target: &str,
        inspection: Option<&InspectionData>,
        text: &str,
    ) -> Report {
        let mut findings = self.extractor.extract(text);
        let score = resolve_score(text, &findings);
        if findings.is_empty() {
            findings.push(Finding::clean_inspection());
        }
        let corroborations = inspection
            .map(|data| count_corroborations(&findings, data))
            .unwrap_or(0);

        debug!(score, findings = findings.len(), corroborations, "report assembled");
        Report {
            target: target.to_string(),
            score,
            risk_band: RiskBand::from_score(score),
            findings,
            recommendations: self.recommendations.clone(),
            corroborations,
        }
    }

    /// Rebuild a report from a cached entry without contacting the backend.
    pub fn replay(&self, id: &str, entry: &CacheEntry) -> Report {
        let target = entry.inspect.server_spec().unwrap_or(id);
        self.assemble(target, Some(&entry.inspect), &entry.audit.joined())
    }

    /// Store `(inspection, text)` under `id` when both are present. Returns
    /// whether an entry was written.
    pub async fn persist<C>(
        &self,
        cache: &C,
        id: &str,
        inspection: Option<&InspectionData>,
        text: &str,
    ) -> Result<bool, CacheError>
    where
        C: ReportCache + ?Sized,
    {
        let Some(inspection) = inspection else {
            return Ok(false);
        };
        if text.is_empty() {
            return Ok(false);
        }
        let entry = CacheEntry {
            inspect: inspection.clone(),
            audit: AuditText::Text(text.to_string()),
        };
        cache.put(id, &entry).await?;
        Ok(true)
    }
}

fn count_corroborations(findings: &[Finding], inspection: &InspectionData) -> usize {
    let names: Vec<&str> = inspection
        .capability_names()
        .filter(|name| !name.trim().is_empty())
        .collect();
    findings
        .iter()
        .filter(|finding| names.iter().any(|name| finding.mentions(name)))
        .count()
}

/// Format styles supported by [`render_report`].
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

pub fn render_report(report: &Report, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_human(report: &Report) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Target: {}", report.target)?;
    writeln!(
        out,
        "Risk Score: {}/100 ({:?} risk)",
        report.score, report.risk_band
    )?;
    writeln!(out)?;

    writeln!(out, "Findings:")?;
    for finding in &report.findings {
        writeln!(
            out,
            "  - {id} [{severity}] {tag}: {description}",
            id = finding.id,
            severity = finding.severity.as_str(),
            tag = finding.tag,
            description = single_line(&finding.description),
        )?;
        if !finding.evidence.response.trim().is_empty() {
            writeln!(out, "    \"{}\"", single_line(&finding.evidence.response))?;
        }
    }
    if report.corroborations > 0 {
        writeln!(
            out,
            "\n{} finding(s) reference capabilities of the inspected server.",
            report.corroborations
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Recommendations:")?;
    for (idx, rec) in report.recommendations.iter().enumerate() {
        writeln!(out, "  {}. {}", idx + 1, rec)?;
    }

    Ok(out)
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}
