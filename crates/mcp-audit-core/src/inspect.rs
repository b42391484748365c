use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool exposed by the inspected MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema of the tool parameters.
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub server_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

/// One-shot snapshot of an MCP server's capabilities, as returned by the
/// inspection service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectionData {
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub resources: Vec<ResourceSchema>,
    #[serde(default)]
    pub prompts: Vec<PromptSchema>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub transport_type: String,
}

impl InspectionData {
    pub fn server_spec(&self) -> Option<&str> {
        self.server_info
            .as_ref()
            .and_then(|info| info.server_spec.as_deref())
            .filter(|spec| !spec.trim().is_empty())
    }

    /// Names of every tool, resource and prompt, in that order.
    pub fn capability_names(&self) -> impl Iterator<Item = &str> {
        self.tools
            .iter()
            .map(|tool| tool.name.as_str())
            .chain(self.resources.iter().map(|res| res.name.as_str()))
            .chain(self.prompts.iter().map(|prompt| prompt.name.as_str()))
    }
}

/// How the inspection service reaches an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Sse,
    Stdio,
}

impl TransportKind {
    /// URLs ending in `/sse` use SSE, other URLs plain HTTP, anything else is
    /// a local command spoken to over stdio.
    pub fn detect(server_spec: &str) -> Self {
        let spec = server_spec.trim();
        if spec.starts_with("http://") || spec.starts_with("https://") {
            if spec.ends_with("/sse") {
                Self::Sse
            } else {
                Self::Http
            }
        } else {
            Self::Stdio
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Stdio => "stdio",
        }
    }
}

/// What to inspect: a remote server URL or a local launch command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectTarget {
    Url(String),
    Command(String),
}

impl InspectTarget {
    pub fn from_spec(server_spec: impl Into<String>) -> Self {
        let spec = server_spec.into();
        match TransportKind::detect(&spec) {
            TransportKind::Stdio => Self::Command(spec),
            _ => Self::Url(spec),
        }
    }

    pub fn spec(&self) -> &str {
        match self {
            Self::Url(spec) | Self::Command(spec) => spec,
        }
    }

    pub fn transport(&self) -> TransportKind {
        TransportKind::detect(self.spec())
    }
}

const AUDIT_INSTRUCTIONS: &str = "Operate in Analysis Mode. Audit the MCP server snapshot below for security vulnerabilities using the SAFE-MCP framework. Record each vulnerability with its SAFE-MCP technique id, a clear cause and a severity (critical, high, medium or low), then generate the full report including a risk score out of 100.";

/// Build the audit prompt sent to the backend for an inspected server.
pub fn build_audit_prompt(inspection: &InspectionData) -> String {
    let snapshot = serde_json::to_string_pretty(inspection).unwrap_or_default();
    let target = inspection.server_spec().unwrap_or("unknown target");
    format!("{AUDIT_INSTRUCTIONS}\n\nTarget: {target}\n\n```json\n{snapshot}\n```")
}
