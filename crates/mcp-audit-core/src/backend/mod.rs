mod http;
mod settings;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::TransportError;
use crate::inspect::{build_audit_prompt, InspectTarget, InspectionData};

pub use http::{HttpAuditBackend, HttpInspectionClient};
pub use settings::AuditSettings;

/// Raw chunks of an audit response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// One audit run as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRequest {
    /// Display name of the audited server, used when the inspection has none.
    #[serde(skip)]
    pub target: String,
    pub prompt: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Inspection the prompt was built from; persisted with the transcript.
    #[serde(skip)]
    pub inspection: Option<InspectionData>,
}

impl AuditRequest {
    /// Audit request for an inspected server, embedding the snapshot in the prompt.
    pub fn for_inspection(inspection: InspectionData, user_id: impl Into<String>) -> Self {
        let target = inspection
            .server_spec()
            .unwrap_or("unknown target")
            .to_string();
        Self {
            target,
            prompt: build_audit_prompt(&inspection),
            user_id: user_id.into(),
            session_id: None,
            inspection: Some(inspection),
        }
    }

    /// Like [`for_inspection`](Self::for_inspection), attributed to the
    /// configured user.
    pub fn from_settings(settings: &AuditSettings, inspection: InspectionData) -> Self {
        Self::for_inspection(inspection, settings.user_id.clone())
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Source of audit byte streams.
#[async_trait]
pub trait AuditTransport: Send + Sync {
    /// Start the audit and return its response body as a chunk stream.
    async fn open(&self, request: &AuditRequest) -> Result<ByteStream, TransportError>;
}

/// One-shot capability discovery for an MCP server.
#[async_trait]
pub trait InspectionSource: Send + Sync {
    async fn inspect(&self, target: &InspectTarget) -> Result<InspectionData, TransportError>;
}
