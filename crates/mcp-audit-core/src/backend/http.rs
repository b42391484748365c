use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use super::{AuditRequest, AuditSettings, AuditTransport, ByteStream, InspectionSource};
use crate::error::TransportError;
use crate::inspect::{InspectTarget, InspectionData};

const USER_AGENT: &str = "mcp-audit/0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
/// Headroom on top of the inspection timeout the service enforces itself.
const INSPECT_GRACE: Duration = Duration::from_secs(5);

/// Streams audits from `POST {base}/api/v1/claude/query`.
#[derive(Debug, Clone)]
pub struct HttpAuditBackend {
    http: Client,
    url: String,
    max_retries: u32,
}

impl HttpAuditBackend {
    pub fn new(settings: &AuditSettings) -> Result<Self> {
        // No overall request timeout: audits stream for minutes. Idle reads
        // are bounded by the session's read timeout instead.
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build audit backend HTTP client")?;
        Ok(Self {
            http,
            url: endpoint(&settings.base_url, "/api/v1/claude/query"),
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl AuditTransport for HttpAuditBackend {
    #[instrument(skip(self, request), fields(url = %self.url, target = %request.target))]
    async fn open(&self, request: &AuditRequest) -> Result<ByteStream, TransportError> {
        let response = send_with_retry(self.max_retries, || {
            self.http.post(&self.url).json(request)
        })
        .await?;
        debug!(status = %response.status(), "audit stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed())
    }
}

/// Inspects MCP servers through `POST {base}/api/v1/mcp/inspect`.
#[derive(Debug, Clone)]
pub struct HttpInspectionClient {
    http: Client,
    url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl HttpInspectionClient {
    pub fn new(settings: &AuditSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(settings.inspect_timeout_secs) + INSPECT_GRACE)
            .build()
            .context("failed to build inspection HTTP client")?;
        Ok(Self {
            http,
            url: endpoint(&settings.base_url, "/api/v1/mcp/inspect"),
            timeout_secs: settings.inspect_timeout_secs,
            max_retries: settings.max_retries,
        })
    }
}

#[derive(Serialize)]
struct InspectBody<'a> {
    #[serde(flatten)]
    target: &'a InspectTarget,
    timeout: u64,
}

#[async_trait]
impl InspectionSource for HttpInspectionClient {
    #[instrument(skip(self), fields(transport = target.transport().as_str()))]
    async fn inspect(&self, target: &InspectTarget) -> Result<InspectionData, TransportError> {
        let body = InspectBody {
            target,
            timeout: self.timeout_secs,
        };
        let response =
            send_with_retry(self.max_retries, || self.http.post(&self.url).json(&body)).await?;

        let mut data: InspectionData =
            response
                .json()
                .await
                .map_err(|err| TransportError::InvalidResponse {
                    service: "inspection service",
                    reason: err.to_string(),
                })?;
        if data.transport_type.is_empty() {
            data.transport_type = target.transport().as_str().to_string();
        }
        debug!(
            tools = data.tools.len(),
            resources = data.resources.len(),
            prompts = data.prompts.len(),
            "inspection completed"
        );
        Ok(data)
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim().trim_end_matches('/'), path)
}

/// Send a request, retrying connection failures and non-success statuses with
/// exponential backoff.
async fn send_with_retry<F>(max_retries: u32, build: F) -> Result<Response, TransportError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let failure = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => status_error(response).await,
            Err(err) => TransportError::from(err),
        };
        if attempt >= max_retries {
            return Err(failure);
        }
        warn!(attempt, error = %failure, "request failed, retrying");
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

async fn status_error(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => text,
    };
    TransportError::Status { status, body }
}
