use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::backend::{AuditRequest, AuditSettings, AuditTransport, ByteStream};
use crate::cache::ReportCache;
use crate::error::{AuditError, DecodeError, TransportError};
use crate::inspect::InspectionData;
use crate::report::{Report, ReportAssembler};
use crate::stream::{classify, Frame, FrameReader, FramingMode, Message, StreamStats};

/// Progress gained per assistant message.
const PROGRESS_STEP: u8 = 10;
/// Progress ceiling until a terminal message arrives.
const PROGRESS_CAP: u8 = 90;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Streaming,
    Complete,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

/// Observable state of one audit run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    /// 0–100; never decreases while streaming.
    pub progress: u8,
    pub accumulated_text: String,
    pub cache_key: String,
    pub stats: StreamStats,
    /// Secondary link carried by the result message.
    pub link: Option<String>,
    pub total_cost_usd: Option<f64>,
    pub failure: Option<String>,
    /// Set when the report was rebuilt from the cache.
    pub replayed: bool,
    pub report: Option<Report>,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            cache_key: id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub framing: FramingMode,
    /// Longest wait for the next chunk. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Undecodable chunks/frames tolerated before failing. `None` is unlimited.
    pub max_decode_errors: Option<usize>,
}

impl SessionOptions {
    pub fn from_settings(settings: &AuditSettings) -> Self {
        Self {
            framing: settings.framing,
            read_timeout: settings.read_timeout,
            max_decode_errors: settings.max_decode_errors,
        }
    }
}

static SHARED_REGISTRY: Lazy<InFlightRegistry> = Lazy::new(InFlightRegistry::new);

/// Session ids with a backend request in flight, shared by every session
/// that must not overlap with another for the same id.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    /// An isolated registry, independent of [`shared`](Self::shared).
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry every [`AuditSession`] joins by default.
    pub fn shared() -> Self {
        SHARED_REGISTRY.clone()
    }

    /// Claim `id`; `None` while another holder is active.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightGuard> {
        if !lock(&self.ids).insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            ids: Arc::clone(&self.ids),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.ids).contains(id)
    }
}

/// Releases its id when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.id);
    }
}

fn lock(ids: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq)]
pub enum MountOutcome {
    /// A cached audit existed; the session is complete without a backend call.
    Replayed(Report),
    /// Nothing cached for this id.
    NoData,
    /// The session had already left `Idle`.
    AlreadyStarted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(Report),
    Cancelled,
    /// The session was not idle or another run for the id is in flight.
    Ignored,
}

enum RunEnd {
    Finished(Option<InspectionData>),
    Cancelled,
}

struct RunState {
    reader: FrameReader,
    inspection: Option<InspectionData>,
    stats: StreamStats,
}

/// Drives one audit run from request to report.
///
/// State transitions: `Idle -> Streaming -> {Complete, Failed, Cancelled}`,
/// or `Idle -> Complete` when [`mount`](Self::mount) finds a cached audit.
/// Terminal states are final; re-running an audit takes a new session.
pub struct AuditSession<T: ?Sized, C: ?Sized> {
    id: String,
    transport: Arc<T>,
    cache: Arc<C>,
    assembler: ReportAssembler,
    options: SessionOptions,
    registry: InFlightRegistry,
    state: watch::Sender<Session>,
    cancel: CancellationToken,
}

impl<T, C> AuditSession<T, C>
where
    T: AuditTransport + ?Sized,
    C: ReportCache + ?Sized,
{
    /// A session joining the process-wide in-flight registry. Use
    /// [`with_registry`](Self::with_registry) to scope overlap checks to a
    /// narrower set of sessions.
    pub fn new(id: impl Into<String>, transport: Arc<T>, cache: Arc<C>) -> Self {
        let id = id.into();
        let (state, _) = watch::channel(Session::new(&id));
        Self {
            id,
            transport,
            cache,
            assembler: ReportAssembler::default(),
            options: SessionOptions::default(),
            registry: InFlightRegistry::shared(),
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_registry(mut self, registry: InFlightRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_assembler(mut self, assembler: ReportAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Abort the run. An in-flight read unblocks promptly; a session that
    /// never started moves straight to `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.state.send_if_modified(|session| {
            if session.status != SessionStatus::Idle {
                return false;
            }
            session.status = SessionStatus::Cancelled;
            true
        });
    }

    /// Replay a cached audit for this id without contacting the backend.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn mount(&self) -> Result<MountOutcome, AuditError> {
        if self.state.borrow().status != SessionStatus::Idle {
            return Ok(MountOutcome::AlreadyStarted);
        }
        let Some(entry) = self.cache.get(&self.id).await? else {
            debug!("no cached audit");
            return Ok(MountOutcome::NoData);
        };

        let report = self.assembler.replay(&self.id, &entry);
        let replayed = self.state.send_if_modified(|session| {
            if session.status != SessionStatus::Idle {
                return false;
            }
            session.status = SessionStatus::Complete;
            session.progress = 100;
            session.accumulated_text = entry.audit.joined();
            session.replayed = true;
            session.report = Some(report.clone());
            true
        });
        if !replayed {
            return Ok(MountOutcome::AlreadyStarted);
        }
        info!(score = report.score, "replayed cached audit");
        Ok(MountOutcome::Replayed(report))
    }

    /// Run the audit to a terminal state.
    ///
    /// Returns `Ignored` when the session is not idle or the id is already
    /// streaming elsewhere. Only transport failures and an exhausted decode
    /// budget are errors; the session is `Failed` in that case.
    #[instrument(skip(self, request), fields(session = %self.id, target = %request.target))]
    pub async fn start(&self, request: AuditRequest) -> Result<SessionOutcome, AuditError> {
        let Some(_slot) = self.registry.try_acquire(&self.id) else {
            debug!("audit already in flight for this id");
            return Ok(SessionOutcome::Ignored);
        };
        let started = self.state.send_if_modified(|session| {
            if session.status != SessionStatus::Idle {
                return false;
            }
            session.status = SessionStatus::Streaming;
            true
        });
        if !started {
            debug!("session is not idle, ignoring start");
            return Ok(SessionOutcome::Ignored);
        }
        info!("audit started");

        match self.run(&request).await {
            Ok(RunEnd::Finished(inspection)) => {
                let report = self.complete(&request, inspection).await;
                Ok(SessionOutcome::Completed(report))
            }
            Ok(RunEnd::Cancelled) => {
                info!("audit cancelled");
                self.finish(SessionStatus::Cancelled, None);
                Ok(SessionOutcome::Cancelled)
            }
            Err(err) => {
                warn!(error = %err, "audit failed");
                self.finish(SessionStatus::Failed, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run(&self, request: &AuditRequest) -> Result<RunEnd, AuditError> {
        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(RunEnd::Cancelled),
            opened = self.transport.open(request) => opened?,
        };
        let mut run = RunState {
            reader: FrameReader::new(self.options.framing),
            inspection: request.inspection.clone(),
            stats: StreamStats::default(),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(RunEnd::Cancelled),
                next = self.next_chunk(&mut stream) => next?,
            };
            let Some(chunk) = next else {
                match run.reader.finish() {
                    Ok(Some(frame)) => {
                        self.ingest_frame(&mut run, &frame)?;
                    }
                    Ok(None) => {}
                    Err(err) => self.skip_chunk(&mut run, err)?,
                }
                debug!("audit stream ended");
                return Ok(RunEnd::Finished(run.inspection));
            };

            let frames = match run.reader.push(&chunk) {
                Ok(frames) => frames,
                Err(err) => {
                    self.skip_chunk(&mut run, err)?;
                    continue;
                }
            };
            for frame in &frames {
                if self.ingest_frame(&mut run, frame)? {
                    return Ok(RunEnd::Finished(run.inspection));
                }
            }
        }
    }

    async fn next_chunk(&self, stream: &mut ByteStream) -> Result<Option<Vec<u8>>, TransportError> {
        let next = match self.options.read_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => stream.next().await,
        };
        next.transpose()
    }

    /// Apply one frame; returns `true` once the terminal message was seen.
    fn ingest_frame(&self, run: &mut RunState, frame: &Frame) -> Result<bool, AuditError> {
        let message = match classify(frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "discarding undecodable frame");
                run.stats.discarded_frames += 1;
                self.publish_stats(run);
                self.check_budget(run)?;
                return Ok(false);
            }
        };

        match message {
            Message::AssistantText(text) => {
                self.state.send_modify(|session| {
                    if !text.is_empty() {
                        if !session.accumulated_text.is_empty() {
                            session.accumulated_text.push('\n');
                        }
                        session.accumulated_text.push_str(&text);
                    }
                    session.progress = session
                        .progress
                        .saturating_add(PROGRESS_STEP)
                        .min(PROGRESS_CAP)
                        .max(session.progress);
                });
                Ok(false)
            }
            Message::Inspection(data) => {
                trace!(tools = data.tools.len(), "inspection received in stream");
                run.inspection = Some(data);
                Ok(false)
            }
            Message::Result(signal) => {
                if signal.is_error {
                    warn!("audit backend reported an error result");
                }
                self.state.send_modify(|session| {
                    session.link = signal.link;
                    session.total_cost_usd = signal.total_cost_usd;
                });
                Ok(true)
            }
            Message::Unknown { kind } => {
                trace!(%kind, "ignoring message");
                run.stats.ignored_messages += 1;
                self.publish_stats(run);
                Ok(false)
            }
        }
    }

    fn skip_chunk(&self, run: &mut RunState, err: DecodeError) -> Result<(), AuditError> {
        warn!(error = %err, "skipping undecodable chunk");
        run.stats.skipped_chunks += 1;
        self.publish_stats(run);
        self.check_budget(run)
    }

    fn check_budget(&self, run: &RunState) -> Result<(), AuditError> {
        let count = run.stats.decode_errors();
        match self.options.max_decode_errors {
            Some(max) if count > max => Err(AuditError::DecodeBudgetExceeded { count }),
            _ => Ok(()),
        }
    }

    fn publish_stats(&self, run: &RunState) {
        let stats = run.stats;
        self.state.send_modify(|session| session.stats = stats);
    }

    async fn complete(&self, request: &AuditRequest, inspection: Option<InspectionData>) -> Report {
        let text = self.state.borrow().accumulated_text.clone();
        let target = inspection
            .as_ref()
            .and_then(InspectionData::server_spec)
            .unwrap_or(request.target.as_str())
            .to_string();
        let report = self.assembler.assemble(&target, inspection.as_ref(), &text);

        match self
            .assembler
            .persist(self.cache.as_ref(), &self.id, inspection.as_ref(), &text)
            .await
        {
            Ok(true) => debug!("audit cached"),
            Ok(false) => debug!("audit not cached: missing inspection or transcript"),
            Err(err) => warn!(error = %err, "failed to cache audit"),
        }

        self.state.send_modify(|session| {
            session.status = SessionStatus::Complete;
            session.progress = 100;
            session.report = Some(report.clone());
        });
        info!(score = report.score, findings = report.findings.len(), "audit complete");
        report
    }

    fn finish(&self, status: SessionStatus, failure: Option<String>) {
        self.state.send_if_modified(|session| {
            if session.status != SessionStatus::Streaming {
                return false;
            }
            session.status = status;
            session.failure = failure;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AuditText, CacheEntry, MemoryReportCache};
    use crate::extract::Severity;
    use crate::inspect::ServerInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays fixed chunks and counts how often it was opened.
    struct ScriptedTransport {
        chunks: Vec<Result<Vec<u8>, String>>,
        opened: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(chunks: Vec<Result<Vec<u8>, String>>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                opened: AtomicUsize::new(0),
            })
        }

        fn lines(lines: &[&str]) -> Arc<Self> {
            Self::new(
                lines
                    .iter()
                    .map(|line| Ok(format!("{line}\n").into_bytes()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl AuditTransport for ScriptedTransport {
        async fn open(&self, _request: &AuditRequest) -> Result<ByteStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let items: Vec<_> = self
                .chunks
                .iter()
                .map(|chunk| chunk.clone().map_err(TransportError::Stream))
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    fn inspection() -> InspectionData {
        InspectionData {
            server_info: Some(ServerInfo {
                server_spec: Some("npx fs-server".into()),
                ..ServerInfo::default()
            }),
            transport_type: "stdio".into(),
            ..InspectionData::default()
        }
    }

    fn request() -> AuditRequest {
        AuditRequest::for_inspection(inspection(), "tester")
    }

    fn assistant(text: &str) -> String {
        serde_json::json!({"type": "assistant", "content": [{"type": "text", "text": text}]})
            .to_string()
    }

    #[tokio::test]
    async fn ndjson_stream_completes_and_caches() {
        let first = assistant("**SAFE-T1001: Tool Poisoning** - hidden instructions");
        let second = assistant("**SAFE-T1102: Prompt Injection** - unfiltered output");
        let transport = ScriptedTransport::lines(&[
            &first,
            r#"{"type":"system","subtype":"init"}"#,
            &second,
            r#"{"type":"result","is_error":false,"total_cost_usd":0.5}"#,
            &assistant("after the result"),
        ]);
        let cache = Arc::new(MemoryReportCache::new());
        let session = AuditSession::new("r1", transport, Arc::clone(&cache));

        let outcome = session.start(request()).await.unwrap();
        let SessionOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.target, "npx fs-server");
        assert_eq!(report.findings.len(), 2);
        assert!(report.findings.iter().all(|f| f.severity == Severity::High));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Complete);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.stats.ignored_messages, 1);
        assert_eq!(snapshot.total_cost_usd, Some(0.5));
        assert!(!snapshot.accumulated_text.contains("after the result"));
        assert_eq!(snapshot.report, Some(report));

        let cached = cache.get("r1").await.unwrap().unwrap();
        assert_eq!(cached.audit.joined(), snapshot.accumulated_text);
    }

    #[tokio::test]
    async fn sse_stream_uses_streamed_inspection() {
        let transport = ScriptedTransport::new(vec![
            Ok(b"event: message\ndata: {\"type\":\"inspect\",\"data\":{\"tools\":[{\"name\":\"fetch\"}],\"server_info\":{\"server_spec\":\"https://mcp.example.com/sse\"},\"transport_type\":\"sse\"}}\n\n".to_vec()),
            Ok(b"data: {\"type\":\"audit\",\"data\":\"**SAFE-T1001: Tool Poisoning** - the fetch tool hides instructions\"}\n\n".to_vec()),
            Ok(b"data: {\"type\":\"complete\",\"data\":{\"pr_url\":\"https://github.com/acme/srv/pull/7\"}}\n\n".to_vec()),
        ]);
        let session = AuditSession::new("r2", transport, Arc::new(MemoryReportCache::new()))
            .with_options(SessionOptions {
                framing: FramingMode::Sse,
                ..SessionOptions::default()
            });
        let mut request = request();
        request.inspection = None;

        let SessionOutcome::Completed(report) = session.start(request).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(report.target, "https://mcp.example.com/sse");
        assert_eq!(report.corroborations, 1);
        assert_eq!(
            session.snapshot().link.as_deref(),
            Some("https://github.com/acme/srv/pull/7")
        );
    }

    #[tokio::test]
    async fn end_of_stream_without_result_completes() {
        // Trailing record without a newline is flushed on close.
        let transport = ScriptedTransport::new(vec![Ok(assistant("All clear.").into_bytes())]);
        let session = AuditSession::new("r3", transport, Arc::new(MemoryReportCache::new()));
        let SessionOutcome::Completed(report) = session.start(request()).await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(report.score, 100);
        assert_eq!(session.snapshot().accumulated_text, "All clear.");
    }

    #[tokio::test]
    async fn decode_errors_are_counted_not_fatal() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![0xff, 0xfe, b'\n']),
            Ok(b"{broken\n".to_vec()),
            Ok(format!("{}\n", assistant("fine")).into_bytes()),
        ]);
        let session = AuditSession::new("r4", transport, Arc::new(MemoryReportCache::new()));
        let outcome = session.start(request()).await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Completed(_)));
        let stats = session.snapshot().stats;
        assert_eq!(stats.skipped_chunks, 1);
        assert_eq!(stats.discarded_frames, 1);
    }

    #[tokio::test]
    async fn decode_budget_fails_the_session() {
        let transport = ScriptedTransport::lines(&["{bad", "{worse", &assistant("late")]);
        let session = AuditSession::new("r5", transport, Arc::new(MemoryReportCache::new()))
            .with_options(SessionOptions {
                max_decode_errors: Some(1),
                ..SessionOptions::default()
            });
        let err = session.start(request()).await.unwrap_err();
        assert!(matches!(err, AuditError::DecodeBudgetExceeded { count: 2 }));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.failure.is_some());
    }

    #[tokio::test]
    async fn transport_error_fails_the_session() {
        let transport = ScriptedTransport::new(vec![
            Ok(format!("{}\n", assistant("partial")).into_bytes()),
            Err("connection reset".into()),
        ]);
        let cache = Arc::new(MemoryReportCache::new());
        let session = AuditSession::new("r6", transport, Arc::clone(&cache));
        let err = session.start(request()).await.unwrap_err();
        assert!(matches!(err, AuditError::Transport(TransportError::Stream(_))));
        assert_eq!(session.snapshot().status, SessionStatus::Failed);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn terminal_sessions_ignore_restart() {
        let transport = ScriptedTransport::lines(&[r#"{"type":"result"}"#]);
        let session = AuditSession::new(
            "r7",
            Arc::clone(&transport),
            Arc::new(MemoryReportCache::new()),
        );
        assert!(matches!(
            session.start(request()).await.unwrap(),
            SessionOutcome::Completed(_)
        ));
        assert_eq!(session.start(request()).await.unwrap(), SessionOutcome::Ignored);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_before_start_never_opens_transport() {
        let transport = ScriptedTransport::lines(&[r#"{"type":"result"}"#]);
        let session = AuditSession::new(
            "r8",
            Arc::clone(&transport),
            Arc::new(MemoryReportCache::new()),
        );
        session.cancel();
        assert_eq!(session.snapshot().status, SessionStatus::Cancelled);
        assert_eq!(session.start(request()).await.unwrap(), SessionOutcome::Ignored);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mount_replays_cached_audit() {
        let cache = Arc::new(MemoryReportCache::new());
        cache
            .put(
                "r9",
                &CacheEntry {
                    inspect: inspection(),
                    audit: AuditText::Text("**Risk Score:** 70/100".into()),
                },
            )
            .await
            .unwrap();
        let transport = ScriptedTransport::lines(&[]);
        let session = AuditSession::new("r9", Arc::clone(&transport), cache);

        let MountOutcome::Replayed(report) = session.mount().await.unwrap() else {
            panic!("expected replay");
        };
        assert_eq!(report.score, 70);
        let snapshot = session.snapshot();
        assert!(snapshot.replayed);
        assert_eq!(snapshot.status, SessionStatus::Complete);
        assert_eq!(session.start(request()).await.unwrap(), SessionOutcome::Ignored);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mount_without_cache_entry_reports_no_data() {
        let session = AuditSession::new(
            "missing",
            ScriptedTransport::lines(&[]),
            Arc::new(MemoryReportCache::new()),
        );
        assert_eq!(session.mount().await.unwrap(), MountOutcome::NoData);
        assert_eq!(session.snapshot().status, SessionStatus::Idle);
    }

    #[test]
    fn registry_guard_releases_on_drop() {
        let registry = InFlightRegistry::new();
        let guard = registry.try_acquire("a").unwrap();
        assert!(registry.try_acquire("a").is_none());
        assert!(registry.try_acquire("b").is_some());
        drop(guard);
        assert!(!registry.contains("a"));
        assert!(registry.try_acquire("a").is_some());
    }

    #[test]
    fn options_follow_settings() {
        let mut settings = AuditSettings::new("http://localhost:8000");
        settings.framing = FramingMode::Sse;
        settings.read_timeout = Some(Duration::from_secs(45));
        settings.max_decode_errors = Some(3);
        assert_eq!(
            SessionOptions::from_settings(&settings),
            SessionOptions {
                framing: FramingMode::Sse,
                read_timeout: Some(Duration::from_secs(45)),
                max_decode_errors: Some(3),
            }
        );
    }

    #[test]
    fn shared_registry_is_one_set() {
        let guard = InFlightRegistry::shared().try_acquire("shared-set").unwrap();
        assert!(InFlightRegistry::shared().contains("shared-set"));
        assert!(!InFlightRegistry::new().contains("shared-set"));
        drop(guard);
        assert!(!InFlightRegistry::shared().contains("shared-set"));
    }
}
