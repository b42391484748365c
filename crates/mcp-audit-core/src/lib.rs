pub mod backend;
pub mod cache;
pub mod error;
pub mod extract;
pub mod inspect;
pub mod report;
pub mod score;
pub mod session;
pub mod stream;

pub use backend::{
    AuditRequest, AuditSettings, AuditTransport, ByteStream, HttpAuditBackend,
    HttpInspectionClient, InspectionSource,
};
pub use cache::{AuditText, CacheEntry, FileReportCache, MemoryReportCache, ReportCache};
pub use error::{AuditError, CacheError, DecodeError, TransportError};
pub use extract::{
    extract_findings, Evidence, ExtractionStrategy, Finding, FindingExtractor, PatternError,
    Severity, StructuredStrategy, TextPattern,
};
pub use inspect::{InspectTarget, InspectionData, TransportKind};
pub use report::{render_report, OutputFormat, Report, ReportAssembler};
pub use score::{resolve_score, RiskBand, RiskThresholds};
pub use session::{
    AuditSession, InFlightRegistry, MountOutcome, Session, SessionOptions, SessionOutcome,
    SessionStatus,
};
pub use stream::{FrameReader, FramingMode, Message, StreamStats};
