use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::stream::FramingMode;

/// Connection settings for the audit backend and inspection service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSettings {
    pub base_url: String,
    pub framing: FramingMode,
    /// Idle limit between two reads of the audit stream. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub inspect_timeout_secs: u64,
    pub max_retries: u32,
    pub user_id: String,
    pub cache_dir: Option<PathBuf>,
    /// Undecodable chunks/frames tolerated before a session fails. `None` is unlimited.
    pub max_decode_errors: Option<usize>,
}

const DEFAULT_INSPECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_USER_ID: &str = "mcp-audit";

impl AuditSettings {
    const BASE_URL_ENV: &'static str = "MCP_AUDIT_BASE_URL";
    const FRAMING_ENV: &'static str = "MCP_AUDIT_FRAMING";
    const READ_TIMEOUT_ENV: &'static str = "MCP_AUDIT_READ_TIMEOUT";
    const INSPECT_TIMEOUT_ENV: &'static str = "MCP_AUDIT_INSPECT_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "MCP_AUDIT_MAX_RETRIES";
    const USER_ID_ENV: &'static str = "MCP_AUDIT_USER_ID";
    const CACHE_DIR_ENV: &'static str = "MCP_AUDIT_CACHE_DIR";
    const DECODE_BUDGET_ENV: &'static str = "MCP_AUDIT_MAX_DECODE_ERRORS";

    /// Settings with defaults for everything but the backend URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            framing: FramingMode::default(),
            read_timeout: None,
            inspect_timeout_secs: DEFAULT_INSPECT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            user_id: DEFAULT_USER_ID.to_string(),
            cache_dir: None,
            max_decode_errors: None,
        }
    }

    /// Load settings from environment variables.
    ///
    /// * `MCP_AUDIT_BASE_URL` — Audit backend base URL (required).
    /// * `MCP_AUDIT_FRAMING` — `sse` or `ndjson` (default: `ndjson`).
    /// * `MCP_AUDIT_READ_TIMEOUT` — Idle read limit such as `45s` (default: none).
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let base_url = get(Self::BASE_URL_ENV).with_context(|| {
            format!("environment variable {} must be set", Self::BASE_URL_ENV)
        })?;
        let mut settings = Self::new(base_url);

        if let Some(framing) = get(Self::FRAMING_ENV) {
            settings.framing = framing
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {}", Self::FRAMING_ENV))?;
        }
        if let Some(timeout) = get(Self::READ_TIMEOUT_ENV) {
            settings.read_timeout = Some(
                parse_duration(&timeout)
                    .with_context(|| format!("invalid {}", Self::READ_TIMEOUT_ENV))?,
            );
        }
        if let Some(secs) = get(Self::INSPECT_TIMEOUT_ENV).and_then(|v| v.parse().ok()) {
            settings.inspect_timeout_secs = secs;
        }
        if let Some(retries) = get(Self::RETRIES_ENV).and_then(|v| v.parse().ok()) {
            settings.max_retries = retries;
        }
        if let Some(user_id) = get(Self::USER_ID_ENV) {
            settings.user_id = user_id;
        }
        settings.cache_dir = get(Self::CACHE_DIR_ENV).map(PathBuf::from);
        settings.max_decode_errors = get(Self::DECODE_BUDGET_ENV).and_then(|v| v.parse().ok());

        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML/YAML/JSON file, with `MCP_AUDIT_*`
    /// environment variables taking precedence.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw: RawSettings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("MCP_AUDIT").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read settings from {}", path.display()))?
            .try_deserialize()
            .context("failed to parse audit settings")?;
        raw.into_settings()
    }

    fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("audit backend base URL must be http(s), got `{url}`");
        }
        Ok(())
    }
}

fn parse_duration(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("`{value}` is not a duration such as `30s` or `2m`"))
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    base_url: String,
    #[serde(default)]
    framing: Option<String>,
    #[serde(default)]
    read_timeout: Option<String>,
    #[serde(default)]
    inspect_timeout_secs: Option<u64>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    max_decode_errors: Option<usize>,
}

impl RawSettings {
    fn into_settings(self) -> Result<AuditSettings> {
        let mut settings = AuditSettings::new(self.base_url.trim());
        if let Some(framing) = self.framing {
            settings.framing = framing.parse().map_err(anyhow::Error::msg)?;
        }
        settings.read_timeout = self
            .read_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()?;
        if let Some(secs) = self.inspect_timeout_secs {
            settings.inspect_timeout_secs = secs;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(user_id) = self.user_id.filter(|v| !v.trim().is_empty()) {
            settings.user_id = user_id;
        }
        settings.cache_dir = self.cache_dir;
        settings.max_decode_errors = self.max_decode_errors;
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_ENV: [&str; 8] = [
        AuditSettings::BASE_URL_ENV,
        AuditSettings::FRAMING_ENV,
        AuditSettings::READ_TIMEOUT_ENV,
        AuditSettings::INSPECT_TIMEOUT_ENV,
        AuditSettings::RETRIES_ENV,
        AuditSettings::USER_ID_ENV,
        AuditSettings::CACHE_DIR_ENV,
        AuditSettings::DECODE_BUDGET_ENV,
    ];

    fn with_env_lock<F: FnOnce()>(func: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        for key in ALL_ENV {
            env::remove_var(key);
        }
        func();
        for key in ALL_ENV {
            env::remove_var(key);
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_with_only_base_url() {
        with_env_lock(|| {
            env::set_var(AuditSettings::BASE_URL_ENV, "http://localhost:8000");
            let settings = AuditSettings::from_env().expect("should load settings");
            assert_eq!(settings.base_url, "http://localhost:8000");
            assert_eq!(settings.framing, FramingMode::Ndjson);
            assert!(settings.read_timeout.is_none());
            assert_eq!(settings.inspect_timeout_secs, 30);
            assert_eq!(settings.max_retries, 2);
            assert_eq!(settings.user_id, "mcp-audit");
            assert!(settings.cache_dir.is_none());
            assert!(settings.max_decode_errors.is_none());
        });
    }

    #[test]
    fn errors_when_base_url_missing() {
        with_env_lock(|| {
            let err = AuditSettings::from_env().expect_err("missing base url should error");
            assert!(err.to_string().contains(AuditSettings::BASE_URL_ENV));
        });
    }

    #[test]
    fn parses_framing_and_timeouts() {
        let settings = AuditSettings::from_map(vars(&[
            (AuditSettings::BASE_URL_ENV, "https://audit.example.com"),
            (AuditSettings::FRAMING_ENV, "sse"),
            (AuditSettings::READ_TIMEOUT_ENV, "1m 30s"),
            (AuditSettings::RETRIES_ENV, "5"),
            (AuditSettings::DECODE_BUDGET_ENV, "3"),
        ]))
        .unwrap();
        assert_eq!(settings.framing, FramingMode::Sse);
        assert_eq!(settings.read_timeout, Some(Duration::from_secs(90)));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.max_decode_errors, Some(3));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_framing = AuditSettings::from_map(vars(&[
            (AuditSettings::BASE_URL_ENV, "http://localhost"),
            (AuditSettings::FRAMING_ENV, "xml"),
        ]));
        assert!(bad_framing.is_err());

        let bad_timeout = AuditSettings::from_map(vars(&[
            (AuditSettings::BASE_URL_ENV, "http://localhost"),
            (AuditSettings::READ_TIMEOUT_ENV, "soon"),
        ]));
        assert!(bad_timeout.is_err());

        let bad_url = AuditSettings::from_map(vars(&[(AuditSettings::BASE_URL_ENV, "localhost:8000")]));
        assert!(bad_url.unwrap_err().to_string().contains("http(s)"));
    }

    #[test]
    fn loads_file_with_env_override() {
        with_env_lock(|| {
            let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            writeln!(
                file,
                "base_url = \"http://file.example\"\nframing = \"sse\"\nread_timeout = \"10s\"\nmax_retries = 4"
            )
            .unwrap();
            env::set_var(AuditSettings::RETRIES_ENV, "1");

            let settings = AuditSettings::load(file.path()).expect("should load file settings");
            assert_eq!(settings.base_url, "http://file.example");
            assert_eq!(settings.framing, FramingMode::Sse);
            assert_eq!(settings.read_timeout, Some(Duration::from_secs(10)));
            assert_eq!(settings.max_retries, 1);
        });
    }
}
