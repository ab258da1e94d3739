use hickory_resolver::proto::rr::Name;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Every way a probe can go wrong, grouped by cause rather than by the
/// library that reported it. The `Display` text is the failure reason shown
/// in reports, so variants carry already-readable context.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Resolution(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Process(String),
    #[error("execution error")]
    Parse,
}

impl ProbeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Outcome of one probe call, independent of the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
#[must_use]
pub enum ProbeResult {
    Success { payload: String },
    Failure { reason: String },
}

impl ProbeResult {
    pub fn success(payload: impl Into<String>) -> Self {
        Self::Success {
            payload: payload.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The payload on success, the reason on failure.
    pub fn text(&self) -> &str {
        match self {
            Self::Success { payload } => payload,
            Self::Failure { reason } => reason,
        }
    }
}

impl From<Result<String>> for ProbeResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(payload) => Self::Success { payload },
            Err(error) => {
                log::debug!("probe failed: {error:?}");
                Self::Failure {
                    reason: error.to_string(),
                }
            }
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Runs a backend future and folds its outcome into a [`ProbeResult`],
/// logging how long it took.
pub async fn normalize<F, Fut>(label: &str, f: F) -> ProbeResult
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let (duration, result) = measure_time(f).await;
    log::info!("{label} finished in {}", format_duration(duration));
    ProbeResult::from(result)
}

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", duration.as_secs_f32())
    }
}

pub async fn measure_time<F, Fut, T>(f: F) -> (Duration, T)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f().await;
    let duration = start.elapsed();
    (duration, result)
}

/// Rejects empty or whitespace-only string arguments before any I/O.
pub fn require_non_empty<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ProbeError::validation(format!("{what} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

/// Accepts an IP address or a DNS host name. Labels may not start with `-`,
/// so the value is never taken for an option when handed to `ping` or `ssh`.
pub fn require_host<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let host = require_non_empty(what, value)?;
    if host.parse::<IpAddr>().is_ok() {
        return Ok(host);
    }

    let labels_ok = host.trim_end_matches('.').split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    });
    if labels_ok && Name::from_ascii(host).is_ok() {
        Ok(host)
    } else {
        Err(ProbeError::validation(format!(
            "{what} must be a host name or IP address, received {host:?}"
        )))
    }
}

mod tests;
