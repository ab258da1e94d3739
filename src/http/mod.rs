use crate::utils::{normalize, require_non_empty, ProbeError, ProbeResult, Result};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use url::Url;

pub mod headers;

pub use headers::*;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_REDIRECTS: usize = 10;

/// Accepts absolute `http`/`https` URLs with a host.
pub fn parse_url(raw: &str) -> Result<Url> {
    let raw = require_non_empty("url", raw)?;
    let url = Url::parse(raw).map_err(|e| ProbeError::validation(format!("malformed URL {raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProbeError::validation(format!(
                "malformed URL {raw}: unsupported scheme {other}"
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::validation(format!("malformed URL {raw}: missing host")));
    }
    Ok(url)
}

fn transport_error(url: &Url, error: &reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout(format!("request to {url} timed out"))
    } else {
        ProbeError::Transport(format!("request to {url} failed: {error}"))
    }
}

#[derive(Debug, Clone)]
pub struct HttpStatusProbe {
    pub url: String,
    pub timeout: Duration,
}

impl HttpStatusProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("http status probe {}", self.url);
        normalize(&label, || self.check()).await
    }

    /// Status code of the final response after redirects, whatever its class.
    pub async fn check(&self) -> Result<String> {
        let url = parse_url(&self.url)?;

        let client = Client::builder()
            .timeout(self.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ProbeError::Transport(format!("failed to build HTTP client: {e}")))?;

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        log::debug!("GET {url} -> {} ({})", response.status(), response.url());
        Ok(response.status().as_u16().to_string())
    }
}
