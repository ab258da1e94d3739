//! HTTP status/redirect trace.
//!
//! Each hop is sent as a `HEAD` request with redirects handled here rather
//! than by the client, so every intermediate status line and `Location`
//! header ends up in the trace. Certificates are not verified: the probe
//! targets lab hosts that are often reached by IP.

use super::{parse_url, transport_error, MAX_REDIRECTS, REQUEST_TIMEOUT};
use crate::utils::{normalize, ProbeError, ProbeResult, Result};
use reqwest::header::{HOST, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode, Version};
use std::fmt::Write;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

const OVERALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const TRACE_SEPARATOR: &str = " -> ";
pub const REDIRECT_LIMIT_MARKER: &str = "redirect limit reached";

#[derive(Debug, Clone)]
pub struct HeaderProbe {
    pub uri: String,
    /// Sent as the `Host` header, for targets addressed by IP that serve a
    /// virtual host.
    pub host_header: Option<String>,
    pub timeout: Duration,
}

impl HeaderProbe {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            host_header: None,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_host_header(mut self, host: Option<String>) -> Self {
        self.host_header = host.filter(|h| !h.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("http header probe {}", self.uri);
        normalize(&label, || self.check()).await
    }

    pub async fn check(&self) -> Result<String> {
        let start = parse_url(&self.uri)?;

        let client = Client::builder()
            .timeout(self.timeout)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProbeError::Transport(format!("failed to build HTTP client: {e}")))?;

        let (raw, complete) = timeout(OVERALL_TIMEOUT, self.collect_raw_trace(&client, start))
            .await
            .map_err(|_| {
                ProbeError::Timeout(format!(
                    "header trace did not finish within {}s",
                    OVERALL_TIMEOUT.as_secs()
                ))
            })??;

        let trace = extract_trace(&raw);
        if complete {
            Ok(trace)
        } else {
            Ok(format!("{trace}{TRACE_SEPARATOR}{REDIRECT_LIMIT_MARKER}"))
        }
    }

    /// Follows redirects and returns the raw header blocks of every hop,
    /// plus whether the chain ended before [`MAX_REDIRECTS`] ran out.
    async fn collect_raw_trace(&self, client: &Client, start: Url) -> Result<(String, bool)> {
        let authority = (start.host_str().map(str::to_owned), start.port_or_known_default());
        let mut current = start;
        let mut raw = String::new();

        for hop in 0..=MAX_REDIRECTS {
            let mut request = client.head(current.clone());
            if let Some(host) = &self.host_header {
                if (current.host_str().map(str::to_owned), current.port_or_known_default()) == authority {
                    request = request.header(HOST, host.as_str());
                }
            }

            let response = request
                .send()
                .await
                .map_err(|e| transport_error(&current, &e))?;
            log::debug!("hop {hop}: HEAD {current} -> {}", response.status());
            append_header_block(&mut raw, &response);

            if !response.status().is_redirection() {
                return Ok((raw, true));
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                return Ok((raw, true));
            };
            current = current.join(location).map_err(|e| {
                ProbeError::Transport(format!("invalid redirect target {location}: {e}"))
            })?;
        }

        log::debug!("stopped after {MAX_REDIRECTS} redirects at {current}");
        Ok((raw, false))
    }
}

/// Status line as curl prints it: HTTP/2 and later carry no reason phrase.
fn status_line(version: Version, status: StatusCode) -> String {
    let version = if version == Version::HTTP_09 {
        "HTTP/0.9"
    } else if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else if version == Version::HTTP_11 {
        "HTTP/1.1"
    } else if version == Version::HTTP_2 {
        return format!("HTTP/2 {}", status.as_u16());
    } else if version == Version::HTTP_3 {
        return format!("HTTP/3 {}", status.as_u16());
    } else {
        "HTTP/?"
    };
    format!("{version} {status}")
}

fn append_header_block(raw: &mut String, response: &Response) {
    let _ = write!(raw, "{}\r\n", status_line(response.version(), response.status()));
    for (name, value) in response.headers() {
        let _ = write!(raw, "{}: {}\r\n", name, value.to_str().unwrap_or("<binary>"));
    }
    raw.push_str("\r\n");
}

/// Keeps the status lines and `Location` headers of a raw header dump, in
/// order, joined with [`TRACE_SEPARATOR`].
pub fn extract_trace(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter_map(|line| {
            if line.starts_with("HTTP/") {
                Some(line.to_string())
            } else {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("location")
                    .then(|| format!("Location: {}", value.trim()))
            }
        })
        .collect::<Vec<_>>()
        .join(TRACE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[test]
    fn test_extract_trace_keeps_status_and_location() {
        let raw = "HTTP/1.1 301 Moved Permanently\r\n\
                   Server: nginx\r\n\
                   Location: https://www.example.com/\r\n\
                   \r\n\
                   HTTP/2 200\r\n\
                   content-type: text/html\r\n";
        assert_eq!(
            extract_trace(raw),
            "HTTP/1.1 301 Moved Permanently -> Location: https://www.example.com/ -> HTTP/2 200"
        );
    }

    #[test]
    fn test_extract_trace_lowercase_location() {
        let raw = "HTTP/2 302\nlocation: /login\n\nHTTP/2 200\n";
        assert_eq!(extract_trace(raw), "HTTP/2 302 -> Location: /login -> HTTP/2 200");
    }

    #[test]
    fn test_status_line_matches_curl() {
        assert_eq!(status_line(Version::HTTP_11, StatusCode::OK), "HTTP/1.1 200 OK");
        assert_eq!(
            status_line(Version::HTTP_10, StatusCode::MOVED_PERMANENTLY),
            "HTTP/1.0 301 Moved Permanently"
        );
        assert_eq!(status_line(Version::HTTP_2, StatusCode::OK), "HTTP/2 200");
        assert_eq!(status_line(Version::HTTP_3, StatusCode::FOUND), "HTTP/3 302");
    }

    #[test]
    fn test_extract_trace_empty() {
        assert_eq!(extract_trace(""), "");
    }

    #[tokio::test]
    async fn test_malformed_uri_is_failure() {
        let result = HeaderProbe::new("ftp://example.com").run().await;
        assert!(!result.is_success());
        assert!(result.text().contains("unsupported scheme ftp"));
    }

    /// Serves `/` as a redirect to `/final` and `/final` as 200, reporting
    /// the Host header of each request. With `endless`, every path redirects.
    async fn redirecting_server(endless: bool) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0; 4096];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let host = request
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("host").then(|| value.trim().to_string())
                        })
                        .unwrap_or_default();
                    let _ = tx.send(host);

                    let response = if endless {
                        "HTTP/1.1 302 Found\r\nLocation: /again\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    } else if request.starts_with("HEAD /final") {
                        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    } else {
                        "HTTP/1.1 301 Moved Permanently\r\nLocation: /final\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    };
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        (format!("http://{addr}/"), rx)
    }

    #[tokio::test]
    async fn test_follows_redirects_into_trace() {
        let (url, _hosts) = redirecting_server(false).await;
        let result = HeaderProbe::new(url).run().await;
        assert_eq!(
            result,
            ProbeResult::success(
                "HTTP/1.1 301 Moved Permanently -> Location: /final -> HTTP/1.1 200 OK"
            )
        );
    }

    #[tokio::test]
    async fn test_sends_host_override_on_every_same_origin_hop() {
        let (url, mut hosts) = redirecting_server(false).await;
        let result = HeaderProbe::new(url)
            .with_host_header(Some("www.example.com".to_string()))
            .run()
            .await;
        assert!(result.is_success());

        assert_eq!(hosts.recv().await.unwrap(), "www.example.com");
        assert_eq!(hosts.recv().await.unwrap(), "www.example.com");
    }

    #[tokio::test]
    async fn test_redirect_limit_keeps_partial_trace() {
        let (url, _hosts) = redirecting_server(true).await;
        let result = HeaderProbe::new(url).run().await;

        assert!(result.is_success(), "{result}");
        let trace = result.text();
        assert!(trace.ends_with(" -> redirect limit reached"), "{trace}");
        assert_eq!(trace.matches("HTTP/1.1 302 Found").count(), MAX_REDIRECTS + 1);
        assert!(trace.starts_with("HTTP/1.1 302 Found -> Location: /again"));
    }
}
