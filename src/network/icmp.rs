//! ICMP echo probe.
//!
//! Runs the system `ping` and reads its summary through [`parse_ping_summary`],
//! an adapter that knows the iputils/busybox (Linux) and BSD/macOS layouts.
//! The locale is pinned to `C` so the summary wording is predictable.
//!
//! ```rust,no_run
//! use sleuth::network::IcmpProbe;
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = IcmpProbe::new("example.com").with_count(3).with_mtu(56).run().await;
//!     println!("loss,rtt: {result}");
//! }
//! ```

use crate::utils::{normalize, require_host, ProbeError, ProbeResult, Result};
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const DEFAULT_COUNT: u32 = 9;
pub const DEFAULT_MTU: u32 = 1000;
pub const COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=10_000;
pub const MTU_RANGE: std::ops::RangeInclusive<u32> = 56..=1500;

/// 20 bytes of IP header plus 8 of ICMP header.
const HEADER_OVERHEAD: u32 = 28;
const INTERVAL: Duration = Duration::from_millis(200);
const GRACE: Duration = Duration::from_secs(10);

pub const UNREACHABLE_RTT: &str = "Unreachable";

#[derive(Debug, Clone)]
pub struct IcmpProbe {
    pub node: String,
    pub count: u32,
    pub mtu: u32,
}

impl IcmpProbe {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            count: DEFAULT_COUNT,
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("icmp probe {} x{}", self.node, self.count);
        normalize(&label, || self.check()).await
    }

    fn validate(&self) -> Result<&str> {
        let node = require_host("node", &self.node)?;
        if !COUNT_RANGE.contains(&self.count) {
            return Err(ProbeError::validation("count must be from 1-10000"));
        }
        if !MTU_RANGE.contains(&self.mtu) {
            return Err(ProbeError::validation("frame-size must be from 56-1500"));
        }
        Ok(node)
    }

    /// Deadline for the whole exchange: one interval per echo plus grace.
    pub fn deadline(&self) -> Duration {
        INTERVAL * self.count + GRACE
    }

    pub async fn check(&self) -> Result<String> {
        let node = self.validate()?;
        let payload_size = self.mtu - HEADER_OVERHEAD;

        let mut cmd = Command::new("ping");
        cmd.env("LC_ALL", "C")
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-i")
            .arg("0.2")
            .arg("-s")
            .arg(payload_size.to_string())
            .arg(node)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        log::debug!("running ping against {node}: count={} size={payload_size}", self.count);

        let output = timeout(self.deadline(), cmd.output())
            .await
            .map_err(|_| {
                ProbeError::Timeout(format!(
                    "ping to {node} did not finish within {}s",
                    self.deadline().as_secs()
                ))
            })?
            .map_err(|e| ProbeError::Process(format!("failed to run ping: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_ping_summary(&stdout) {
            Ok(summary) => Ok(summary),
            // No summary at all: ping gave up early (unknown host, bad option).
            Err(_) if !output.status.success() && !stdout.contains("packet loss") => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ProbeError::Process(format!(
                    "ping exited with {}: {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                )))
            }
            Err(e) => Err(e),
        }
    }
}

fn capture_first(text: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(text)?;
    caps.get(1).map(|m| m.as_str().to_string())
}

/// Extracts `"<loss>%,<avg rtt>"` from ping output. Total loss reports the
/// RTT as [`UNREACHABLE_RTT`]. Anything that does not yield both fields is
/// [`ProbeError::Parse`].
pub fn parse_ping_summary(output: &str) -> Result<String> {
    let loss = capture_first(output, r"(\d+(?:\.\d+)?)% packet loss").ok_or(ProbeError::Parse)?;

    if loss.parse::<f64>().map_err(|_| ProbeError::Parse)? >= 100.0 {
        return Ok(format!("{loss}%,{UNREACHABLE_RTT}"));
    }

    let rtt = capture_first(
        output,
        r"(?:rtt|round-trip) min/avg/max(?:/(?:mdev|stddev))? = [\d.]+/([\d.]+)/",
    )
    .ok_or(ProbeError::Parse)?;

    Ok(format!("{loss}%,{rtt}"))
}

/// Splits a `"<loss>,<rtt>"` summary back into its two fields.
pub fn split_ping_summary(summary: &str) -> Result<(&str, &str)> {
    let mut fields = summary.split(',');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(loss), Some(rtt), None) if !loss.is_empty() && !rtt.is_empty() => Ok((loss, rtt)),
        _ => Err(ProbeError::Parse),
    }
}
