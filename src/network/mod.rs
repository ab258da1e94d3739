use crate::utils::{normalize, require_non_empty, ProbeError, ProbeResult, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;

pub mod icmp;
pub mod tcp;
pub mod udp;

pub use icmp::*;

pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    const fn prefix(self) -> char {
        match self {
            Self::Tcp => 't',
            Self::Udp => 'u',
        }
    }
}

/// A protocol/port pair written as `t80` or `u53`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub number: u16,
}

impl PortSpec {
    pub const fn tcp(number: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            number,
        }
    }

    pub const fn udp(number: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            number,
        }
    }
}

impl FromStr for PortSpec {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let protocol = match chars.next().map(|c| c.to_ascii_lowercase()) {
            Some('t') => Protocol::Tcp,
            Some('u') => Protocol::Udp,
            _ => {
                return Err(ProbeError::validation(format!(
                    "port must be prepended with t or u, received {s:?}"
                )))
            }
        };

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProbeError::validation(format!(
                "port must be an integer 0-65535, received {digits:?}"
            )));
        }
        let number = digits.parse::<u16>().map_err(|_| {
            ProbeError::validation(format!("port must be an integer 0-65535, received {digits}"))
        })?;

        Ok(Self { protocol, number })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.protocol.prefix(), self.number)
    }
}

impl Serialize for PortSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// What a connection attempt ran into. Only [`SocketState::Open`] is
/// reported as `open`; everything else folds into `unreachable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
    Open,
    Refused,
    TimedOut,
    Unreachable(String),
}

impl SocketState {
    pub const fn payload(&self) -> &'static str {
        match self {
            Self::Open => "open",
            _ => "unreachable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SocketProbe {
    pub node: String,
    pub port: PortSpec,
    pub timeout: Duration,
}

impl SocketProbe {
    pub fn new(node: impl Into<String>, port: PortSpec) -> Self {
        Self {
            node: node.into(),
            port,
            timeout: SOCKET_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("socket probe {} {}", self.node, self.port);
        normalize(&label, || self.check()).await
    }

    pub async fn check(&self) -> Result<String> {
        let state = self.check_state().await?;
        if state != SocketState::Open {
            log::debug!("{} {} is {:?}", self.node, self.port, state);
        }
        Ok(state.payload().to_string())
    }

    /// Like [`SocketProbe::check`] but keeps the distinct non-open causes.
    pub async fn check_state(&self) -> Result<SocketState> {
        require_non_empty("node", &self.node)?;
        if self.port.number == 0 {
            return Err(ProbeError::validation(
                "port must be an integer 1-65535, received 0",
            ));
        }

        // Name lookup and the connection attempt share one deadline.
        let attempt = async {
            match self.resolve_target().await {
                Ok(addr) => match self.port.protocol {
                    Protocol::Tcp => self.probe_tcp(addr).await,
                    Protocol::Udp => self.probe_udp(addr).await,
                },
                Err(e) => SocketState::Unreachable(e.to_string()),
            }
        };

        Ok(timeout(self.timeout, attempt)
            .await
            .unwrap_or(SocketState::TimedOut))
    }

    /// First address for the node, IPv4 preferred.
    async fn resolve_target(&self) -> Result<SocketAddr> {
        let node = self.node.trim();
        if let Ok(ip) = node.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port.number));
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((node, self.port.number))
            .await
            .map_err(|e| ProbeError::Resolution(format!("failed to resolve {node}: {e}")))?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ProbeError::Resolution(format!("no address found for {node}")))
    }
}

/// Parses a textual port spec and probes it; malformed specs never reach a
/// socket.
pub async fn check_socket(node: &str, port: &str, socket_timeout: Duration) -> ProbeResult {
    match port.parse::<PortSpec>() {
        Ok(spec) => {
            SocketProbe::new(node, spec)
                .with_timeout(socket_timeout)
                .run()
                .await
        }
        Err(e) => ProbeResult::from(Err(e)),
    }
}
