use crate::utils::{normalize, require_non_empty, ProbeError, ProbeResult, Result};
use hickory_resolver::config::{
    NameServerConfig, Protocol, ResolverConfig, ResolverOpts, ServerOrderingStrategy,
};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::Name;
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPTS: usize = 2;

/// Record types the DNS probe knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    A,
    Mx,
    Ptr,
}

impl FromStr for RecordKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "mx" => Ok(Self::Mx),
            "ptr" => Ok(Self::Ptr),
            _ => Err(ProbeError::validation(format!(
                "unrecognized record type: {s}"
            ))),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::Mx => "MX",
            Self::Ptr => "PTR",
        })
    }
}

impl Serialize for RecordKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses nameserver strings, rejecting anything that is not an IP address.
pub fn parse_nameservers<S: AsRef<str>>(servers: &[S]) -> Result<Vec<IpAddr>> {
    if servers.is_empty() {
        return Err(ProbeError::validation("at least one nameserver is required"));
    }
    servers
        .iter()
        .map(|s| {
            let s = s.as_ref().trim();
            s.parse::<IpAddr>()
                .map_err(|_| ProbeError::validation(format!("malformed nameserver address: {s}")))
        })
        .collect()
}

/// PTR queries go to the reverse name of an address, everything else to a
/// forward name.
enum Query {
    Forward(Name),
    Reverse(IpAddr),
}

#[derive(Debug, Clone)]
pub struct DnsProbe {
    pub node: String,
    pub nameservers: Vec<IpAddr>,
    pub record_kind: RecordKind,
    pub timeout: Duration,
}

impl DnsProbe {
    pub fn new(node: impl Into<String>, nameservers: Vec<IpAddr>, record_kind: RecordKind) -> Self {
        Self {
            node: node.into(),
            nameservers,
            record_kind,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("dns {} probe for {}", self.record_kind, self.node);
        normalize(&label, || self.check()).await
    }

    /// Overall bound on a query: every server gets every attempt, plus slack.
    fn deadline(&self) -> Duration {
        let tries = u32::try_from(self.nameservers.len().max(1) * ATTEMPTS).unwrap_or(u32::MAX);
        self.timeout.saturating_mul(tries) + Duration::from_secs(1)
    }

    fn resolver(&self) -> TokioAsyncResolver {
        let mut config = ResolverConfig::new();
        for ip in &self.nameservers {
            config.add_name_server(NameServerConfig::new(SocketAddr::new(*ip, 53), Protocol::Udp));
        }

        let mut opts = ResolverOpts::default();
        opts.ndots = 0;
        opts.timeout = self.timeout;
        opts.attempts = ATTEMPTS;
        opts.cache_size = 0;
        opts.num_concurrent_reqs = 1;
        opts.server_ordering_strategy = ServerOrderingStrategy::UserProvidedOrder;

        log::debug!(
            "resolver for {}: servers={:?} timeout={}s attempts={}",
            self.node,
            self.nameservers,
            opts.timeout.as_secs(),
            opts.attempts
        );

        TokioAsyncResolver::tokio(config, opts)
    }

    pub async fn check(&self) -> Result<String> {
        let node = require_non_empty("node", &self.node)?;
        if self.nameservers.is_empty() {
            return Err(ProbeError::validation("at least one nameserver is required"));
        }

        let query = match self.record_kind {
            RecordKind::Ptr => Query::Reverse(
                node.parse::<IpAddr>()
                    .map_err(|_| ProbeError::validation(format!("malformed address: {node}")))?,
            ),
            _ => Query::Forward(
                Name::from_str(node)
                    .map_err(|e| ProbeError::validation(format!("malformed name {node}: {e}")))?,
            ),
        };

        let resolver = self.resolver();

        let records: Vec<String> = timeout(self.deadline(), async {
            match (self.record_kind, query) {
                (RecordKind::Mx, Query::Forward(name)) => {
                    resolver.mx_lookup(name).await.map(|lookup| {
                        lookup
                            .iter()
                            .map(|mx| format!("Host {} preference {}", mx.exchange(), mx.preference()))
                            .collect()
                    })
                }
                (_, Query::Forward(name)) => resolver
                    .ipv4_lookup(name)
                    .await
                    .map(|lookup| lookup.iter().map(ToString::to_string).collect()),
                (_, Query::Reverse(ip)) => resolver
                    .reverse_lookup(ip)
                    .await
                    .map(|lookup| lookup.iter().map(ToString::to_string).collect()),
            }
        })
        .await
        .map_err(|_| ProbeError::Timeout("resolver timeout".to_string()))?
        .map_err(classify_resolve_error)?;

        if records.is_empty() {
            return Err(ProbeError::Resolution("no record found".to_string()));
        }
        Ok(records.join(", "))
    }
}

fn classify_resolve_error(error: ResolveError) -> ProbeError {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            ProbeError::Resolution("domain does not exist".to_string())
        }
        ResolveErrorKind::NoRecordsFound { .. } => {
            ProbeError::Resolution("no record found".to_string())
        }
        ResolveErrorKind::Timeout => ProbeError::Timeout("resolver timeout".to_string()),
        _ => ProbeError::Resolution(format!("resolution failed: {error}")),
    }
}

/// Text-level entry point: validates record type and nameservers before
/// any query is sent.
pub async fn check_dns<S: AsRef<str>>(
    node: &str,
    nameservers: &[S],
    record_type: &str,
    query_timeout: Duration,
) -> ProbeResult {
    let prepared = record_type
        .parse::<RecordKind>()
        .and_then(|kind| parse_nameservers(nameservers).map(|servers| (kind, servers)));

    match prepared {
        Ok((kind, servers)) => {
            DnsProbe::new(node, servers, kind)
                .with_timeout(query_timeout)
                .run()
                .await
        }
        Err(e) => ProbeResult::from(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_is_case_insensitive() {
        assert_eq!("a".parse::<RecordKind>().unwrap(), RecordKind::A);
        assert_eq!("Mx".parse::<RecordKind>().unwrap(), RecordKind::Mx);
        assert_eq!("PTR".parse::<RecordKind>().unwrap(), RecordKind::Ptr);
        assert_eq!(RecordKind::Mx.to_string(), "MX");
    }

    #[test]
    fn test_unknown_record_types_are_rejected() {
        for qtype in ["cname", "AAAA", "txt", "", "ns"] {
            let err = qtype.parse::<RecordKind>().unwrap_err();
            assert!(err.to_string().starts_with("unrecognized record type"));
        }
    }

    #[test]
    fn test_parse_nameservers() {
        let servers = parse_nameservers(&["8.8.8.8", "2001:4860:4860::8888"]).unwrap();
        assert_eq!(servers.len(), 2);

        let err = parse_nameservers(&["dns.google"]).unwrap_err();
        assert_eq!(err.to_string(), "malformed nameserver address: dns.google");

        let empty: [&str; 0] = [];
        assert!(parse_nameservers(&empty).is_err());
    }

    #[tokio::test]
    async fn test_unsupported_type_never_queries() {
        // 192.0.2.1 is TEST-NET; a query there would hang until timeout.
        let result = check_dns("example.com", &["192.0.2.1"], "cname", Duration::from_secs(5)).await;
        assert_eq!(result, ProbeResult::failure("unrecognized record type: cname"));
    }

    #[tokio::test]
    async fn test_ptr_requires_an_address() {
        let result = check_dns("example.com", &["192.0.2.1"], "ptr", Duration::from_secs(5)).await;
        assert_eq!(result, ProbeResult::failure("malformed address: example.com"));
    }

    #[tokio::test]
    async fn test_malformed_nameserver_never_queries() {
        let result = check_dns("example.com", &["not-an-ip"], "a", Duration::from_secs(5)).await;
        assert_eq!(result, ProbeResult::failure("malformed nameserver address: not-an-ip"));
    }

    #[tokio::test]
    async fn test_empty_node_is_rejected() {
        let probe = DnsProbe::new(" ", vec!["192.0.2.1".parse().unwrap()], RecordKind::A);
        assert_eq!(probe.run().await, ProbeResult::failure("node must not be empty"));
    }

    #[test]
    fn test_deadline_covers_every_server() {
        let probe = DnsProbe::new(
            "example.com",
            vec!["192.0.2.1".parse().unwrap(), "192.0.2.2".parse().unwrap()],
            RecordKind::A,
        )
        .with_timeout(Duration::from_secs(2));
        assert_eq!(probe.deadline(), Duration::from_secs(9));
    }
}
