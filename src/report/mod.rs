//! Runs the probes that apply to a [`NetworkElement`] and assembles the
//! results into an ordered [`Report`].
//!
//! Sections always appear in the same order: header, DNS, packet loss,
//! latency, ports, URLs, note. A failed probe shows up as its failure reason
//! on its own line and never stops the sections after it.

use crate::dns::{DnsProbe, RecordKind};
use crate::element::NetworkElement;
use crate::http::HttpStatusProbe;
use crate::network::{split_ping_summary, IcmpProbe, PortSpec, SocketProbe};
use crate::utils::ProbeResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Header,
    Dns,
    PacketLoss,
    Latency,
    Ports,
    Urls,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub section: Section,
    pub success: bool,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub element: String,
    pub lines: Vec<ReportLine>,
}

impl Report {
    pub fn new(element: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            lines: Vec::new(),
        }
    }

    fn push(&mut self, section: Section, success: bool, text: String) {
        self.lines.push(ReportLine {
            section,
            success,
            text,
        });
    }

    fn push_result(&mut self, section: Section, prefix: &str, result: &ProbeResult) {
        self.push(section, result.is_success(), format!("{prefix}: {result}"));
    }

    pub fn text_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.text.as_str())
    }

    pub fn sections(&self) -> Vec<Section> {
        let mut sections: Vec<Section> = self.lines.iter().map(|line| line.section).collect();
        sections.dedup();
        sections
    }

    pub fn failures(&self) -> usize {
        self.lines.iter().filter(|line| !line.success).count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&line.text)?;
        }
        Ok(())
    }
}

/// The probes the assembler needs. Swapped out for stubs in tests.
#[async_trait]
pub trait Probes: Send + Sync {
    async fn dns(&self, node: &str, nameservers: &[IpAddr], kind: RecordKind) -> ProbeResult;
    async fn icmp(&self, node: &str, count: u32, mtu: u32) -> ProbeResult;
    async fn socket(&self, node: &str, port: PortSpec) -> ProbeResult;
    async fn http_status(&self, url: &str) -> ProbeResult;
}

/// Time budgets for the live probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub dns_timeout: Duration,
    pub socket_timeout: Duration,
    pub http_timeout: Duration,
    pub ssh_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout: crate::dns::DEFAULT_TIMEOUT,
            socket_timeout: crate::network::SOCKET_TIMEOUT,
            http_timeout: crate::http::REQUEST_TIMEOUT,
            ssh_timeout: crate::remote::COMMAND_TIMEOUT,
        }
    }
}

impl ProbeConfig {
    /// Overrides the DNS and HTTP budgets; socket and SSH connect timeouts
    /// stay fixed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if let Some(timeout) = timeout {
            self.dns_timeout = timeout;
            self.http_timeout = timeout;
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveProbes {
    pub config: ProbeConfig,
}

impl LiveProbes {
    pub const fn new(config: ProbeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Probes for LiveProbes {
    async fn dns(&self, node: &str, nameservers: &[IpAddr], kind: RecordKind) -> ProbeResult {
        DnsProbe::new(node, nameservers.to_vec(), kind)
            .with_timeout(self.config.dns_timeout)
            .run()
            .await
    }

    async fn icmp(&self, node: &str, count: u32, mtu: u32) -> ProbeResult {
        IcmpProbe::new(node).with_count(count).with_mtu(mtu).run().await
    }

    async fn socket(&self, node: &str, port: PortSpec) -> ProbeResult {
        SocketProbe::new(node, port)
            .with_timeout(self.config.socket_timeout)
            .run()
            .await
    }

    async fn http_status(&self, url: &str) -> ProbeResult {
        HttpStatusProbe::new(url)
            .with_timeout(self.config.http_timeout)
            .run()
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ReportAssembler<P> {
    probes: P,
    icmp_count: u32,
    icmp_mtu: u32,
}

impl<P: Probes> ReportAssembler<P> {
    pub fn new(probes: P) -> Self {
        Self {
            probes,
            icmp_count: crate::network::DEFAULT_COUNT,
            icmp_mtu: crate::network::DEFAULT_MTU,
        }
    }

    pub fn with_icmp(mut self, count: u32, mtu: u32) -> Self {
        self.icmp_count = count;
        self.icmp_mtu = mtu;
        self
    }

    pub async fn render(&self, element: &NetworkElement) -> Report {
        let mut report = Report::new(element.name());
        self.render_into(element, &mut report).await;
        report
    }

    /// Appends lines to `report` as each probe finishes, so dropping this
    /// future part-way leaves only whole lines behind.
    pub async fn render_into(&self, element: &NetworkElement, report: &mut Report) {
        let node = element.name();
        log::info!("rendering {node} ({})", element.kind());

        report.push(Section::Header, true, format!("Element: {node}"));
        report.push(Section::Header, true, format!("Type: {}", element.kind()));

        if let (Some(kinds), Some(servers)) = (element.dns_record_types(), element.dns_servers()) {
            for &kind in kinds {
                let result = self.probes.dns(node, servers, kind).await;
                report.push_result(Section::Dns, &format!("DNS {kind} record"), &result);
            }
        }

        let icmp = self.probes.icmp(node, self.icmp_count, self.icmp_mtu).await;
        let (success, loss, rtt) = match &icmp {
            ProbeResult::Success { payload } => match split_ping_summary(payload) {
                Ok((loss, rtt)) => (true, loss.to_string(), rtt.to_string()),
                Err(e) => (false, e.to_string(), e.to_string()),
            },
            ProbeResult::Failure { reason } => (false, reason.clone(), reason.clone()),
        };
        report.push(Section::PacketLoss, success, format!("Packet loss: {loss}"));
        report.push(Section::Latency, success, format!("Latency (RTTms): {rtt}"));

        for &port in element.ports().unwrap_or_default() {
            let result = self.probes.socket(node, port).await;
            report.push_result(Section::Ports, &format!("Port {port}"), &result);
        }

        for url in element.urls().unwrap_or_default() {
            let result = self.probes.http_status(url).await;
            report.push_result(Section::Urls, &format!("URL {url}"), &result);
        }

        if let Some(note) = element.note() {
            report.push(Section::Note, true, format!("Notes: {note}"));
        }

        log::info!("{node}: {} line(s), {} failed", report.lines.len(), report.failures());
    }

    /// Renders `elements` in order, handing each finished report to
    /// `on_report`. The same `interrupt` future is watched for the whole run,
    /// so it also catches an interrupt raised between two elements. Returns
    /// the reports produced (the last one possibly partial) and whether the
    /// run was interrupted.
    pub async fn render_all<I, F>(
        &self,
        elements: &[NetworkElement],
        interrupt: I,
        mut on_report: F,
    ) -> (Vec<Report>, bool)
    where
        I: Future,
        F: FnMut(&Report),
    {
        tokio::pin!(interrupt);
        let mut reports = Vec::with_capacity(elements.len());

        for element in elements {
            let mut report = Report::new(element.name());
            let interrupted = tokio::select! {
                biased;
                _ = &mut interrupt => true,
                () = self.render_into(element, &mut report) => false,
            };

            if !report.lines.is_empty() {
                on_report(&report);
                reports.push(report);
            }
            if interrupted {
                log::warn!("interrupted while rendering {}", element.name());
                return (reports, true);
            }
        }

        (reports, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_lines_with_newlines() {
        let mut report = Report::new("example.com");
        report.push(Section::Header, true, "Element: example.com".into());
        report.push(Section::Header, true, "Type: Router".into());
        assert_eq!(report.to_string(), "Element: example.com\nType: Router");
        assert_eq!(report.sections(), vec![Section::Header]);
    }

    #[test]
    fn test_failures_are_counted() {
        let mut report = Report::new("example.com");
        report.push_result(Section::Urls, "URL http://x", &ProbeResult::failure("refused"));
        report.push_result(Section::Ports, "Port t80", &ProbeResult::success("open"));
        assert_eq!(report.failures(), 1);
        assert_eq!(report.lines[0].text, "URL http://x: refused");
    }

    #[test]
    fn test_timeout_override_leaves_socket_budget() {
        let config = ProbeConfig::default().with_timeout(Some(Duration::from_secs(2)));
        assert_eq!(config.dns_timeout, Duration::from_secs(2));
        assert_eq!(config.http_timeout, Duration::from_secs(2));
        assert_eq!(config.socket_timeout, Duration::from_secs(3));

        assert_eq!(ProbeConfig::default().with_timeout(None), ProbeConfig::default());
    }
}
