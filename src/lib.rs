pub mod cli;
pub mod dns;
pub mod element;
pub mod http;
pub mod network;
pub mod remote;
pub mod report;
pub mod utils;

pub use element::{load_elements, ElementError, NetworkElement};
pub use report::{LiveProbes, ProbeConfig, Probes, Report, ReportAssembler, Section};
pub use utils::{ProbeError, ProbeResult};
