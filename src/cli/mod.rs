use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sleuth")]
#[command(about = "On-demand diagnostics for network elements: DNS, ping, sockets, HTTP and SSH")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// DNS and HTTP timeout in seconds (socket and SSH connect timeouts are fixed)
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Resolve DNS records through the given nameservers")]
    Dns {
        node: String,
        #[arg(short, long = "server", default_value = "8.8.8.8")]
        servers: Vec<String>,
        /// a, mx or ptr
        #[arg(short, long, default_value = "a")]
        record_type: String,
    },
    #[command(about = "Measure packet loss and latency with ICMP echoes")]
    Ping {
        node: String,
        #[arg(short, long, default_value_t = crate::network::DEFAULT_COUNT)]
        count: u32,
        #[arg(short, long, default_value_t = crate::network::DEFAULT_MTU)]
        mtu: u32,
    },
    #[command(about = "Check a TCP or UDP port, written as t80 or u53")]
    Socket { node: String, port: String },
    #[command(about = "Fetch the HTTP status code of a URL")]
    HttpCode { url: String },
    #[command(about = "Trace HTTP status lines and redirects of a URL")]
    HttpHeader {
        url: String,
        /// Host header to present, e.g. when the URL addresses the server by IP
        #[arg(long)]
        host_header: Option<String>,
    },
    #[command(about = "Run a command on a remote host over SSH")]
    Ssh {
        node: String,
        #[arg(short, long)]
        username: String,
        #[arg(long, env = "SLEUTH_SSH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    #[command(about = "Render full reports for network elements")]
    Element {
        /// JSON file with one element definition or an array of them;
        /// the built-in sample element is used when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long, default_value_t = crate::network::DEFAULT_COUNT)]
        count: u32,
        #[arg(short, long, default_value_t = crate::network::DEFAULT_MTU)]
        mtu: u32,
    },
}
