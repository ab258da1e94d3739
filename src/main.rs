use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use sleuth::cli::{Cli, Commands};
use sleuth::dns::check_dns;
use sleuth::element::{load_elements, NetworkElement};
use sleuth::http::{HeaderProbe, HttpStatusProbe};
use sleuth::network::{check_socket, IcmpProbe};
use sleuth::remote::RemoteCommandProbe;
use sleuth::report::{LiveProbes, ProbeConfig, Report, ReportAssembler, Section};
use sleuth::utils::{self, ProbeResult};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

const EXIT_PROBE_FAILED: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let config = ProbeConfig::default().with_timeout(cli.timeout.map(Duration::from_secs));
    let json = cli.json;

    let code = match cli.command {
        Commands::Element { file, count, mtu } => {
            handle_elements(file, count, mtu, config, json).await
        }
        Commands::Dns {
            node,
            servers,
            record_type,
        } => {
            let target = format!("{node} ({})", record_type.to_uppercase());
            let probe = check_dns(&node, &servers, &record_type, config.dns_timeout);
            handle_probe("dns", &target, probe, json).await
        }
        Commands::Ping { node, count, mtu } => {
            let probe = IcmpProbe::new(&node).with_count(count).with_mtu(mtu);
            handle_probe("ping", &node, probe.run(), json).await
        }
        Commands::Socket { node, port } => {
            let target = format!("{node} {port}");
            let probe = check_socket(&node, &port, config.socket_timeout);
            handle_probe("socket", &target, probe, json).await
        }
        Commands::HttpCode { url } => {
            let probe = HttpStatusProbe::new(&url).with_timeout(config.http_timeout);
            handle_probe("http-code", &url, probe.run(), json).await
        }
        Commands::HttpHeader { url, host_header } => {
            let probe = HeaderProbe::new(&url)
                .with_host_header(host_header)
                .with_timeout(config.http_timeout);
            handle_probe("http-header", &url, probe.run(), json).await
        }
        Commands::Ssh {
            node,
            username,
            password,
            command,
        } => {
            let target = format!("{username}@{node}");
            let probe = RemoteCommandProbe::new(username, password, node, command.join(" "))
                .with_timeout(config.ssh_timeout);
            handle_probe("ssh", &target, probe.run(), json).await
        }
    };

    std::process::exit(code);
}

async fn handle_probe<F>(probe: &str, target: &str, run: F, json: bool) -> i32
where
    F: Future<Output = ProbeResult>,
{
    let (duration, result) = tokio::select! {
        outcome = utils::measure_time(move || run) => outcome,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Interrupted".yellow().bold());
            return EXIT_INTERRUPTED;
        }
    };

    if json {
        #[derive(Serialize)]
        struct JsonProbe<'a> {
            probe: &'a str,
            target: &'a str,
            duration_ms: u128,
            #[serde(flatten)]
            result: &'a ProbeResult,
        }

        print_json(&JsonProbe {
            probe,
            target,
            duration_ms: duration.as_millis(),
            result: &result,
        });
    } else {
        print_probe_human(probe, target, duration, &result);
    }

    if result.is_success() {
        0
    } else {
        EXIT_PROBE_FAILED
    }
}

async fn handle_elements(
    file: Option<PathBuf>,
    count: u32,
    mtu: u32,
    config: ProbeConfig,
    json: bool,
) -> i32 {
    let loaded = match &file {
        Some(path) => load_elements(path),
        None => NetworkElement::sample().map(|element| vec![element]),
    };
    let elements = match loaded {
        Ok(elements) => elements,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return EXIT_CONFIG;
        }
    };

    let assembler = ReportAssembler::new(LiveProbes::new(config)).with_icmp(count, mtu);
    let progress = (!json).then(|| progress_bar(elements.len()));

    let (reports, interrupted) = assembler
        .render_all(&elements, tokio::signal::ctrl_c(), |report| {
            if let Some(pb) = &progress {
                pb.suspend(|| print_report_human(report));
                pb.inc(1);
            }
        })
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    if json {
        #[derive(Serialize)]
        struct JsonReports<'a> {
            reports: &'a [Report],
            interrupted: bool,
        }

        print_json(&JsonReports {
            reports: &reports,
            interrupted,
        });
    } else if interrupted {
        println!("{}", "Interrupted: remaining probes skipped".yellow().bold());
    }

    if interrupted {
        EXIT_INTERRUPTED
    } else if reports.iter().any(|report| report.failures() > 0) {
        EXIT_PROBE_FAILED
    } else {
        0
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Probing elements...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_probe_human(probe: &str, target: &str, duration: Duration, result: &ProbeResult) {
    let status = if result.is_success() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    let duration_str = utils::format_duration(duration);

    println!("{} {} {} ({})", status, probe, target, duration_str.cyan());
    match result {
        ProbeResult::Success { payload } if !payload.is_empty() => {
            println!("  ✓ {}", payload.green())
        }
        ProbeResult::Success { .. } => {}
        ProbeResult::Failure { reason } => println!("  ✗ {}", reason.red()),
    }
}

fn print_report_human(report: &Report) {
    println!("{}", "=".repeat(80).blue());
    for line in &report.lines {
        match line.section {
            Section::Header => println!("{}", line.text.bold()),
            _ if line.success => println!("  {}", line.text),
            _ => println!("  {}", line.text.red()),
        }
    }
    println!("{}", "-".repeat(80).blue());

    let failures = report.failures();
    if failures > 0 {
        println!(
            "{}: {} of {} line(s) failed",
            report.element.bold(),
            failures.to_string().red().bold(),
            report.lines.len()
        );
    } else {
        println!("{}: {}", report.element.bold(), "all probes passed".green().bold());
    }
    println!();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} failed to serialize output: {}", "error:".red().bold(), e),
    }
}
