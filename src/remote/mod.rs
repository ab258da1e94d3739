//! Remote command execution over SSH.
//!
//! Delegates to the system `ssh` client driven by `sshpass`, with the
//! password handed over through `SSHPASS` so it never shows up in the
//! process list. Host keys are neither checked nor recorded.

use crate::utils::{normalize, require_host, require_non_empty, ProbeError, ProbeResult, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(9);
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RemoteCommandProbe {
    pub username: String,
    password: String,
    pub node: String,
    pub command: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteCommandProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommandProbe")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("node", &self.node)
            .field("command", &self.command)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteCommandProbe {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        node: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            node: node.into(),
            command: command.into(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self) -> ProbeResult {
        let label = format!("ssh probe {}@{}", self.username, self.node);
        normalize(&label, || self.check()).await
    }

    fn build_command(&self, username: &str, node: &str, command: &str) -> Command {
        let mut cmd = Command::new("sshpass");
        cmd.env("SSHPASS", &self.password)
            .arg("-e")
            .arg("ssh")
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", CONNECT_TIMEOUT.as_secs()))
            .arg(format!("{username}@{node}"))
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    pub async fn check(&self) -> Result<String> {
        let username = require_username(&self.username)?;
        let node = require_host("node", &self.node)?;
        let command = require_non_empty("command", &self.command)?;

        let output = timeout(self.timeout, self.build_command(username, node, command).output())
            .await
            .map_err(|_| {
                ProbeError::Timeout(format!(
                    "ssh to {node} did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ProbeError::Process(format!("failed to run sshpass/ssh: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ProbeError::Process(describe_exit(output.status.code(), stderr.trim())))
        }
    }
}

/// The login part of `user@node`: no leading `-`, no `@`, no whitespace.
fn require_username(value: &str) -> Result<&str> {
    let username = require_non_empty("username", value)?;
    if username.starts_with('-') || username.contains('@') || username.contains(char::is_whitespace) {
        return Err(ProbeError::validation(format!(
            "username must not start with '-' or contain '@' or spaces, received {username:?}"
        )));
    }
    Ok(username)
}

/// sshpass reports its own failures through reserved exit codes; anything
/// else is the remote command's (or ssh's 255) status.
fn describe_exit(code: Option<i32>, stderr: &str) -> String {
    let cause = match code {
        Some(5) => "authentication failed".to_string(),
        Some(6) => "host key verification failed".to_string(),
        Some(255) => "ssh connection failed".to_string(),
        Some(code) => format!("command exited with status {code}"),
        None => "ssh terminated by signal".to_string(),
    };
    if stderr.is_empty() {
        cause
    } else {
        format!("{cause}: {stderr}")
    }
}
