use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while configuring or running a deployment.
///
/// The first group are configuration errors. They are returned synchronously
/// from constructors and parsers, before any host is contacted. The rest are
/// execution errors and end up in the `DeployReport` of the affected server.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid server string '{0}', expected user@host:port/password")]
    InvalidServer(String),
    #[error("Missing {0} command")]
    BlankCommand(&'static str),
    #[error("Missing {0} path for {1} command")]
    BlankPath(&'static str, &'static str),
    #[error("Invalid port '{port}' for server {server}")]
    InvalidPort { server: String, port: String },
    #[error("Invalid deployment plan: {0}")]
    Plan(String),

    #[error("Failed to connect SSH session or execute SSH command: {0}")]
    Ssh(#[from] openssh::Error),
    #[error("Failed to execute local command: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command exited with {status}{}", stderr_suffix(.stderr))]
    Exit { status: ExitStatus, stderr: String },
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Command panicked: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

impl DeployError {
    /// Shorthand for custom commands and hooks reporting their own failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error was detected before anything ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidServer(_)
                | Self::BlankCommand(_)
                | Self::BlankPath(..)
                | Self::InvalidPort { .. }
                | Self::Plan(_)
        )
    }
}

/// The last stderr lines of a failed command, folded onto the summary line.
fn stderr_suffix(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!(": {}", lines.join("; "))
    }
}
