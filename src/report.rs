use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::DeployError;
use crate::server::ServerConfig;

/// Outcome of replaying the command list against one server.
#[derive(Debug)]
pub struct DeployReport {
    pub server: ServerConfig,
    /// The first error, if any command failed.
    pub error: Option<DeployError>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Commands that ran, including the one that failed.
    pub attempted: usize,
    /// Commands registered.
    pub total: usize,
}

impl DeployReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// `=== user@host:port === 2/3 commands, FAIL, 1.25s: <error>`
impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "=== {} === {}/{} commands, {}, {:.2}s",
            self.server,
            self.attempted,
            self.total,
            if self.is_ok() { "OK" } else { "FAIL" },
            self.elapsed.as_secs_f64(),
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}
