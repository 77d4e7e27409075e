//! Test fixtures shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::{Command, CommandContext};
use crate::error::DeployError;
use crate::output::MemoryOutput;
use crate::server::ServerConfig;
use crate::transport::{LineSink, Transport};

/// Fails every call. Unit tests only run custom commands.
pub struct Offline;

#[async_trait]
impl Transport for Offline {
    async fn local(&self, _: &str, _: Option<Duration>, _: LineSink<'_>) -> Result<(), DeployError> {
        Err(DeployError::failed("offline"))
    }

    async fn remote(
        &self,
        _: &ServerConfig,
        _: &str,
        _: Option<Duration>,
        _: LineSink<'_>,
    ) -> Result<(), DeployError> {
        Err(DeployError::failed("offline"))
    }

    async fn upload(
        &self,
        _: &ServerConfig,
        _: &str,
        _: &str,
        _: Option<Duration>,
    ) -> Result<(), DeployError> {
        Err(DeployError::failed("offline"))
    }

    async fn download(
        &self,
        _: &ServerConfig,
        _: &str,
        _: &str,
        _: Option<Duration>,
    ) -> Result<(), DeployError> {
        Err(DeployError::failed("offline"))
    }
}

pub fn context() -> (Arc<MemoryOutput>, CommandContext) {
    let output = Arc::new(MemoryOutput::new());
    let ctx = CommandContext {
        transport: Arc::new(Offline),
        output: output.clone(),
        verbose: false,
        timeout: None,
    };
    (output, ctx)
}

pub fn servers(n: usize) -> Vec<ServerConfig> {
    (0..n)
        .map(|i| ServerConfig::new("deploy", format!("web{}", i)))
        .collect()
}

/// Counts its invocations and fails when `fail` is set.
pub fn counting(calls: &Arc<AtomicUsize>, fail: bool) -> Command {
    let calls = calls.clone();
    Command::custom("count", move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if fail {
                Err(DeployError::failed("step failed"))
            } else {
                Ok(())
            }
        }
    })
}

/// Tracks how many commands are in flight at once.
#[derive(Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// A command that holds the gauge for `hold`.
    pub fn command(self: &Arc<Self>, hold: Duration) -> Command {
        let gauge = self.clone();
        Command::custom("hold", move |_, _| {
            let gauge = gauge.clone();
            async move {
                let now = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
                gauge.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                gauge.active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }
}
