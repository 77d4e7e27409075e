//! The boundary to whatever actually reaches the servers.
//!
//! Commands never open connections themselves. They call into a `Transport`, which
//! lets tests swap in a mock and lets embedders bring their own SSH stack.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::DeployError;
use crate::server::ServerConfig;

/// Receives output lines as the underlying process produces them.
pub type LineSink<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs a shell command on this machine.
    async fn local(
        &self,
        command: &str,
        timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError>;

    /// Runs a shell command on `server`.
    async fn remote(
        &self,
        server: &ServerConfig,
        command: &str,
        timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError>;

    /// Copies `local` on this machine to `remote` on `server`.
    async fn upload(
        &self,
        server: &ServerConfig,
        local: &str,
        remote: &str,
        timeout: Option<Duration>,
    ) -> Result<(), DeployError>;

    /// Copies `remote` on `server` to `local` on this machine.
    async fn download(
        &self,
        server: &ServerConfig,
        remote: &str,
        local: &str,
        timeout: Option<Duration>,
    ) -> Result<(), DeployError>;
}

/// Runs `fut` under the optional per-call deadline.
pub async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    Deadline::after(timeout).run(fut).await
}

/// One time budget shared by every step of a single transport call, so that
/// connecting and running together never exceed the configured timeout.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Option<Duration>,
    at: Option<Instant>,
}

impl Deadline {
    pub fn after(limit: Option<Duration>) -> Self {
        Self {
            limit,
            at: limit.map(|limit| Instant::now() + limit),
        }
    }

    /// Runs `fut`, failing with `DeployError::Timeout` once the budget is spent.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, DeployError>>,
    {
        match (self.at, self.limit) {
            (Some(at), Some(limit)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| DeployError::Timeout(limit))?,
            _ => fut.await,
        }
    }
}
