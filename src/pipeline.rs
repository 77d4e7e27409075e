//! Replays the command list against one server, stopping at the first failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::DeployError;
use crate::report::DeployReport;
use crate::server::ServerConfig;

pub async fn run_pipeline(
    ctx: &CommandContext,
    server: &ServerConfig,
    commands: &[Command],
) -> DeployReport {
    let started_at = Utc::now();
    let start = Instant::now();
    let mut attempted = 0;
    let mut error = None;

    for command in commands {
        attempted += 1;
        // A panicking custom command fails this server only.
        match AssertUnwindSafe(command.run(ctx, server)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error = Some(e);
                break;
            }
            Err(panic) => {
                error = Some(DeployError::Panicked(panic_message(panic)));
                break;
            }
        }
    }

    debug!(server = %server, attempted, failed = error.is_some(), "pipeline finished");
    DeployReport {
        server: server.clone(),
        error,
        started_at,
        elapsed: start.elapsed(),
        attempted,
        total: commands.len(),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
