//! Bounded fan-out of one pipeline per server, and fan-in of their reports.
//!
//! Every server gets its own tokio task right away. A semaphore sized to the
//! effective parallelism admits at most that many pipelines at a time, in FIFO
//! order. Finished pipelines send their report over a flume channel, and the
//! caller collects exactly one report per server in completion order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::command::{Command, CommandContext};
use crate::output::Output;
use crate::pipeline::run_pipeline;
use crate::report::DeployReport;
use crate::server::ServerConfig;

/// Clamps the configured cap to the fleet size. Zero means "all at once".
pub fn effective_parallelism(cap: usize, servers: usize) -> usize {
    if cap == 0 || cap > servers {
        servers
    } else {
        cap
    }
}

/// Spawns an async task that waits for admission, then runs the pipeline for `server`.
pub fn spawn_pipeline(
    ctx: CommandContext,
    server: ServerConfig,
    commands: Arc<[Command]>,
    gate: Arc<Semaphore>,
    report_tx: flume::Sender<DeployReport>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // The gate is never closed, so this only ever waits.
        let permit = gate.acquire_owned().await.ok();
        debug!(server = %server, "admitted");
        let report = run_pipeline(&ctx, &server, &commands).await;
        drop(permit);

        // The receiver only goes away once every report arrived.
        let _ = report_tx.send_async(report).await;
    })
}

/// Receives `expected` reports, echoing each summary as it arrives. The summary
/// already names the server, so it goes out as a notice.
pub async fn collect_reports(
    report_rx: flume::Receiver<DeployReport>,
    expected: usize,
    output: &dyn Output,
) -> Vec<DeployReport> {
    let mut reports = Vec::with_capacity(expected);
    while reports.len() < expected {
        match report_rx.recv_async().await {
            Ok(report) => {
                output.notice(&report.to_string());
                reports.push(report);
            }
            Err(_) => {
                warn!(
                    received = reports.len(),
                    expected, "report channel closed early"
                );
                break;
            }
        }
    }
    reports
}

/// Runs `commands` against every server with at most `cap` pipelines in flight.
pub async fn run_all(
    ctx: &CommandContext,
    servers: &[ServerConfig],
    commands: Arc<[Command]>,
    cap: usize,
) -> Vec<DeployReport> {
    let parallel = effective_parallelism(cap, servers.len());
    debug!(servers = servers.len(), parallel, "launching pipelines");

    let gate = Arc::new(Semaphore::new(parallel));
    let (report_tx, report_rx) = flume::bounded(servers.len());

    let mut tasks = Vec::with_capacity(servers.len());
    for server in servers {
        tasks.push(spawn_pipeline(
            ctx.clone(),
            server.clone(),
            Arc::clone(&commands),
            Arc::clone(&gate),
            report_tx.clone(),
        ));
    }
    drop(report_tx);

    let reports = collect_reports(report_rx, servers.len(), ctx.output.as_ref()).await;
    join_all(tasks).await;
    reports
}
