//! easydeploy: Replay a deployment command list against a fleet of SSH hosts.

// Serde helper module.
mod serde;
// Command line arguments.
pub mod config;
// Error handling.
pub mod error;
// How to parse and represent target servers.
pub mod server;
// Deployment commands.
pub mod command;
// Boundary to the machinery that reaches the servers.
pub mod transport;
// Default transport over openssh and scp.
pub mod session;
// Where progress lines go.
pub mod output;
// Sequential per-server execution.
pub mod pipeline;
// Per-server outcome.
pub mod report;
// Bounded fan-out and fan-in.
pub mod scheduler;
// Registration and lifecycle hooks.
pub mod deployer;
// Plan files.
pub mod plan;

#[cfg(test)]
mod testing;

pub use command::{Command, CommandContext, CommandKind};
pub use config::Config;
pub use deployer::Deployer;
pub use error::DeployError;
pub use output::{ConsoleOutput, MemoryOutput, Output};
pub use pipeline::run_pipeline;
pub use plan::Plan;
pub use report::DeployReport;
pub use scheduler::{effective_parallelism, run_all};
pub use server::ServerConfig;
pub use session::SshTransport;
pub use transport::{LineSink, Transport};
