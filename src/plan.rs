//! Deployment plan files.
//!
//! A plan lists the servers, the commands and the run options in YAML. Servers are
//! either compact `user@host:port/password` strings or mappings. Commands are either
//! bare strings, which run remotely, or mappings naming exactly one kind.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use void::Void;

use crate::command::Command;
use crate::deployer::Deployer;
use crate::error::DeployError;
use crate::serde::string_or_mapping;
use crate::server::ServerConfig;
use crate::transport::Transport;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// Maximum number of servers deployed at once. Zero deploys all at once.
    #[serde(default)]
    pub parallel: usize,
    #[serde(default)]
    pub verbose: bool,
    /// Per-call timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    servers: Vec<ServerEntry>,
    #[serde(default)]
    commands: Vec<CommandEntry>,
    /// Local shell command run before any server is touched.
    #[serde(default)]
    once_before: Option<String>,
    /// Local shell command run at the end, with `DEPLOY_OK` exported.
    #[serde(default)]
    once_done: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerEntry(#[serde(deserialize_with = "string_or_mapping")] ServerConfig);

#[derive(Debug, Deserialize)]
struct CommandEntry(#[serde(deserialize_with = "string_or_mapping")] CommandSpec);

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandSpec {
    local: Option<String>,
    remote: Option<String>,
    upload: Option<Transfer>,
    download: Option<Transfer>,
    #[serde(default)]
    sensitive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Transfer {
    local: String,
    remote: String,
}

impl FromStr for CommandSpec {
    type Err = Void;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            remote: Some(s.to_string()),
            ..Default::default()
        })
    }
}

impl CommandSpec {
    fn into_command(self, index: usize) -> Result<Command, DeployError> {
        let mut command = match (self.local, self.remote, self.upload, self.download) {
            (Some(local), None, None, None) => Command::local(local)?,
            (None, Some(remote), None, None) => Command::remote(remote)?,
            (None, None, Some(upload), None) => Command::upload(&upload.local, &upload.remote)?,
            (None, None, None, Some(download)) => {
                Command::download(&download.remote, &download.local)?
            }
            _ => {
                return Err(DeployError::Plan(format!(
                    "command {} must set exactly one of local, remote, upload or download",
                    index
                )))
            }
        };
        if self.sensitive {
            command.mark_sensitive();
        }
        Ok(command)
    }
}

impl FromStr for Plan {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).map_err(|e| DeployError::Plan(e.to_string()))
    }
}

impl Plan {
    pub fn load(path: &str) -> Result<Self, DeployError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DeployError::Plan(format!("failed to read {}: {}", path, e)))?;
        text.parse()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Validates every entry and registers it, in order, on a new `Deployer`.
    pub fn into_deployer(self, transport: Arc<dyn Transport>) -> Result<Deployer, DeployError> {
        let timeout = self.timeout.map(Duration::from_secs);
        let mut deployer = Deployer::with_transport(Arc::clone(&transport));
        deployer
            .parallel(self.parallel)
            .verbose(self.verbose)
            .timeout(timeout);

        for ServerEntry(server) in self.servers {
            deployer.server(server)?;
        }
        for (index, CommandEntry(spec)) in self.commands.into_iter().enumerate() {
            deployer.command(spec.into_command(index)?);
        }

        if let Some(command) = self.once_before {
            if command.trim().is_empty() {
                return Err(DeployError::BlankCommand("once_before"));
            }
            let transport = Arc::clone(&transport);
            deployer.once_before(move || {
                let transport = Arc::clone(&transport);
                let command = command.clone();
                async move { transport.local(&command, timeout, None).await }
            });
        }
        if let Some(command) = self.once_done {
            if command.trim().is_empty() {
                return Err(DeployError::BlankCommand("once_done"));
            }
            deployer.once_done(move |ok| {
                let transport = Arc::clone(&transport);
                let command = format!("export DEPLOY_OK={}; {}", ok, command);
                async move { transport.local(&command, timeout, None).await }
            });
        }

        Ok(deployer)
    }
}
