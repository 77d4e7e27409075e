//! Deployment commands.
//!
//! A `Command` is registered once and replayed against every server. Validation
//! happens when it is built, so a blank command or path never reaches the transport.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::error::DeployError;
use crate::output::Output;
use crate::server::ServerConfig;
use crate::transport::{LineSink, Transport};

/// Everything a command may use while it runs. Cheap to clone.
#[derive(Clone)]
pub struct CommandContext {
    pub transport: Arc<dyn Transport>,
    pub output: Arc<dyn Output>,
    /// Stream output lines of local and remote commands through `output`.
    pub verbose: bool,
    /// Per-call deadline handed to the transport. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// A caller-supplied action. Its arguments are whatever the closure captured.
pub type Handler =
    Arc<dyn Fn(CommandContext, ServerConfig) -> BoxFuture<'static, Result<(), DeployError>> + Send + Sync>;

#[derive(Clone)]
pub enum CommandKind {
    Local(String),
    Remote(String),
    Upload { local: String, remote: String },
    Download { remote: String, local: String },
    Custom { name: String, handler: Handler },
}

#[derive(Clone)]
pub struct Command {
    kind: CommandKind,
    sensitive: bool,
}

fn required(value: &str, what: &'static str, kind: &'static str) -> Result<String, DeployError> {
    if value.trim().is_empty() {
        Err(DeployError::BlankPath(what, kind))
    } else {
        Ok(value.to_string())
    }
}

impl Command {
    /// A shell command run on the deploying machine, once per server.
    pub fn local(command: impl Into<String>) -> Result<Self, DeployError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(DeployError::BlankCommand("local"));
        }
        Ok(Self::from_kind(CommandKind::Local(command)))
    }

    /// A shell command run on each server.
    pub fn remote(command: impl Into<String>) -> Result<Self, DeployError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(DeployError::BlankCommand("remote"));
        }
        Ok(Self::from_kind(CommandKind::Remote(command)))
    }

    pub fn upload(local: &str, remote: &str) -> Result<Self, DeployError> {
        Ok(Self::from_kind(CommandKind::Upload {
            local: required(local, "local", "upload")?,
            remote: required(remote, "remote", "upload")?,
        }))
    }

    pub fn download(remote: &str, local: &str) -> Result<Self, DeployError> {
        Ok(Self::from_kind(CommandKind::Download {
            remote: required(remote, "remote", "download")?,
            local: required(local, "local", "download")?,
        }))
    }

    /// Wraps an async closure. Errors it returns are ordinary execution errors.
    pub fn custom<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext, ServerConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
    {
        let handler: Handler =
            Arc::new(move |ctx: CommandContext, server: ServerConfig| handler(ctx, server).boxed());
        Self::from_kind(CommandKind::Custom {
            name: name.into(),
            handler,
        })
    }

    fn from_kind(kind: CommandKind) -> Self {
        Self {
            kind,
            sensitive: false,
        }
    }

    /// Stops the command text from being echoed before it runs.
    pub fn mark_sensitive(&mut self) -> &mut Self {
        self.sensitive = true;
        self
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            CommandKind::Local(_) => "local",
            CommandKind::Remote(_) => "remote",
            CommandKind::Upload { .. } => "upload",
            CommandKind::Download { .. } => "download",
            CommandKind::Custom { .. } => "custom",
        }
    }

    pub async fn run(&self, ctx: &CommandContext, server: &ServerConfig) -> Result<(), DeployError> {
        if !self.sensitive {
            ctx.output.line(server, &format!("run {}", self));
        }
        let forward = |line: &str| ctx.output.line(server, line);
        let on_line: LineSink<'_> = if ctx.verbose { Some(&forward) } else { None };

        match &self.kind {
            CommandKind::Local(command) => ctx.transport.local(command, ctx.timeout, on_line).await,
            CommandKind::Remote(command) => {
                ctx.transport
                    .remote(server, command, ctx.timeout, on_line)
                    .await
            }
            CommandKind::Upload { local, remote } => {
                ctx.transport
                    .upload(server, local, remote, ctx.timeout)
                    .await
            }
            CommandKind::Download { remote, local } => {
                ctx.transport
                    .download(server, remote, local, ctx.timeout)
                    .await
            }
            CommandKind::Custom { handler, .. } => handler(ctx.clone(), server.clone()).await,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: ", self.kind_name())?;
        if self.sensitive {
            return write!(f, "<sensitive>");
        }
        match &self.kind {
            CommandKind::Local(command) | CommandKind::Remote(command) => write!(f, "{}", command),
            CommandKind::Upload { local, remote } => write!(f, "{} -> {}", local, remote),
            CommandKind::Download { remote, local } => write!(f, "{} -> {}", remote, local),
            CommandKind::Custom { name, .. } => write!(f, "{}", name),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Command")
            .field("command", &self.to_string())
            .field("sensitive", &self.sensitive)
            .finish()
    }
}
