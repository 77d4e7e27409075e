//! The deployment facade.
//!
//! Servers, commands and hooks are registered through `&mut self`. `start` only
//! borrows `&self`, so nothing can be registered while a run is in progress.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::command::{Command, CommandContext};
use crate::error::DeployError;
use crate::output::{ConsoleOutput, Output};
use crate::report::DeployReport;
use crate::scheduler::run_all;
use crate::server::ServerConfig;
use crate::session::SshTransport;
use crate::transport::Transport;

type BeforeHook = Box<dyn Fn() -> BoxFuture<'static, Result<(), DeployError>> + Send + Sync>;
type DoneHook = Box<dyn Fn(bool) -> BoxFuture<'static, Result<(), DeployError>> + Send + Sync>;

pub struct Deployer {
    servers: Vec<ServerConfig>,
    commands: Vec<Command>,
    /// Maximum number of pipelines in flight. Zero means one per server.
    parallel: usize,
    verbose: bool,
    timeout: Option<Duration>,
    once_before: Option<BeforeHook>,
    once_done: Option<DoneHook>,
    transport: Arc<dyn Transport>,
    /// Falls back to a `ConsoleOutput` colored for the registered servers.
    output: Option<Arc<dyn Output>>,
}

impl Default for Deployer {
    fn default() -> Self {
        Self::new(SshTransport::new())
    }
}

impl Deployer {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            servers: Vec::new(),
            commands: Vec::new(),
            parallel: 0,
            verbose: false,
            timeout: None,
            once_before: None,
            once_done: None,
            transport,
            output: None,
        }
    }

    pub fn output(&mut self, output: Arc<dyn Output>) -> &mut Self {
        self.output = Some(output);
        self
    }

    /// Registers a server. An empty port becomes 22, and a port that is not a
    /// number is rejected here rather than when the run reaches it.
    pub fn server(&mut self, server: ServerConfig) -> Result<&mut Self, DeployError> {
        self.servers.push(server.validate()?);
        Ok(self)
    }

    /// Registers a server given as `user@host:port/password`.
    pub fn parse_server(&mut self, server: &str) -> Result<&mut Self, DeployError> {
        let server: ServerConfig = server.parse()?;
        self.server(server)
    }

    /// Appends a command. The returned handle can still mark it sensitive.
    pub fn command(&mut self, command: Command) -> &mut Command {
        let index = self.commands.len();
        self.commands.push(command);
        &mut self.commands[index]
    }

    pub fn local(&mut self, command: &str) -> Result<&mut Command, DeployError> {
        Ok(self.command(Command::local(command)?))
    }

    pub fn remote(&mut self, command: &str) -> Result<&mut Command, DeployError> {
        Ok(self.command(Command::remote(command)?))
    }

    pub fn upload(&mut self, local: &str, remote: &str) -> Result<&mut Command, DeployError> {
        Ok(self.command(Command::upload(local, remote)?))
    }

    pub fn download(&mut self, remote: &str, local: &str) -> Result<&mut Command, DeployError> {
        Ok(self.command(Command::download(remote, local)?))
    }

    pub fn custom<F, Fut>(&mut self, name: &str, handler: F) -> &mut Command
    where
        F: Fn(CommandContext, ServerConfig) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
    {
        self.command(Command::custom(name, handler))
    }

    pub fn parallel(&mut self, parallel: usize) -> &mut Self {
        self.parallel = parallel;
        self
    }

    pub fn verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    pub fn timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Runs once before any pipeline. An error cancels the whole run.
    pub fn once_before<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
    {
        self.once_before = Some(Box::new(move || hook().boxed()));
        self
    }

    /// Runs once after every server reported, or after `once_before` failed.
    ///
    /// The flag is `true` only when `once_before` succeeded and every server
    /// finished without error.
    pub fn once_done<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(bool) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
    {
        self.once_done = Some(Box::new(move |ok: bool| hook(ok).boxed()));
        self
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Deploys to every server and returns one report per server, in completion
    /// order. The list is empty when `once_before` failed.
    pub async fn start(&self) -> Vec<DeployReport> {
        let output = match &self.output {
            Some(output) => Arc::clone(output),
            None => Arc::new(ConsoleOutput::for_servers(&self.servers)),
        };

        if let Some(before) = &self.once_before {
            if let Err(e) = before().await {
                output.notice(&format!("OnceBefore hook failed, nothing deployed: {}", e));
                self.finish(false, output.as_ref()).await;
                return Vec::new();
            }
        }

        let ctx = CommandContext {
            transport: Arc::clone(&self.transport),
            output: Arc::clone(&output),
            verbose: self.verbose,
            timeout: self.timeout,
        };
        let reports = run_all(&ctx, &self.servers, self.commands.clone().into(), self.parallel).await;

        let ok = reports.iter().all(DeployReport::is_ok);
        self.finish(ok, output.as_ref()).await;
        reports
    }

    async fn finish(&self, ok: bool, output: &dyn Output) {
        debug!(ok, "deployment finished");
        if let Some(done) = &self.once_done {
            if let Err(e) = done(ok).await {
                output.notice(&format!("OnceDone hook failed: {}", e));
            }
        }
    }
}
