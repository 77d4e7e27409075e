//! Default `Transport`.
//!
//! Remote commands go through an `openssh` native-mux session that lives for the
//! duration of one call. Local commands run under `sh -c`. Transfers shell out to
//! `scp`, since openssh only multiplexes commands.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join;
use openssh::{KnownHosts, SessionBuilder, Stdio as RemoteStdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as Process;
use tracing::{debug, warn};

use crate::error::DeployError;
use crate::server::ServerConfig;
use crate::transport::{with_timeout, Deadline, LineSink, Transport};

/// How many trailing stderr lines a failed command carries in its error.
const STDERR_TAIL: usize = 10;

#[derive(Debug, Default, Clone)]
pub struct SshTransport;

impl SshTransport {
    pub fn new() -> Self {
        Self
    }

    async fn connect(&self, server: &ServerConfig) -> Result<openssh::Session, DeployError> {
        if !server.password.is_empty() {
            warn!(
                server = %server,
                "password authentication is not supported, relying on keys and the SSH agent"
            );
        }
        let mut builder = SessionBuilder::default();
        builder
            .user(server.user.clone())
            .port(server.port_number()?)
            .known_hosts_check(KnownHosts::Add);
        if !server.key.is_empty() {
            builder.keyfile(&server.key);
        }
        debug!(server = %server, "connecting");
        Ok(builder.connect_mux(&server.host).await?)
    }

    async fn scp(
        &self,
        server: &ServerConfig,
        from: String,
        to: String,
        timeout: Option<Duration>,
    ) -> Result<(), DeployError> {
        let mut process = Process::new("scp");
        process
            .arg("-r")
            .arg("-P")
            .arg(server.port_number()?.to_string())
            .args(["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"]);
        if !server.key.is_empty() {
            process.arg("-i").arg(&server.key);
        }
        process.arg(from).arg(to);
        with_timeout(timeout, run_process(process, None)).await
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn local(
        &self,
        command: &str,
        timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError> {
        let mut process = Process::new("sh");
        process.arg("-c").arg(command);
        with_timeout(timeout, run_process(process, on_line)).await
    }

    async fn remote(
        &self,
        server: &ServerConfig,
        command: &str,
        timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError> {
        let deadline = Deadline::after(timeout);
        let session = deadline.run(self.connect(server)).await?;
        let result = deadline
            .run(async {
                let mut process = session.shell(command);
                let stdout = if on_line.is_some() {
                    RemoteStdio::piped()
                } else {
                    RemoteStdio::null()
                };
                process
                    .stdin(RemoteStdio::null())
                    .stdout(stdout)
                    .stderr(RemoteStdio::piped());
                let mut child = process.spawn().await?;
                let stdout = child.stdout().take();
                let stderr = child.stderr().take();
                let (_, tail) = join(
                    stream(stdout, on_line, 0),
                    stream(stderr, on_line, STDERR_TAIL),
                )
                .await;
                check(child.wait().await?, tail)
            })
            .await;
        if let Err(e) = session.close().await {
            warn!(server = %server, "error while terminating session: {}", e);
        }
        result
    }

    async fn upload(
        &self,
        server: &ServerConfig,
        local: &str,
        remote: &str,
        timeout: Option<Duration>,
    ) -> Result<(), DeployError> {
        let to = format!("{}@{}:{}", server.user, server.host, remote);
        self.scp(server, local.to_string(), to, timeout).await
    }

    async fn download(
        &self,
        server: &ServerConfig,
        remote: &str,
        local: &str,
        timeout: Option<Duration>,
    ) -> Result<(), DeployError> {
        let from = format!("{}@{}:{}", server.user, server.host, remote);
        self.scp(server, from, local.to_string(), timeout).await
    }
}

/// Runs a local process to completion. Stderr is always read so that a failure
/// can say why. Stdout is only read when somebody listens.
async fn run_process(mut process: Process, on_line: LineSink<'_>) -> Result<(), DeployError> {
    let stdout = if on_line.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    process
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = process.spawn()?;
    let (_, tail) = join(
        stream(child.stdout.take(), on_line, 0),
        stream(child.stderr.take(), on_line, STDERR_TAIL),
    )
    .await;
    check(child.wait().await?, tail)
}

fn check(status: ExitStatus, stderr: VecDeque<String>) -> Result<(), DeployError> {
    if status.success() {
        Ok(())
    } else {
        Err(DeployError::Exit {
            status,
            stderr: Vec::from(stderr).join("\n"),
        })
    }
}

/// Forwards every line of `stream` to `on_line` as soon as it is complete, and
/// returns the last `keep` lines.
async fn stream<B: AsyncRead + Unpin>(
    stream: Option<B>,
    on_line: LineSink<'_>,
    keep: usize,
) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(keep);
    let Some(stream) = stream else {
        return tail;
    };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(reader.buffer().len());
    loop {
        buf.clear();
        if let Err(e) = read_line(&mut reader, &mut buf).await {
            debug!("stopped reading command output: {}", e);
            break;
        }
        // An empty buffer means that EOF was reached.
        if buf.is_empty() {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        // "\r\n" yields an empty second line.
        if line.is_empty() {
            continue;
        }
        if let Some(on_line) = on_line {
            on_line(line);
        }
        if keep > 0 {
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }
    tail
}

/// Reads into `buf` until either `\r` or `\n` is met, delimiter included.
async fn read_line<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(b'\r', b'\n', available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}
