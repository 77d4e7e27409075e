//! End-to-end tests for easydeploy runs.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use easydeploy::{
    DeployError, Deployer, LineSink, MemoryOutput, Plan, ServerConfig, Transport,
};

/// Record of an executed transport call.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub host: String,
    pub command: String,
}

/// Mock transport that doesn't actually reach any server.
#[derive(Default)]
pub struct MockTransport {
    executed_commands: Mutex<Vec<ExecutedCommand>>,
    /// Calls whose command text equals this fail.
    fail_on: Option<String>,
    delay_ms: u64,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn failing_on(mut self, command: &str) -> Self {
        self.fail_on = Some(command.to_string());
        self
    }

    pub async fn executed_commands(&self) -> Vec<ExecutedCommand> {
        self.executed_commands.lock().await.clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn record(&self, host: &str, command: String) -> Result<(), DeployError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.executed_commands.lock().await.push(ExecutedCommand {
            host: host.to_string(),
            command: command.clone(),
        });
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.as_deref() == Some(command.as_str()) {
            Err(DeployError::failed(format!("{} failed", command)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn local(
        &self,
        command: &str,
        _timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError> {
        if let Some(on_line) = on_line {
            on_line(&format!("local says {}", command));
        }
        self.record("localhost", command.to_string()).await
    }

    async fn remote(
        &self,
        server: &ServerConfig,
        command: &str,
        _timeout: Option<Duration>,
        on_line: LineSink<'_>,
    ) -> Result<(), DeployError> {
        if let Some(on_line) = on_line {
            on_line(&format!("{} says {}", server.host, command));
        }
        self.record(&server.host, command.to_string()).await
    }

    async fn upload(
        &self,
        server: &ServerConfig,
        local: &str,
        remote: &str,
        _timeout: Option<Duration>,
    ) -> Result<(), DeployError> {
        self.record(&server.host, format!("upload {} {}", local, remote))
            .await
    }

    async fn download(
        &self,
        server: &ServerConfig,
        remote: &str,
        local: &str,
        _timeout: Option<Duration>,
    ) -> Result<(), DeployError> {
        self.record(&server.host, format!("download {} {}", remote, local))
            .await
    }
}

/// Deployer over `transport` with `n` servers and a capturing output.
fn deployer(transport: &Arc<MockTransport>, n: usize) -> (Deployer, Arc<MemoryOutput>) {
    let output = Arc::new(MemoryOutput::new());
    let mut deployer = Deployer::with_transport(transport.clone());
    deployer.output(output.clone());
    for i in 0..n {
        deployer
            .parse_server(&format!("deploy@host{}:22/secret", i))
            .unwrap();
    }
    (deployer, output)
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_three_servers_two_at_a_time() {
    let transport = Arc::new(MockTransport::new().with_delay_ms(50));
    let (mut deployer, _) = deployer(&transport, 3);
    deployer.parallel(2);
    deployer.remote("systemctl stop app").unwrap();
    deployer.remote("systemctl start app").unwrap();

    let reports = deployer.start().await;

    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.attempted, 2);
        assert_eq!(report.total, 2);
        assert!(report.error.is_none());
    }
    assert_eq!(transport.peak(), 2);
    assert_eq!(transport.executed_commands().await.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_report_count_ignores_cap() {
    for cap in [0, 1, 4, 100] {
        let transport = Arc::new(MockTransport::new());
        let (mut deployer, _) = deployer(&transport, 4);
        deployer.parallel(cap);
        deployer.remote("uptime").unwrap();
        assert_eq!(deployer.start().await.len(), 4, "cap={}", cap);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_unbounded_runs_everything_at_once() {
    let transport = Arc::new(MockTransport::new().with_delay_ms(100));
    let (mut deployer, _) = deployer(&transport, 4);
    deployer.remote("uptime").unwrap();
    let reports = deployer.start().await;
    assert_eq!(reports.len(), 4);
    assert!(transport.peak() > 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_commands_replay_in_order_per_server() {
    let transport = Arc::new(MockTransport::new());
    let (mut deployer, _) = deployer(&transport, 2);
    deployer.local("make build").unwrap();
    deployer.upload("target/app", "/opt/app").unwrap();
    deployer.remote("/opt/app --version").unwrap();
    deployer.download("/var/log/app.log", "logs/").unwrap();
    deployer.start().await;

    let executed = transport.executed_commands().await;
    for host in ["host0", "host1"] {
        let remote: Vec<_> = executed
            .iter()
            .filter(|e| e.host == host)
            .map(|e| e.command.as_str())
            .collect();
        assert_eq!(
            remote,
            vec![
                "upload target/app /opt/app",
                "/opt/app --version",
                "download /var/log/app.log logs/",
            ]
        );
    }
    // Local commands run once per pipeline.
    assert_eq!(executed.iter().filter(|e| e.host == "localhost").count(), 2);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_pipeline_stops_at_failing_command() {
    let transport = Arc::new(MockTransport::new().failing_on("migrate"));
    let (mut deployer, _) = deployer(&transport, 2);
    deployer.remote("stop").unwrap();
    deployer.remote("migrate").unwrap();
    deployer.remote("start").unwrap();
    deployer.remote("smoke-test").unwrap();

    let reports = deployer.start().await;
    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert_eq!(report.attempted, 2);
        assert_eq!(report.total, 4);
        assert!(
            matches!(report.error, Some(DeployError::Failed(ref m)) if m == "migrate failed")
        );
    }
    let executed = transport.executed_commands().await;
    assert!(!executed
        .iter()
        .any(|e| e.command == "start" || e.command == "smoke-test"));
}

#[tokio::test]
async fn test_e2e_blank_commands_never_reach_transport() {
    let transport = Arc::new(MockTransport::new());
    let (mut deployer, _) = deployer(&transport, 1);
    assert!(matches!(
        deployer.remote(""),
        Err(DeployError::BlankCommand("remote"))
    ));
    assert!(matches!(
        deployer.local(" \t"),
        Err(DeployError::BlankCommand("local"))
    ));
    assert!(deployer.upload("dist", "").is_err());
    assert!(deployer.download("", "logs").is_err());
    assert!(deployer.commands().is_empty());
    assert!(transport.executed_commands().await.is_empty());
}

#[tokio::test]
async fn test_e2e_malformed_server_is_rejected_up_front() {
    let transport = Arc::new(MockTransport::new());
    let (mut deployer, _) = deployer(&transport, 0);
    for bad in ["gaols", "gaols@host", "gaols@host:22"] {
        assert!(matches!(
            deployer.parse_server(bad),
            Err(DeployError::InvalidServer(_))
        ));
    }
    assert!(matches!(
        deployer.parse_server("gaols@host:abc/pw"),
        Err(DeployError::InvalidPort { .. })
    ));
    assert!(deployer.servers().is_empty());

    deployer.parse_server("gaols@host:/pw").unwrap();
    assert_eq!(deployer.servers()[0].port, "22");
}

// =============================================================================
// Hooks
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_before_failure_deploys_nothing() {
    let transport = Arc::new(MockTransport::new());
    let (mut deployer, _) = deployer(&transport, 3);
    deployer.remote("uptime").unwrap();
    deployer.once_before(|| async { Err(DeployError::failed("tests failed")) });
    let done_calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = done_calls.clone();
    deployer.once_done(move |ok| {
        record.lock().unwrap().push(ok);
        async { Ok(()) }
    });

    let reports = deployer.start().await;
    assert!(reports.is_empty());
    assert_eq!(*done_calls.lock().unwrap(), vec![false]);
    assert!(transport.executed_commands().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_done_sees_overall_outcome() {
    let transport = Arc::new(MockTransport::new().failing_on("flaky"));
    let (mut deployer, _) = deployer(&transport, 2);
    deployer.remote("flaky").unwrap();
    let done_calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = done_calls.clone();
    deployer.once_done(move |ok| {
        record.lock().unwrap().push(ok);
        async { Ok(()) }
    });
    assert_eq!(deployer.start().await.len(), 2);
    assert_eq!(*done_calls.lock().unwrap(), vec![false]);
}

// =============================================================================
// Output
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_sensitive_and_verbose_output() {
    let transport = Arc::new(MockTransport::new());
    let (mut deployer, output) = deployer(&transport, 1);
    deployer.verbose(true);
    deployer.remote("echo hello").unwrap();
    deployer.remote("echo hunter2").unwrap().mark_sensitive();
    deployer.start().await;

    let lines = output.lines();
    assert!(lines.contains(&"[deploy@host0:22] run remote: echo hello".to_string()));
    assert!(lines.contains(&"[deploy@host0:22] host0 says echo hello".to_string()));
    assert!(!lines.iter().any(|line| line.contains("run remote: echo hunter2")));
    assert!(lines
        .iter()
        .any(|line| line.starts_with("[easydeploy] === deploy@host0:22 === 2/2 commands, OK")));
    // The password never shows up anywhere.
    assert!(!lines.iter().any(|line| line.contains("secret")));
}

// =============================================================================
// Plan files
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_plan_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
parallel: 1
servers:
  - gaols@192.168.1.100:22/password@**/
  - user: deploy
    host: 192.168.1.101
commands:
  - local: tar czf app.tgz dist
  - upload: { local: app.tgz, remote: /tmp/app.tgz }
  - tar xzf /tmp/app.tgz -C /opt
once_before: make test
once_done: ./notify.sh
"#,
    )
    .unwrap();

    let transport = Arc::new(MockTransport::new());
    let plan = Plan::load(file.path().to_str().unwrap()).unwrap();
    let mut deployer = plan.into_deployer(transport.clone()).unwrap();
    deployer.output(Arc::new(MemoryOutput::new()));
    let reports = deployer.start().await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_ok() && r.attempted == 3));

    let executed = transport.executed_commands().await;
    let local: Vec<_> = executed
        .iter()
        .filter(|e| e.host == "localhost")
        .map(|e| e.command.as_str())
        .collect();
    assert_eq!(local.first(), Some(&"make test"));
    assert_eq!(
        local.last(),
        Some(&"export DEPLOY_OK=true; ./notify.sh")
    );
    assert_eq!(
        executed.iter().filter(|e| e.host == "192.168.1.100").count(),
        2
    );
}
