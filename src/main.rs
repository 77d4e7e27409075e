use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use easydeploy::{Config, DeployError, Plan, SshTransport};

fn init_logging(verbose: bool) {
    let default = if verbose {
        "easydeploy=debug"
    } else {
        "easydeploy=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), DeployError> {
    let cli = Config::parse();
    init_logging(cli.verbose);

    let mut plan = Plan::load(&cli.plan)?;
    cli.apply(&mut plan);
    let deployer = plan.into_deployer(Arc::new(SshTransport::new()))?;

    if cli.check {
        eprintln!(
            "[easydeploy] {} is valid: {} servers, {} commands",
            cli.plan,
            deployer.servers().len(),
            deployer.commands().len()
        );
        return Ok(());
    }

    let reports = deployer.start().await;
    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    eprintln!(
        "[easydeploy] {}/{} servers deployed successfully",
        reports.len() - failed,
        deployer.servers().len()
    );
    if failed > 0 || reports.len() < deployer.servers().len() {
        std::process::exit(1);
    }
    Ok(())
}
