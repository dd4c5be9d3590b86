// trackbenchd: standalone entry point.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackbench_daemon::config::DaemonConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load().context("failed to load configuration")?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(project_root = %config.project_root.display(), "starting trackbench daemon");
    trackbench_daemon::runtime::run(config).await.context("daemon terminated unexpectedly")
}
