use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use tailscope_server::{AppContext, BroadcastHub, ServerConfig, start_watcher};
use tailscope_watcher::{ChangeWatcher, WatchTarget};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Watch a file or directory and stream line diffs over WebSocket.
#[derive(Debug, Parser)]
#[command(name = "tailscope", version)]
#[command(group(ArgGroup::new("target").required(true).args(["file", "dir"])))]
struct Cli {
    /// Watch a single file.
    #[arg(short = 'f', long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Watch every file under a directory.
    #[arg(short = 'd', long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Listen address (default: localhost:8081).
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// TOML config file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also watch directories created after startup.
    #[arg(long)]
    follow_new_dirs: bool,
}

/// How long shutdown waits for blocking work, such as a read parked on a
/// stalled file, before the process exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config = config.with_bind_addr(bind);
    }
    if cli.follow_new_dirs {
        config.watcher = config.watcher.register_new_directories();
    }

    let target = WatchTarget::from_options(cli.file, cli.dir)?;
    let hub = BroadcastHub::spawn(config.queue_capacity);

    let mut watcher =
        ChangeWatcher::with_notify(target.clone())?.with_config(config.watcher.clone());
    start_watcher(&mut watcher, &hub)
        .await
        .with_context(|| format!("failed to watch {}", target.path().display()))?;

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    let ctx = Arc::new(AppContext::new(hub, target, config.watcher));
    tokio::select! {
        served = tailscope_server::serve(listener, ctx) => served.context("server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    watcher.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exactly_one_target() {
        let cli = Cli::try_parse_from(["tailscope", "-f", "/tmp/app.log"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("/tmp/app.log")));
        assert!(cli.dir.is_none());

        let cli = Cli::try_parse_from(["tailscope", "--dir", "/var/log", "--follow-new-dirs"])
            .unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/var/log")));
        assert!(cli.follow_new_dirs);

        assert!(Cli::try_parse_from(["tailscope"]).is_err());
        assert!(Cli::try_parse_from(["tailscope", "-f", "a", "-d", "b"]).is_err());
    }
}
