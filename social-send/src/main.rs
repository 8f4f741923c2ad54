//! social-send - Background daemon for scheduled posting
//!
//! Polls the post store and publishes every scheduled post whose time has
//! come, through the same rate-limited dispatchers `social-post` uses.

use anyhow::{Context, Result};
use clap::Parser;
use libsocialcast::logging::LoggingConfig;
use libsocialcast::service::SocialcastService;
use libsocialcast::{Config, SocialcastError};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "social-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
social-send - Background daemon for scheduled posting

DESCRIPTION:
    social-send is a long-running daemon that watches the Socialcast post
    store and publishes scheduled posts once they are due.

    Every poll it loads the due posts, publishes each one through its
    platform's dispatcher (waiting on the platform's rate limit when the
    window is full), and records the outcome. A post that fails is marked
    failed with the reason and is not retried.

USAGE:
    # Run in foreground (logs to stderr)
    social-send

    # Poll every 30 seconds
    social-send --poll-interval 30

    # Enable verbose logging
    social-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes posts already in flight)

CONFIGURATION:
    Configuration file: ~/.config/socialcast/config.toml
    Database location: ~/.local/share/socialcast/socialcast.db

    [scheduler]
    poll_interval_secs = 60

    [rate_limits.instagram]
    max_calls = 100
    window_secs = 60
    group = \"graph\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
    3 - Invalid arguments
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to check for due posts (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit
    #[arg(long)]
    #[arg(help = "Publish the posts that are due right now, then exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("info", cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Library errors keep their own exit code; anything else is a runtime error
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<SocialcastError>()
        .map(SocialcastError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(seconds) = cli.poll_interval {
        if seconds == 0 {
            return Err(SocialcastError::InvalidInput(
                "--poll-interval must be at least 1 second".to_string(),
            )
            .into());
        }
        config.scheduler.poll_interval_secs = seconds;
    }

    let service = SocialcastService::from_config(config).await?;
    let scheduler = service.scheduler();

    info!("social-send daemon starting");
    info!("Poll interval: {}s", scheduler.poll_interval().as_secs());

    if cli.once {
        let report = scheduler.tick(chrono::Utc::now().timestamp()).await?;
        info!(
            "social-send: processed {} due post(s) once ({} published, {} failed), exiting",
            report.due, report.published, report.failed
        );
        return Ok(());
    }

    scheduler.start().await;
    wait_for_shutdown().await?;

    info!("Shutdown requested, waiting for in-flight posts");
    scheduler.stop().await;
    info!("social-send daemon stopped");
    Ok(())
}

/// Resolve once SIGINT or SIGTERM arrives
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;
    let handle = signals.handle();

    if let Some(signal) = signals.next().await {
        info!("Received signal {}, stopping gracefully...", signal);
    }
    handle.close();
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Signal setup failed")?;
    info!("Received Ctrl-C, stopping gracefully...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_setup_failure_is_a_runtime_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = Err::<(), _>(io).context("Signal setup failed").unwrap_err();
        assert_eq!(exit_code(&error), 1);
        assert!(format!("{:#}", error).contains("Signal setup failed: denied"));
    }

    #[test]
    fn test_library_errors_keep_their_exit_code() {
        let invalid = anyhow::Error::from(SocialcastError::InvalidInput("bad".to_string()));
        assert_eq!(exit_code(&invalid), 3);

        let timeout = anyhow::Error::from(SocialcastError::Timeout(
            std::time::Duration::from_secs(1),
        ));
        assert_eq!(exit_code(&timeout), 2);
    }
}
