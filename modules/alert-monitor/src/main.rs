use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use alert_monitor::notify::command::CommandBackend;
use alert_monitor::notify::noop::NoopBackend;
use alert_monitor::notify::router::NotifyRouter;
use alert_monitor::notify::NotifyBackend;
use alert_monitor::{ConfigLoader, ConfigOverrides, Monitor, ResolvedConfig};

const DEFAULT_CONFIG: &str = "alert-monitor.toml";

#[derive(Parser)]
#[command(name = "alert-monitor", about = "Emergency alert change monitor")]
struct Cli {
    /// Path to config TOML file (defaults to ./alert-monitor.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Seconds between cycles
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Ignore alerts older than this many days
    #[arg(long, global = true)]
    days: Option<u32>,

    /// Enable sound notifications
    #[arg(long, global = true)]
    sound: bool,

    /// State file location
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll continuously until Ctrl-C
    Run,
    /// Run a single cycle and print the active alerts
    Once,
    /// Write today's summary now
    Summary,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("alert_monitor=info".parse()?)
        .add_directive("alert_feed=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    })
}

fn build_notifier(config: &ResolvedConfig) -> Arc<dyn NotifyBackend> {
    let settings = &config.raw.notifications;
    let command_timeout = Duration::from_secs(settings.command_timeout_secs);
    let router = NotifyRouter::new()
        .with(
            "command",
            Box::new(CommandBackend::new(
                settings.desktop_command.clone(),
                settings.sound_command.clone(),
                command_timeout,
            )),
        )
        .with_slack_from_env(command_timeout);

    if router.is_empty() {
        Arc::new(NoopBackend)
    } else {
        info!(backends = ?router.names(), "Notifications enabled");
        Arc::new(router)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json)?;

    let overrides = ConfigOverrides {
        interval_secs: cli.interval,
        max_alert_age_days: cli.days,
        sound: cli.sound.then_some(true),
        state_file: cli.state_file.clone(),
        feed_url: std::env::var("FEED_URL").ok(),
    };
    let path = config_path(&cli);
    if let Some(path) = &path {
        info!(config = %path.display(), "Loading config");
    }
    let loader = ConfigLoader::new(path, overrides).context("Invalid configuration")?;

    let token = std::env::var("FEED_TOKEN").ok();
    let source = loader.current().raw.fetch.build_source(token.as_deref())?;
    let notifier = build_notifier(loader.current());
    let mut monitor = Monitor::new(source, loader, notifier);

    match cli.command {
        Command::Run => {
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                info!("Ctrl-C received, stopping");
                let _ = tx.send(true);
            });
            monitor.run(rx).await?;
        }
        Command::Once => {
            let stats = monitor.run_once().await?;
            info!("Cycle complete. {stats}");

            let alerts = monitor.active_alerts();
            println!("{} active alert(s)", alerts.len());
            for alert in alerts {
                println!("  {}", alert.headline());
            }
        }
        Command::Summary => {
            let summary = monitor.summarize_now().await?;
            info!(
                date = %summary.date,
                changes = summary.by_kind.total(),
                active = summary.active.len(),
                "Summary generated"
            );
        }
    }

    Ok(())
}
