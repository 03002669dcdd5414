//! alertgridd: the AlertGrid daemon.
//!
//! Keeps a fleet of Kapacitor nodes in sync with a desired alarm set:
//! - Consistent-hash placement of alarm versions onto nodes
//! - Periodic reconcile driven by an alarms file
//! - One-shot passes and inspection commands for operators
//!
//! # Usage
//!
//! ```text
//! alertgridd run --config /etc/alertgrid/alertgrid.toml
//! alertgridd render --alarm alarm.json --event-addr http://event.local/event/post
//! ```

mod sync;

use std::path::{Path, PathBuf};

use alertgrid_core::{Alarm, AlertGridConfig};
use alertgrid_engine::{Engine, ReconcileReport};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use crate::sync::{SyncLoop, load_alarms};

#[derive(Parser)]
#[command(name = "alertgridd", about = "AlertGrid daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the periodic sync loop until interrupted.
    Run {
        #[arg(long, default_value = "/etc/alertgrid/alertgrid.toml")]
        config: PathBuf,
    },
    /// Run a single reconcile pass and print what it did.
    Once {
        #[arg(long, default_value = "/etc/alertgrid/alertgrid.toml")]
        config: PathBuf,
    },
    /// Print the tasks currently on the nodes.
    Tasks {
        #[arg(long, default_value = "/etc/alertgrid/alertgrid.toml")]
        config: PathBuf,
    },
    /// Print the TICKscript generated for one alarm.
    Render {
        /// JSON file holding a single alarm.
        #[arg(long)]
        alarm: PathBuf,

        /// Endpoint the script posts alerts to.
        #[arg(long)]
        event_addr: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Once { config } => once(&config).await,
        Command::Tasks { config } => tasks(&config).await,
        Command::Render { alarm, event_addr } => render(&alarm, &event_addr),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,alertgridd=debug,alertgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: PathBuf) -> anyhow::Result<()> {
    info!("AlertGrid daemon starting");

    let sync = SyncLoop::new(config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(sync.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;

    info!("AlertGrid daemon stopped");
    Ok(())
}

fn load_engine(path: &Path) -> anyhow::Result<(AlertGridConfig, Engine)> {
    let config = AlertGridConfig::from_file(path)?;
    let engine = Engine::from_config(&config)?;
    Ok((config, engine))
}

async fn once(path: &Path) -> anyhow::Result<()> {
    let (config, engine) = load_engine(path)?;
    let sync = config
        .sync
        .as_ref()
        .with_context(|| format!("{}: [sync] section is required", path.display()))?;
    let desired = load_alarms(&sync.alarms_file)?;

    let report = engine.reconcile(&desired).await?;
    print_report(&report);
    if !report.is_clean() {
        anyhow::bail!("{} operation(s) failed", report.failed.len());
    }
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    for (id, node) in &report.created {
        println!("created  {id} on {node}");
    }
    for id in &report.removed {
        println!("removed  {id}");
    }
    for id in &report.skipped {
        println!("skipped  {id}");
    }
    for id in &report.foreign {
        println!("foreign  {id}");
    }
    for (id, error) in &report.failed {
        println!("failed   {id}: {error}");
    }
}

async fn tasks(path: &Path) -> anyhow::Result<()> {
    let (_, engine) = load_engine(path)?;
    let observed = engine.list().await?;

    let mut rows: Vec<_> = observed.values().collect();
    rows.sort_by(|a, b| (&a.node, &a.task.id).cmp(&(&b.node, &b.task.id)));
    for row in rows {
        let line = serde_json::json!({ "node": row.node, "task": row.task });
        println!("{line}");
    }
    Ok(())
}

fn render(path: &Path, event_addr: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alarm file {}", path.display()))?;
    let alarm: Alarm = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse alarm file {}", path.display()))?;
    let script = alertgrid_tick::generate(&alarm, event_addr)?;
    println!("{script}");
    Ok(())
}
