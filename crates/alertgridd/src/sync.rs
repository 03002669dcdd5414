//! Periodic sync loop.
//!
//! Every pass re-reads the config and the alarms file, applies node set
//! changes, and runs one reconcile. A failed pass is logged and retried on
//! the next tick.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alertgrid_core::{AlarmSet, AlertGridConfig, parse_alarm_set};
use alertgrid_engine::{Engine, EngineSettings, ReconcileReport};
use anyhow::{Context, bail};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const FALLBACK_INTERVAL: Duration = Duration::from_secs(60);

pub struct SyncLoop {
    config_path: PathBuf,
    config: AlertGridConfig,
    engine: Engine,
}

impl SyncLoop {
    pub fn new(config_path: PathBuf) -> anyhow::Result<Self> {
        let config = AlertGridConfig::from_file(&config_path)?;
        if config.sync.is_none() {
            bail!("{}: [sync] section is required to run the loop", config_path.display());
        }
        let engine = Engine::from_config(&config)?;
        Ok(Self {
            config_path,
            config,
            engine,
        })
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(config = %self.config_path.display(), "sync loop started");

        loop {
            if let Err(e) = self.pass().await {
                warn!(error = %e, "sync pass failed");
            }

            let interval = self.config.sync_interval().unwrap_or(FALLBACK_INTERVAL);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("sync loop shutting down");
                    break;
                }
            }
        }
    }

    async fn pass(&mut self) -> anyhow::Result<ReconcileReport> {
        self.refresh_config();

        let Some(sync) = &self.config.sync else {
            bail!("[sync] section disappeared from {}", self.config_path.display());
        };
        let desired = load_alarms(&sync.alarms_file)?;
        debug!(alarms = desired.len(), "loaded desired alarms");

        Ok(self.engine.reconcile(&desired).await?)
    }

    /// Pick up config edits. A bad file keeps the previous config.
    fn refresh_config(&mut self) {
        let next = match AlertGridConfig::from_file(&self.config_path) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "config reload failed, keeping previous config");
                return;
            }
        };

        let settings_changed = EngineSettings::from_config(&next) != *self.engine.settings()
            || next.kapacitor.timeout != self.config.kapacitor.timeout;
        if settings_changed {
            match Engine::from_config(&next) {
                Ok(engine) => {
                    info!("engine settings changed, engine rebuilt");
                    self.engine = engine;
                }
                Err(e) => {
                    warn!(error = %e, "engine rebuild failed, keeping previous config");
                    return;
                }
            }
        } else if next.kapacitor.addrs != self.config.kapacitor.addrs {
            self.engine.set_topology(&next.kapacitor.addrs);
        }
        self.config = next;
    }
}

/// Read the desired alarms from a JSON file.
pub fn load_alarms(path: &Path) -> anyhow::Result<AlarmSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alarms file {}", path.display()))?;
    parse_alarm_set(&content).with_context(|| format!("failed to parse alarms file {}", path.display()))
}
