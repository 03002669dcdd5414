//! AlertGrid reconciliation engine.
//!
//! Keeps a fleet of Kapacitor nodes in sync with a desired set of alarms.
//! Each alarm version is placed on exactly one node chosen by a
//! consistent-hash ring; stale tasks are deleted from every node.
//!
//! # Components
//!
//! - **`registry`**: active node set, per-node clients and the ring,
//!   swapped atomically on topology changes
//! - **`ops`**: aggregated listing, routed creation, broadcast deletion
//! - **`reconcile`**: desired-vs-observed diff and its execution

pub mod error;
pub mod ops;
pub mod reconcile;
pub mod registry;

use std::sync::Arc;

use alertgrid_core::config::DEFAULT_KAPACITOR_PORT;
use alertgrid_core::{Alarm, AlarmSet, AlertGridConfig, ConfigError, DEFAULT_NAMESPACE, ListPolicy};
use alertgrid_kapacitor::{Connector, KapacitorConnector};
use tracing::info;

pub use error::{EngineError, EngineResult};
pub use ops::{CreateOutcome, ObservedTask, ObservedTasks, RemoveReport};
pub use reconcile::{ReconcilePlan, ReconcileReport, plan};
pub use registry::{NodeRegistry, RebuildStats, Topology};

/// Knobs that shape how tasks are generated, listed and owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Endpoint generated scripts post alerts to.
    pub event_addr: String,
    /// Marker that identifies task ids owned by AlertGrid.
    pub namespace: String,
    pub list_policy: ListPolicy,
    /// Measurements never turned into tasks.
    pub skip_measurements: Vec<String>,
    /// Port added to node addresses given without one.
    pub default_port: u16,
}

impl EngineSettings {
    pub fn new(event_addr: impl Into<String>) -> Self {
        Self {
            event_addr: event_addr.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            list_policy: ListPolicy::default(),
            skip_measurements: Vec::new(),
            default_port: DEFAULT_KAPACITOR_PORT,
        }
    }

    pub fn from_config(config: &AlertGridConfig) -> Self {
        Self {
            event_addr: config.event.addr.clone(),
            namespace: config.engine.namespace.clone(),
            list_policy: config.engine.list_policy,
            skip_measurements: config.engine.skip_measurements.clone(),
            default_port: config.kapacitor.port,
        }
    }

    pub fn skips(&self, measurement: &str) -> bool {
        self.skip_measurements.iter().any(|m| m == measurement)
    }
}

/// Entry points driven by the host process.
pub struct Engine {
    registry: NodeRegistry,
    settings: EngineSettings,
}

impl Engine {
    /// Create an engine with no nodes; call [`Engine::set_topology`] next.
    pub fn new(connector: Arc<dyn Connector>, settings: EngineSettings) -> Self {
        Self {
            registry: NodeRegistry::new(connector, settings.default_port),
            settings,
        }
    }

    /// Build an engine talking HTTP to the nodes listed in `config`.
    pub fn from_config(config: &AlertGridConfig) -> Result<Self, ConfigError> {
        let connector = KapacitorConnector::new(config.request_timeout()?);
        let engine = Self::new(Arc::new(connector), EngineSettings::from_config(config));
        engine.set_topology(&config.kapacitor.addrs);
        Ok(engine)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Replace the node set.
    pub fn set_topology<S: AsRef<str>>(&self, addrs: &[S]) -> RebuildStats {
        self.registry.rebuild(addrs)
    }

    /// Tasks currently on the nodes, keyed by id.
    pub async fn list(&self) -> EngineResult<ObservedTasks> {
        let topology = self.registry.snapshot();
        ops::list_tasks(&topology, &self.settings).await
    }

    /// Bring the nodes in line with `desired`.
    ///
    /// Only a failed listing fails the pass; individual create/remove
    /// failures are recorded in the report.
    pub async fn reconcile(&self, desired: &AlarmSet) -> EngineResult<ReconcileReport> {
        let topology = self.registry.snapshot();
        let observed = ops::list_tasks(&topology, &self.settings).await?;
        Ok(self.run(&topology, desired, &observed).await)
    }

    /// Reconcile against an observed state the caller already has.
    pub async fn reconcile_with(&self, desired: &AlarmSet, observed: &ObservedTasks) -> ReconcileReport {
        let topology = self.registry.snapshot();
        self.run(&topology, desired, observed).await
    }

    async fn run(&self, topology: &Topology, desired: &AlarmSet, observed: &ObservedTasks) -> ReconcileReport {
        let plan = reconcile::plan(desired, observed);
        info!(
            desired = desired.len(),
            observed = observed.len(),
            create = plan.create.len(),
            remove = plan.remove.len(),
            "reconciling"
        );
        reconcile::execute(topology, &self.settings, desired, &plan).await
    }

    /// Place a single alarm on its node.
    pub async fn create_one(&self, alarm: &Alarm) -> EngineResult<CreateOutcome> {
        let topology = self.registry.snapshot();
        ops::create_task(&topology, &self.settings, alarm).await
    }

    /// Delete a single task from every node.
    pub async fn remove_one(&self, task_id: &str) -> EngineResult<RemoveReport> {
        let topology = self.registry.snapshot();
        ops::remove_task(&topology, &self.settings, task_id).await
    }
}
