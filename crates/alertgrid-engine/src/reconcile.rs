//! Desired-vs-observed diff and its execution.
//!
//! Reconciliation is level-triggered: ids only in the desired set are
//! created, ids only on the nodes are removed, and everything else is left
//! alone. Alarm content is never compared; a changed alarm arrives under a
//! new version. Failures are reported and corrected by the next pass.

use std::collections::HashMap;

use alertgrid_core::AlarmSet;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::EngineSettings;
use crate::error::EngineError;
use crate::ops::{self, CreateOutcome};
use crate::registry::Topology;

/// Ids to create and remove, each sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub create: Vec<String>,
    pub remove: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.remove.is_empty()
    }

    /// Number of operations the plan issues.
    pub fn len(&self) -> usize {
        self.create.len() + self.remove.len()
    }
}

/// Diff desired against observed by id.
pub fn plan<D, O>(desired: &HashMap<String, D>, observed: &HashMap<String, O>) -> ReconcilePlan {
    let mut create: Vec<String> = desired
        .keys()
        .filter(|id| !observed.contains_key(*id))
        .cloned()
        .collect();
    let mut remove: Vec<String> = observed
        .keys()
        .filter(|id| !desired.contains_key(*id))
        .cloned()
        .collect();
    create.sort();
    remove.sort();
    ReconcilePlan { create, remove }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Created task ids with the node they were placed on.
    pub created: Vec<(String, String)>,
    pub removed: Vec<String>,
    /// Alarms whose measurement is configured to be skipped.
    pub skipped: Vec<String>,
    /// Stale tasks that AlertGrid does not own and left in place.
    pub foreign: Vec<String>,
    /// Failed operations with the error.
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run every create and remove in `plan` concurrently.
pub async fn execute(
    topology: &Topology,
    settings: &EngineSettings,
    desired: &AlarmSet,
    plan: &ReconcilePlan,
) -> ReconcileReport {
    let creates = join_all(plan.create.iter().filter_map(|id| {
        let alarm = desired.get(id)?;
        Some(async move { (id, ops::create_task(topology, settings, alarm).await) })
    }));
    let removes = join_all(
        plan.remove
            .iter()
            .map(|id| async move { (id, ops::remove_task(topology, settings, id).await) }),
    );
    let (created, removed) = futures::join!(creates, removes);

    let mut report = ReconcileReport::default();
    for (id, result) in created {
        match result {
            Ok(CreateOutcome::Created { node }) => report.created.push((id.clone(), node)),
            Ok(CreateOutcome::Skipped) => report.skipped.push(id.clone()),
            Err(e) => report.failed.push((id.clone(), e.to_string())),
        }
    }
    for (id, result) in removed {
        match result {
            Ok(remove) => {
                if !remove.failed.is_empty() {
                    debug!(task = %id, failed = remove.failed.len(), "delete missed some nodes");
                }
                report.removed.push(id.clone());
            }
            Err(EngineError::ForeignTask(_)) => report.foreign.push(id.clone()),
            Err(e) => report.failed.push((id.clone(), e.to_string())),
        }
    }

    if report.failed.is_empty() {
        info!(
            created = report.created.len(),
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "reconcile complete"
        );
    } else {
        warn!(
            created = report.created.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "reconcile completed with failures"
        );
    }
    report
}
