//! Per-node task operations: aggregated listing, hash-routed creation,
//! and broadcast deletion.
//!
//! Every operation runs against a single [`Topology`] snapshot.

use std::collections::HashMap;

use alertgrid_core::{Alarm, ListPolicy, is_owned};
use alertgrid_kapacitor::{CreateTask, Dbrp, Task, TaskStatus, TaskType};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::EngineSettings;
use crate::error::{EngineError, EngineResult};
use crate::registry::Topology;

/// A task together with the node it was seen on.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedTask {
    pub task: Task,
    pub node: String,
}

/// Observed tasks keyed by id.
pub type ObservedTasks = HashMap<String, ObservedTask>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { node: String },
    /// The alarm's measurement is configured to be skipped.
    Skipped,
}

/// Per-node result of a broadcast delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveReport {
    pub task_id: String,
    /// Nodes that deleted the task.
    pub deleted: Vec<String>,
    /// Nodes that did not have the task.
    pub absent: Vec<String>,
    /// Nodes that failed, with the error.
    pub failed: Vec<(String, String)>,
}

/// List tasks on every node and merge them by id.
///
/// Nodes are queried concurrently and merged in configured order. A task
/// id seen on a second node is a leftover from an earlier topology; the
/// later copy is deleted when AlertGrid owns it.
pub async fn list_tasks(topology: &Topology, settings: &EngineSettings) -> EngineResult<ObservedTasks> {
    let listings = join_all(topology.nodes().map(|(url, client)| async move {
        (url, client, client.list_tasks().await)
    }))
    .await;

    let mut observed = ObservedTasks::new();
    for (url, client, result) in listings {
        let tasks = match result {
            Ok(tasks) => tasks,
            Err(e) => match settings.list_policy {
                ListPolicy::FailFast => {
                    error!(node = %url, error = %e, "list tasks failed");
                    return Err(e.into());
                }
                ListPolicy::BestEffort => {
                    warn!(node = %url, error = %e, "list tasks failed, skipping node");
                    continue;
                }
            },
        };

        for task in tasks {
            if let Some(first) = observed.get(&task.id) {
                if !is_owned(&task.id, &settings.namespace) {
                    warn!(task = %task.id, first = %first.node, node = %url, "foreign task on several nodes");
                    continue;
                }
                info!(task = %task.id, first = %first.node, node = %url, "found duplicate task, cleaning it");
                if let Err(e) = client.delete_task(&task.id).await {
                    error!(task = %task.id, node = %url, error = %e, "delete duplicate task failed");
                }
                continue;
            }
            observed.insert(
                task.id.clone(),
                ObservedTask {
                    task,
                    node: url.to_string(),
                },
            );
        }
    }

    debug!(tasks = observed.len(), nodes = topology.len(), "listed tasks");
    Ok(observed)
}

/// Create request for `alarm` carrying `script`.
pub fn build_request(alarm: &Alarm, script: String) -> CreateTask {
    CreateTask {
        id: alarm.version.clone(),
        task_type: TaskType::Batch,
        dbrps: vec![Dbrp {
            db: alarm.db.clone(),
            rp: alarm.rp.clone(),
        }],
        script,
        status: TaskStatus::from_enabled(alarm.enable),
    }
}

/// Create the task for `alarm` on the node the ring assigns its version to.
///
/// Fails if the node already has a task with that id; callers are expected
/// to diff against observed state first.
pub async fn create_task(
    topology: &Topology,
    settings: &EngineSettings,
    alarm: &Alarm,
) -> EngineResult<CreateOutcome> {
    if settings.skips(&alarm.measurement) {
        debug!(task = %alarm.version, measurement = %alarm.measurement, "measurement skipped");
        return Ok(CreateOutcome::Skipped);
    }

    let script = alertgrid_tick::generate(alarm, &settings.event_addr).map_err(|source| {
        error!(
            task = %alarm.version,
            db = %alarm.db,
            name = %alarm.name,
            error = %source,
            "generate tick script failed"
        );
        EngineError::Tick {
            version: alarm.version.clone(),
            source,
        }
    })?;

    let (url, client) = topology.owner(&alarm.version).inspect_err(|e| {
        error!(task = %alarm.version, error = %e, "no node to place task on");
    })?;

    info!(task = %alarm.version, node = %url, "creating task");
    client
        .create_task(&build_request(alarm, script))
        .await
        .inspect_err(|e| error!(task = %alarm.version, node = %url, error = %e, "create task failed"))?;

    Ok(CreateOutcome::Created { node: url })
}

/// Delete `task_id` from every node.
///
/// The task may live on a node other than the one the ring picks today, so
/// all nodes are asked. Node failures are reported, not returned.
pub async fn remove_task(
    topology: &Topology,
    settings: &EngineSettings,
    task_id: &str,
) -> EngineResult<RemoveReport> {
    if !is_owned(task_id, &settings.namespace) {
        error!(task = %task_id, "task does not belong to alertgrid");
        return Err(EngineError::ForeignTask(task_id.to_string()));
    }

    info!(task = %task_id, nodes = topology.len(), "deleting task");
    let results = join_all(topology.nodes().map(|(url, client)| async move {
        (url, client.delete_task(task_id).await)
    }))
    .await;

    let mut report = RemoveReport {
        task_id: task_id.to_string(),
        ..Default::default()
    };
    for (url, result) in results {
        match result {
            Ok(()) => report.deleted.push(url.to_string()),
            Err(e) if e.is_not_found() => report.absent.push(url.to_string()),
            Err(e) => {
                error!(task = %task_id, node = %url, error = %e, "delete task failed");
                report.failed.push((url.to_string(), e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use alertgrid_core::TriggerKind;
    use alertgrid_kapacitor::NodeClient;
    use alertgrid_kapacitor::memory::{MemoryConnector, MemoryNode};

    use crate::registry::NodeRegistry;

    const URLS: [&str; 2] = ["http://n1:9092", "http://n2:9092"];

    fn setup(policy: ListPolicy) -> (Vec<Arc<MemoryNode>>, Arc<Topology>, EngineSettings) {
        let connector = MemoryConnector::new();
        let nodes = URLS.iter().map(|u| connector.add_node(u)).collect();
        let registry = NodeRegistry::new(connector, 9092);
        registry.rebuild(&URLS);
        let mut settings = EngineSettings::new("http://event.local/post");
        settings.list_policy = policy;
        (nodes, registry.snapshot(), settings)
    }

    fn alarm(version: &str) -> Alarm {
        Alarm {
            version: version.to_string(),
            name: String::new(),
            db: "collect".to_string(),
            rp: "loda".to_string(),
            measurement: "cpu.idle".to_string(),
            where_clause: String::new(),
            group_by: "*".to_string(),
            period: "5m".to_string(),
            every: "1m".to_string(),
            trigger: TriggerKind::Threshold,
            func: "mean".to_string(),
            expression: ">".to_string(),
            value: "90".to_string(),
            stime: None,
            etime: None,
            enable: false,
        }
    }

    #[tokio::test]
    async fn list_merges_nodes() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[0].insert_task("loda_a");
        nodes[1].insert_task("loda_b");

        let observed = list_tasks(&topology, &settings).await.unwrap();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed["loda_a"].node, URLS[0]);
        assert_eq!(observed["loda_b"].node, URLS[1]);
    }

    #[tokio::test]
    async fn list_deletes_later_duplicate() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[0].insert_task("loda_a");
        nodes[1].insert_task("loda_a");

        let observed = list_tasks(&topology, &settings).await.unwrap();
        assert_eq!(observed["loda_a"].node, URLS[0]);
        assert!(nodes[0].has_task("loda_a"));
        assert!(!nodes[1].has_task("loda_a"));
        assert_eq!(nodes[1].deletes(), vec!["loda_a"]);
    }

    #[tokio::test]
    async fn list_leaves_foreign_duplicates_alone() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[0].insert_task("chronograf-1");
        nodes[1].insert_task("chronograf-1");

        let observed = list_tasks(&topology, &settings).await.unwrap();
        assert_eq!(observed.len(), 1);
        assert!(nodes[1].deletes().is_empty());
    }

    #[tokio::test]
    async fn fail_fast_listing_aborts() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[0].insert_task("loda_a");
        nodes[1].fail_list(true);

        let err = list_tasks(&topology, &settings).await.unwrap_err();
        assert!(matches!(err, EngineError::Node(_)));
    }

    #[tokio::test]
    async fn best_effort_listing_skips_failed_node() {
        let (nodes, topology, settings) = setup(ListPolicy::BestEffort);
        nodes[0].insert_task("loda_a");
        nodes[1].insert_task("loda_b");
        nodes[1].fail_list(true);

        let observed = list_tasks(&topology, &settings).await.unwrap();
        assert_eq!(observed.keys().collect::<Vec<_>>(), vec!["loda_a"]);
    }

    #[tokio::test]
    async fn create_goes_to_ring_owner() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        let alarm = alarm("loda_v1");
        let (owner, _) = topology.owner("loda_v1").unwrap();

        let outcome = create_task(&topology, &settings, &alarm).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created { node: owner.clone() });

        let node = nodes.iter().find(|n| n.url() == owner).unwrap();
        let creates = node.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].id, "loda_v1");
        assert_eq!(creates[0].task_type, TaskType::Batch);
        assert_eq!(creates[0].status, TaskStatus::Disabled);
        assert_eq!(
            creates[0].dbrps,
            vec![Dbrp {
                db: "collect".to_string(),
                rp: "loda".to_string()
            }]
        );
        assert!(creates[0].script.contains("?version=loda_v1"));

        let total: usize = nodes.iter().map(|n| n.creates().len()).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn create_on_empty_topology_fails() {
        let (_, _, settings) = setup(ListPolicy::FailFast);
        let err = create_task(&Topology::empty(), &settings, &alarm("loda_v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyRing));
    }

    #[tokio::test]
    async fn create_surfaces_generation_errors() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        let mut bad = alarm("loda_v1");
        bad.trigger = TriggerKind::DeadMan;

        let err = create_task(&topology, &settings, &bad).await.unwrap_err();
        assert!(matches!(err, EngineError::Tick { .. }));
        assert!(nodes.iter().all(|n| n.calls().is_empty()));
    }

    #[tokio::test]
    async fn create_skips_configured_measurements() {
        let (nodes, topology, mut settings) = setup(ListPolicy::FailFast);
        settings.skip_measurements = vec!["agent.alive".to_string()];
        let mut heartbeat = alarm("loda_alive");
        heartbeat.measurement = "agent.alive".to_string();

        let outcome = create_task(&topology, &settings, &heartbeat).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Skipped);
        assert!(nodes.iter().all(|n| n.calls().is_empty()));
    }

    #[tokio::test]
    async fn remove_broadcasts_to_every_node() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[1].insert_task("loda_v2");

        let report = remove_task(&topology, &settings, "loda_v2").await.unwrap();
        assert_eq!(report.deleted, vec![URLS[1]]);
        assert_eq!(report.absent, vec![URLS[0]]);
        assert!(report.failed.is_empty());
        for node in &nodes {
            assert_eq!(node.deletes(), vec!["loda_v2"]);
        }
    }

    #[tokio::test]
    async fn remove_tolerates_node_failures() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        nodes[0].insert_task("loda_v2");
        nodes[1].fail_delete(true);

        let report = remove_task(&topology, &settings, "loda_v2").await.unwrap();
        assert_eq!(report.deleted, vec![URLS[0]]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, URLS[1]);
    }

    #[tokio::test]
    async fn remove_rejects_foreign_ids_without_calls() {
        let (nodes, topology, settings) = setup(ListPolicy::FailFast);
        let err = remove_task(&topology, &settings, "chronograf-1").await.unwrap_err();
        assert!(matches!(err, EngineError::ForeignTask(id) if id == "chronograf-1"));
        assert!(nodes.iter().all(|n| n.calls().is_empty()));
    }
}
