//! In-memory alerting node for tests.
//!
//! [`MemoryNode`] keeps tasks in a map, records every call made against
//! it, and can be told to fail specific operations. [`MemoryConnector`]
//! hands out registered nodes and refuses unknown urls, which models an
//! address that cannot produce a client.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{Connector, NodeClient};
use crate::error::{NodeError, NodeResult};
use crate::types::{CreateTask, Task};

/// A call observed by a [`MemoryNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Create(CreateTask),
    Delete(String),
}

#[derive(Debug, Default)]
pub struct MemoryNode {
    url: String,
    tasks: Mutex<BTreeMap<String, Task>>,
    calls: Mutex<Vec<Call>>,
    fail_list: AtomicBool,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryNode {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            ..Default::default()
        })
    }

    /// Seed a task without recording a call.
    pub fn insert_task(&self, id: &str) {
        self.tasks
            .lock()
            .expect("tasks lock")
            .insert(id.to_string(), Task::with_id(id));
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.lock().expect("tasks lock").keys().cloned().collect()
    }

    pub fn has_task(&self, id: &str) -> bool {
        self.tasks.lock().expect("tasks lock").contains_key(id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Create requests received, in order.
    pub fn creates(&self) -> Vec<CreateTask> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    /// Ids of delete requests received, in order.
    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Number of create and delete calls.
    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, Call::List))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn unavailable(&self) -> NodeError {
        NodeError::Transport {
            url: self.url.clone(),
            reason: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl NodeClient for MemoryNode {
    fn url(&self) -> &str {
        &self.url
    }

    async fn list_tasks(&self) -> NodeResult<Vec<Task>> {
        self.record(Call::List);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(self.tasks.lock().expect("tasks lock").values().cloned().collect())
    }

    async fn create_task(&self, task: &CreateTask) -> NodeResult<Task> {
        self.record(Call::Create(task.clone()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        let mut tasks = self.tasks.lock().expect("tasks lock");
        if tasks.contains_key(&task.id) {
            return Err(NodeError::Api {
                url: self.url.clone(),
                status: 400,
                message: format!("task {} already exists", task.id),
            });
        }
        let created = Task::from(task);
        tasks.insert(task.id.clone(), created.clone());
        Ok(created)
    }

    async fn delete_task(&self, id: &str) -> NodeResult<()> {
        self.record(Call::Delete(id.to_string()));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        match self.tasks.lock().expect("tasks lock").remove(id) {
            Some(_) => Ok(()),
            None => Err(NodeError::Api {
                url: self.url.clone(),
                status: 404,
                message: "no task exists".to_string(),
            }),
        }
    }
}

/// Connector over a fixed set of [`MemoryNode`]s.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    nodes: Mutex<HashMap<String, Arc<MemoryNode>>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a reachable node and return it.
    pub fn add_node(&self, url: &str) -> Arc<MemoryNode> {
        let node = MemoryNode::new(url);
        self.nodes
            .lock()
            .expect("nodes lock")
            .insert(url.to_string(), Arc::clone(&node));
        node
    }

    pub fn node(&self, url: &str) -> Option<Arc<MemoryNode>> {
        self.nodes.lock().expect("nodes lock").get(url).cloned()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> NodeResult<Arc<dyn NodeClient>> {
        match self.node(url) {
            Some(node) => Ok(node as Arc<dyn NodeClient>),
            None => Err(NodeError::InvalidUrl {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            }),
        }
    }
}
