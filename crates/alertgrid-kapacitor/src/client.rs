//! Seams between the engine and individual alerting nodes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NodeResult;
use crate::types::{CreateTask, Task};

/// Handle to one alerting node.
///
/// Every call is bounded by the handle's own timeout; a slow node only
/// delays the call made against it.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Base URL of the node, e.g. `http://10.0.0.1:9092`.
    fn url(&self) -> &str;

    /// All tasks on the node, without paging.
    async fn list_tasks(&self) -> NodeResult<Vec<Task>>;

    /// Create a task. Fails if a task with the same id exists.
    async fn create_task(&self, task: &CreateTask) -> NodeResult<Task>;

    async fn delete_task(&self, id: &str) -> NodeResult<()>;
}

/// Builds node handles during a topology rebuild.
pub trait Connector: Send + Sync {
    /// Produce a usable handle for `url`, or explain why there is none.
    fn connect(&self, url: &str) -> NodeResult<Arc<dyn NodeClient>>;
}
