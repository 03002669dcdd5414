//! Task wire types of the Kapacitor `/kapacitor/v1/tasks` API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Stream,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enabled,
    Disabled,
}

impl TaskStatus {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            TaskStatus::Enabled
        } else {
            TaskStatus::Disabled
        }
    }
}

/// Database / retention-policy pair a task reads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dbrp {
    pub db: String,
    pub rp: String,
}

/// A task as reported by a node. Fields not requested are left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub dbrps: Vec<Dbrp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub executing: bool,
    #[serde(default)]
    pub error: String,
}

impl Task {
    /// A task carrying only its id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: None,
            dbrps: Vec::new(),
            status: None,
            executing: false,
            error: String::new(),
        }
    }
}

/// Response body of a task listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Request body for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTask {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub dbrps: Vec<Dbrp>,
    pub script: String,
    pub status: TaskStatus,
}

impl From<&CreateTask> for Task {
    fn from(req: &CreateTask) -> Self {
        Task {
            id: req.id.clone(),
            task_type: Some(req.task_type),
            dbrps: req.dbrps.clone(),
            status: Some(req.status),
            executing: req.status == TaskStatus::Enabled,
            error: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_listing_with_extra_fields() {
        let body = r#"{
            "tasks": [
                {
                    "link": {"rel": "self", "href": "/kapacitor/v1/tasks/loda_v1"},
                    "id": "loda_v1",
                    "type": "batch",
                    "dbrps": [{"db": "collect", "rp": "loda"}],
                    "status": "enabled",
                    "executing": true
                },
                {
                    "link": {"rel": "self", "href": "/kapacitor/v1/tasks/other"},
                    "id": "other"
                }
            ]
        }"#;
        let list: TaskList = serde_json::from_str(body).unwrap();
        assert_eq!(list.tasks.len(), 2);
        assert_eq!(list.tasks[0].task_type, Some(TaskType::Batch));
        assert_eq!(list.tasks[0].status, Some(TaskStatus::Enabled));
        assert_eq!(list.tasks[1], Task::with_id("other"));
    }

    #[test]
    fn encodes_create_request() {
        let req = CreateTask {
            id: "loda_v1".to_string(),
            task_type: TaskType::Batch,
            dbrps: vec![Dbrp {
                db: "collect".to_string(),
                rp: "loda".to_string(),
            }],
            script: "batch".to_string(),
            status: TaskStatus::from_enabled(false),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "loda_v1",
                "type": "batch",
                "dbrps": [{"db": "collect", "rp": "loda"}],
                "script": "batch",
                "status": "disabled"
            })
        );
    }
}
