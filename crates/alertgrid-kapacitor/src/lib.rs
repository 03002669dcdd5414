//! Client side of the Kapacitor task API.
//!
//! The engine talks to nodes only through [`NodeClient`] handles produced
//! by a [`Connector`]. [`KapacitorConnector`] builds real HTTP clients;
//! the `test-utils` feature adds an in-memory node for tests.
//!
//! # Components
//!
//! - **`types`**: task wire types
//! - **`client`**: `NodeClient` / `Connector` traits
//! - **`rest`**: hyper based client for a single node

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rest;
pub mod types;

pub use client::{Connector, NodeClient};
pub use error::{NodeError, NodeResult};
pub use rest::{KapacitorClient, KapacitorConnector, node_url};
pub use types::{CreateTask, Dbrp, Task, TaskList, TaskStatus, TaskType};
