//! Shared types and configuration for the AlertGrid crates.

pub mod config;
pub mod types;

pub use config::{AlertGridConfig, ConfigError, ListPolicy, parse_duration};
pub use types::*;
