//! TICKscript generation for AlertGrid alarms.
//!
//! An [`Alarm`](alertgrid_core::Alarm) is turned into a [`TickScript`], a
//! structured set of clauses, which renders through `Display` into the
//! batch script posted to a Kapacitor node.
//!
//! # Components
//!
//! - **`window`**: active-hours predicate, including windows that wrap
//!   past midnight
//! - **`script`**: clause builder and renderer

pub mod script;
pub mod window;

use thiserror::Error;

pub use script::{GroupBy, TickScript, generate};
pub use window::{HourWindow, time_window};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("unsupported trigger kind: {0}")]
    UnsupportedTrigger(String),

    #[error("malformed time window: start {start:?}, end {end:?}")]
    MalformedTimeWindow { start: String, end: String },

    #[error("threshold alarm {0} has no aggregation function")]
    MissingFunction(String),
}

pub type TickResult<T> = Result<T, TickError>;
