//! Consistent-hash ring used to shard alarms across alerting nodes.
//!
//! Each node is inserted as a fixed number of virtual points so that
//! adding or removing a node only moves the keys that fall in that
//! node's segments.

mod ring;

pub use ring::{DEFAULT_REPLICAS, HashRing, RingError};
