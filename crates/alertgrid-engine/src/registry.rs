//! Node registry: active nodes with their clients and hash ring.
//!
//! The three pieces are bundled into an immutable [`Topology`] snapshot.
//! A rebuild constructs a complete new snapshot off to the side and then
//! swaps the `Arc` under the write lock, so readers see either the old set
//! or the new one and never a ring that names a node without a client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use alertgrid_kapacitor::{Connector, NodeClient, node_url};
use alertgrid_ring::HashRing;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

/// One consistent view of the alerting fleet.
pub struct Topology {
    addresses: Vec<String>,
    clients: HashMap<String, Arc<dyn NodeClient>>,
    ring: HashRing,
}

impl Topology {
    pub fn empty() -> Self {
        Self {
            addresses: Vec::new(),
            clients: HashMap::new(),
            ring: HashRing::new(),
        }
    }

    /// Node URLs in configured order.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn client(&self, url: &str) -> Option<Arc<dyn NodeClient>> {
        self.clients.get(url).cloned()
    }

    /// Nodes with their clients, in configured order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Arc<dyn NodeClient>)> {
        self.addresses
            .iter()
            .filter_map(|url| self.clients.get(url).map(|c| (url.as_str(), c)))
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    /// Node responsible for `key`, together with its client.
    pub fn owner(&self, key: &str) -> EngineResult<(String, Arc<dyn NodeClient>)> {
        let url = self.ring.get(key)?;
        let client = self
            .client(url)
            .ok_or_else(|| EngineError::NodeUnavailable(url.to_string()))?;
        Ok((url.to_string(), client))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Outcome of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// URLs that produced a client, in configured order.
    pub active: Vec<String>,
    /// URLs that were dropped, with the reason.
    pub dropped: Vec<(String, String)>,
}

/// Owns the current [`Topology`] and replaces it on demand.
pub struct NodeRegistry {
    connector: Arc<dyn Connector>,
    default_port: u16,
    current: RwLock<Arc<Topology>>,
    /// Held for a whole rebuild so overlapping calls apply in call order.
    rebuilding: Mutex<()>,
}

impl NodeRegistry {
    pub fn new(connector: Arc<dyn Connector>, default_port: u16) -> Self {
        Self {
            connector,
            default_port,
            current: RwLock::new(Arc::new(Topology::empty())),
            rebuilding: Mutex::new(()),
        }
    }

    /// Replace the node set with `addrs`.
    ///
    /// Addresses that cannot produce a client are logged and left out until
    /// the next rebuild. Never fails as a whole: an empty result simply
    /// leaves the engine with no nodes. Concurrent rebuilds run one at a
    /// time; readers keep the old snapshot until the swap.
    pub fn rebuild<S: AsRef<str>>(&self, addrs: &[S]) -> RebuildStats {
        let _rebuilding = self.rebuilding.lock().expect("rebuild lock");
        let mut stats = RebuildStats::default();
        let mut addresses = Vec::new();
        let mut clients: HashMap<String, Arc<dyn NodeClient>> = HashMap::new();
        let mut ring = HashRing::new();

        for addr in addrs {
            let url = node_url(addr.as_ref(), self.default_port);
            if clients.contains_key(&url) {
                continue;
            }
            match self.connector.connect(&url) {
                Ok(client) => {
                    ring.add(url.clone());
                    clients.insert(url.clone(), client);
                    addresses.push(url.clone());
                    stats.active.push(url);
                }
                Err(e) => {
                    warn!(node = %url, error = %e, "dropping alerting node");
                    stats.dropped.push((url, e.to_string()));
                }
            }
        }

        let next = Arc::new(Topology {
            addresses,
            clients,
            ring,
        });
        let previous = {
            let mut current = self.current.write().expect("topology lock");
            std::mem::replace(&mut *current, next)
        };

        info!(
            previous = ?previous.addresses(),
            active = ?stats.active,
            dropped = stats.dropped.len(),
            "alerting node set rebuilt"
        );
        stats
    }

    /// The current topology. Callers keep using it even if a rebuild
    /// happens meanwhile.
    pub fn snapshot(&self) -> Arc<Topology> {
        Arc::clone(&self.current.read().expect("topology lock"))
    }

    pub fn client_for(&self, url: &str) -> Option<Arc<dyn NodeClient>> {
        self.snapshot().client(url)
    }

    pub fn active_addresses(&self) -> Vec<String> {
        self.snapshot().addresses().to_vec()
    }
}
