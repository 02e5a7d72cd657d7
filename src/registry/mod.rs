//! Network-node registry: a lighter-weight view of nodes that are known but
//! not necessarily reachable — battery, capabilities, allocated slots, and
//! last-seen time, without routing state.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::routing::NodeCapabilities;
use crate::time::elapsed;

/// One entry in the node registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkNodeInfo {
    pub address: u16,
    pub battery_level: u8,
    pub is_network_manager: bool,
    pub capabilities: NodeCapabilities,
    pub allocated_slots: u8,
    pub last_seen_ms: u32,
}

impl NetworkNodeInfo {
    pub fn new(address: u16, now: u32) -> Self {
        NetworkNodeInfo {
            address,
            battery_level: 0,
            is_network_manager: false,
            capabilities: NodeCapabilities::empty(),
            allocated_slots: 0,
            last_seen_ms: now,
        }
    }
}

/// Aggregate registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegistryStatistics {
    pub node_count: usize,
    pub average_battery_level: f32,
    pub max_age_ms: u32,
    pub active_within_window: usize,
}

struct Inner {
    nodes: HashMap<u16, NetworkNodeInfo>,
    max_nodes: u16,
}

/// Tracks every node this device has heard from, independent of whether a
/// route to it currently exists.
pub struct NetworkNodeRegistry {
    inner: Mutex<Inner>,
}

impl NetworkNodeRegistry {
    pub fn new(max_nodes: u16) -> Self {
        NetworkNodeRegistry {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                max_nodes,
            }),
        }
    }

    fn evict_if_full(inner: &mut Inner) -> bool {
        if inner.max_nodes == 0 || (inner.nodes.len() as u16) < inner.max_nodes {
            return true;
        }
        let victim = inner
            .nodes
            .values()
            .filter(|n| !n.is_network_manager)
            .min_by_key(|n| n.last_seen_ms)
            .map(|n| n.address);
        match victim {
            Some(addr) => {
                inner.nodes.remove(&addr);
                true
            }
            None => false,
        }
    }

    /// Inserts or refreshes a node's metadata. Always stamps `last_seen_ms`.
    /// Returns `false` only when the registry is full and the manager
    /// protection rule left nothing to evict.
    #[allow(clippy::too_many_arguments)]
    pub fn update_node(
        &self,
        address: u16,
        battery_level: u8,
        is_network_manager: bool,
        capabilities: NodeCapabilities,
        allocated_slots: u8,
        now: u32,
    ) -> bool {
        let battery_level = battery_level.min(100);
        let mut inner = self.inner.lock().unwrap();
        if !inner.nodes.contains_key(&address) && !Self::evict_if_full(&mut inner) {
            return false;
        }
        let entry = inner
            .nodes
            .entry(address)
            .or_insert_with(|| NetworkNodeInfo::new(address, now));
        entry.battery_level = battery_level;
        entry.is_network_manager = is_network_manager;
        entry.capabilities = capabilities;
        entry.allocated_slots = allocated_slots;
        entry.last_seen_ms = now;
        true
    }

    pub fn touch(&self, address: u16, now: u32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.nodes.get_mut(&address) {
            entry.last_seen_ms = now;
        }
    }

    pub fn remove(&self, address: u16) -> bool {
        self.inner.lock().unwrap().nodes.remove(&address).is_some()
    }

    pub fn get(&self, address: u16) -> Option<NetworkNodeInfo> {
        self.inner.lock().unwrap().nodes.get(&address).copied()
    }

    pub fn all(&self) -> Vec<NetworkNodeInfo> {
        self.inner.lock().unwrap().nodes.values().copied().collect()
    }

    /// Nodes advertising every bit set in `capability`.
    pub fn with_capability(&self, capability: NodeCapabilities) -> Vec<NetworkNodeInfo> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.capabilities.contains(capability))
            .copied()
            .collect()
    }

    pub fn network_managers(&self) -> Vec<NetworkNodeInfo> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .values()
            .filter(|n| n.is_network_manager)
            .copied()
            .collect()
    }

    pub fn statistics(&self, now: u32, active_window_ms: u32) -> RegistryStatistics {
        let inner = self.inner.lock().unwrap();
        let node_count = inner.nodes.len();
        if node_count == 0 {
            return RegistryStatistics::default();
        }
        let total_battery: u32 = inner.nodes.values().map(|n| n.battery_level as u32).sum();
        let max_age_ms = inner
            .nodes
            .values()
            .map(|n| elapsed(now, n.last_seen_ms))
            .max()
            .unwrap_or(0);
        let active_within_window = inner
            .nodes
            .values()
            .filter(|n| elapsed(now, n.last_seen_ms) <= active_window_ms)
            .count();
        RegistryStatistics {
            node_count,
            average_battery_level: total_battery as f32 / node_count as f32,
            max_age_ms,
            active_within_window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_node_inserts_and_refreshes() {
        let registry = NetworkNodeRegistry::new(0);
        assert!(registry.update_node(2, 80, false, NodeCapabilities::ROUTER, 1, 100));
        let node = registry.get(2).unwrap();
        assert_eq!(node.battery_level, 80);
        assert!(registry.update_node(2, 150, false, NodeCapabilities::ROUTER, 1, 200));
        assert_eq!(registry.get(2).unwrap().battery_level, 100, "battery clamps to 100");
    }

    #[test]
    fn capacity_eviction_protects_manager() {
        let registry = NetworkNodeRegistry::new(2);
        registry.update_node(2, 50, true, NodeCapabilities::empty(), 0, 10);
        registry.update_node(3, 50, false, NodeCapabilities::empty(), 0, 20);
        assert!(registry.update_node(4, 50, false, NodeCapabilities::empty(), 0, 30));
        assert!(registry.get(2).is_some());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn aggregate_statistics() {
        let registry = NetworkNodeRegistry::new(0);
        registry.update_node(2, 40, false, NodeCapabilities::empty(), 0, 0);
        registry.update_node(3, 60, false, NodeCapabilities::empty(), 0, 500);
        let stats = registry.statistics(1000, 600);
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.average_battery_level, 50.0);
        assert_eq!(stats.active_within_window, 1);
    }
}
