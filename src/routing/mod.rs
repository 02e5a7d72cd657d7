//! Distance-vector routing table: route storage, next-hop selection,
//! link-quality estimation, and aging.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use bitflags::bitflags;

use crate::error::MeshError;
use crate::time::elapsed;
use crate::wire::RoutingTableEntry;

bitflags! {
    /// Capability bits a node advertises about itself, matching the
    /// capability byte carried in join requests and routing snapshots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeCapabilities: u8 {
        const ROUTER = 0x01;
        const GATEWAY = 0x02;
        const BATTERY_POWERED = 0x04;
        const HIGH_BANDWIDTH = 0x08;
        const TIME_SYNC_SOURCE = 0x10;
        const SENSOR_NODE = 0x20;
        const RESERVED = 0x40;
        const EXTENDED_CAPS = 0x80;
    }
}

impl fmt::Display for NodeCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names = [
            (NodeCapabilities::ROUTER, "ROUTER"),
            (NodeCapabilities::GATEWAY, "GATEWAY"),
            (NodeCapabilities::BATTERY_POWERED, "BATTERY_POWERED"),
            (NodeCapabilities::HIGH_BANDWIDTH, "HIGH_BANDWIDTH"),
            (NodeCapabilities::TIME_SYNC_SOURCE, "TIME_SYNC_SOURCE"),
            (NodeCapabilities::SENSOR_NODE, "SENSOR_NODE"),
            (NodeCapabilities::RESERVED, "RESERVED"),
            (NodeCapabilities::EXTENDED_CAPS, "EXTENDED_CAPS"),
        ];
        let rendered: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", rendered.join(" | "))
    }
}

/// In-memory routing + node state for one known destination. Richer than
/// the wire [`RoutingTableEntry`]: it also carries node metadata and the
/// link-quality counters used to estimate quality to direct neighbors.
#[derive(Debug, Clone)]
pub struct NetworkNodeRoute {
    pub destination: u16,
    pub hop_count: u8,
    pub link_quality: u8,
    pub allocated_data_slots: u8,
    pub next_hop: u16,
    pub last_updated_ms: u32,
    pub is_active: bool,

    pub battery_level: u8,
    pub is_network_manager: bool,
    pub capabilities: NodeCapabilities,
    pub last_seen_ms: u32,

    pub messages_expected: u32,
    pub messages_received: u32,
    pub remote_reported_quality: Option<u8>,
    pub last_message_time_ms: u32,
}

impl NetworkNodeRoute {
    /// Builds a fresh direct-neighbor route (`hop_count = 1`, `next_hop ==
    /// destination`), the shape used the first time a node is heard from.
    pub fn new_direct(destination: u16, now: u32) -> Self {
        NetworkNodeRoute {
            destination,
            hop_count: 1,
            link_quality: 0,
            allocated_data_slots: 0,
            next_hop: destination,
            last_updated_ms: now,
            is_active: true,
            battery_level: 0,
            is_network_manager: false,
            capabilities: NodeCapabilities::empty(),
            last_seen_ms: now,
            messages_expected: 0,
            messages_received: 0,
            remote_reported_quality: None,
            last_message_time_ms: now,
        }
    }

    /// `local_quality = min(255, 255 * received / expected)`, or `0` if no
    /// messages have been expected yet.
    pub fn local_link_quality(&self) -> u8 {
        if self.messages_expected == 0 {
            return 0;
        }
        let ratio = (255u32 * self.messages_received) / self.messages_expected;
        ratio.min(255) as u8
    }

    /// Composite link quality: the average of local and remote-reported
    /// quality when the remote value is known, otherwise just local.
    pub fn composite_link_quality(&self) -> u8 {
        let local = self.local_link_quality();
        match self.remote_reported_quality {
            Some(remote) => ((local as u16 + remote as u16) / 2) as u8,
            None => local,
        }
    }

    fn record_expected(&mut self) {
        self.messages_expected = self.messages_expected.saturating_add(1);
    }

    fn record_received(&mut self, remote_quality: Option<u8>, now: u32) {
        self.messages_received = self.messages_received.saturating_add(1);
        if let Some(q) = remote_quality {
            self.remote_reported_quality = Some(q);
        }
        self.last_message_time_ms = now;
    }

    fn reset_link_statistics(&mut self) {
        self.messages_expected = 0;
        self.messages_received = 0;
        self.remote_reported_quality = None;
    }

    pub fn capabilities_string(&self) -> String {
        self.capabilities.to_string()
    }
}

/// Ranks two candidate routes per the route-selection policy: active beats
/// inactive, then lower hop_count wins, then higher link_quality wins.
/// `true` means `candidate` should replace `incumbent`.
fn candidate_wins(candidate: &NetworkNodeRoute, incumbent: &NetworkNodeRoute) -> bool {
    if candidate.is_active != incumbent.is_active {
        return candidate.is_active;
    }
    if !candidate.is_active {
        return false;
    }
    if candidate.hop_count != incumbent.hop_count {
        return candidate.hop_count < incumbent.hop_count;
    }
    if candidate.link_quality != incumbent.link_quality {
        return candidate.link_quality > incumbent.link_quality;
    }
    false
}

/// Aggregate counters exposed for operational visibility; does not affect
/// routing behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingTableStatistics {
    pub total_entries: usize,
    pub active_entries: usize,
    pub updates_applied: u64,
    pub evictions: u64,
}

struct Inner {
    nodes: HashMap<u16, NetworkNodeRoute>,
    max_hops: u8,
    max_nodes: u16,
    stats: RoutingTableStatistics,
}

/// Callback fired whenever a route is added, changed, or removed.
pub type RouteUpdateCallback = Box<dyn Fn(RouteUpdateEvent) + Send + Sync>;

/// One routing-table change, delivered to the registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdateEvent {
    Added { destination: u16, next_hop: u16, hop_count: u8 },
    Changed { destination: u16, next_hop: u16, hop_count: u8 },
    Removed { destination: u16 },
}

/// Distance-vector routing table for one node. All operations are
/// serialized by an internal mutex; `get_nodes` returns an owned snapshot.
pub struct DistanceVectorRoutingTable {
    self_address: u16,
    inner: Mutex<Inner>,
    on_route_update: Mutex<Option<RouteUpdateCallback>>,
}

impl fmt::Debug for DistanceVectorRoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceVectorRoutingTable")
            .field("self_address", &self.self_address)
            .finish()
    }
}

const DEFAULT_MAX_HOPS: u8 = 10;

impl DistanceVectorRoutingTable {
    pub fn new(self_address: u16) -> Self {
        DistanceVectorRoutingTable {
            self_address,
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                max_hops: DEFAULT_MAX_HOPS,
                max_nodes: 0,
                stats: RoutingTableStatistics::default(),
            }),
            on_route_update: Mutex::new(None),
        }
    }

    pub fn with_limits(self_address: u16, max_hops: u8, max_nodes: u16) -> Self {
        let table = Self::new(self_address);
        {
            let mut inner = table.inner.lock().unwrap();
            inner.max_hops = max_hops;
            inner.max_nodes = max_nodes;
        }
        table
    }

    pub fn self_address(&self) -> u16 {
        self.self_address
    }

    /// Registers the callback invoked on every add/change/remove.
    pub fn set_on_route_update(&self, callback: RouteUpdateCallback) {
        *self.on_route_update.lock().unwrap() = Some(callback);
    }

    fn notify(&self, event: RouteUpdateEvent) {
        if let Some(cb) = self.on_route_update.lock().unwrap().as_ref() {
            cb(event);
        }
    }

    /// Returns `self_address` if `dest` is self; otherwise the next hop of
    /// the best active entry for `dest`, or `None`.
    pub fn find_next_hop(&self, dest: u16) -> Option<u16> {
        if dest == self.self_address {
            return Some(self.self_address);
        }
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(&dest)
            .filter(|route| route.is_active)
            .map(|route| route.next_hop)
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
            .map(|n| n.destination);
        match victim {
            Some(addr) => {
                inner.nodes.remove(&addr);
                inner.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Upserts a route to `dest` reachable via `next_hop` through `src`.
    /// Returns whether anything changed. Rejects `hop_count > max_hops`.
    #[allow(clippy::too_many_arguments)]
    pub fn update_route(
        &self,
        next_hop: u16,
        dest: u16,
        hop_count: u8,
        link_quality: u8,
        allocated_data_slots: u8,
        now: u32,
    ) -> Result<bool, MeshError> {
        if dest == self.self_address {
            return Ok(false);
        }
        let mut inner = self.inner.lock().unwrap();
        if hop_count > inner.max_hops {
            return Ok(false);
        }
        let candidate = NetworkNodeRoute {
            destination: dest,
            hop_count,
            link_quality,
            allocated_data_slots,
            next_hop,
            last_updated_ms: now,
            is_active: true,
            battery_level: 0,
            is_network_manager: false,
            capabilities: NodeCapabilities::empty(),
            last_seen_ms: now,
            messages_expected: 0,
            messages_received: 0,
            remote_reported_quality: None,
            last_message_time_ms: now,
        };
        match inner.nodes.get(&dest) {
            None => {
                if !Self::evict_if_full(&mut inner) {
                    return Err(MeshError::CapacityExceeded(
                        "routing table full, no evictable entry".into(),
                    ));
                }
                inner.nodes.insert(dest, candidate);
                inner.stats.updates_applied += 1;
                drop(inner);
                self.notify(RouteUpdateEvent::Added {
                    destination: dest,
                    next_hop,
                    hop_count,
                });
                Ok(true)
            }
            Some(existing) => {
                if candidate_wins(&candidate, existing) {
                    let mut updated = candidate;
                    // Node metadata survives a pure routing update.
                    updated.battery_level = existing.battery_level;
                    updated.is_network_manager = existing.is_network_manager;
                    updated.capabilities = existing.capabilities;
                    updated.messages_expected = existing.messages_expected;
                    updated.messages_received = existing.messages_received;
                    updated.remote_reported_quality = existing.remote_reported_quality;
                    updated.last_message_time_ms = existing.last_message_time_ms;
                    inner.nodes.insert(dest, updated);
                    inner.stats.updates_applied += 1;
                    drop(inner);
                    self.notify(RouteUpdateEvent::Changed {
                        destination: dest,
                        next_hop,
                        hop_count,
                    });
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Adds a fully-formed node entry if no entry for its destination
    /// already exists.
    pub fn add_node(&self, entry: NetworkNodeRoute) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.nodes.contains_key(&entry.destination) {
            return false;
        }
        if !Self::evict_if_full(&mut inner) {
            return false;
        }
        let destination = entry.destination;
        let next_hop = entry.next_hop;
        let hop_count = entry.hop_count;
        inner.nodes.insert(destination, entry);
        drop(inner);
        self.notify(RouteUpdateEvent::Added {
            destination,
            next_hop,
            hop_count,
        });
        true
    }

    /// Updates node metadata (battery, manager flag, slots, capabilities)
    /// for an already-known node, or inserts a minimal entry for an
    /// unknown one. Returns whether anything changed.
    pub fn update_node(
        &self,
        addr: u16,
        battery_level: u8,
        is_network_manager: bool,
        allocated_data_slots: u8,
        capabilities: NodeCapabilities,
        now: u32,
    ) -> bool {
        let battery_level = battery_level.min(100);
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .nodes
            .entry(addr)
            .or_insert_with(|| NetworkNodeRoute::new_direct(addr, now));
        let changed = entry.battery_level != battery_level
            || entry.is_network_manager != is_network_manager
            || entry.allocated_data_slots != allocated_data_slots
            || entry.capabilities != capabilities;
        entry.battery_level = battery_level;
        entry.is_network_manager = is_network_manager;
        entry.allocated_data_slots = allocated_data_slots;
        entry.capabilities = capabilities;
        entry.last_seen_ms = now;
        changed
    }

    pub fn remove_node(&self, addr: u16) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.nodes.remove(&addr).is_some();
        drop(inner);
        if removed {
            self.notify(RouteUpdateEvent::Removed { destination: addr });
        }
        removed
    }

    /// Two-phase aging: mark routes inactive past `route_timeout_ms`, then
    /// delete nodes past `node_timeout_ms`. Returns the count removed.
    pub fn remove_inactive(&self, now: u32, route_timeout_ms: u32, node_timeout_ms: u32) -> usize {
        let mut inner = self.inner.lock().unwrap();
        for route in inner.nodes.values_mut() {
            if route.is_active && elapsed(now, route.last_updated_ms) > route_timeout_ms {
                route.is_active = false;
            }
        }
        let doomed: Vec<u16> = inner
            .nodes
            .values()
            .filter(|r| elapsed(now, r.last_seen_ms) > node_timeout_ms)
            .map(|r| r.destination)
            .collect();
        for addr in &doomed {
            inner.nodes.remove(addr);
        }
        drop(inner);
        for addr in &doomed {
            self.notify(RouteUpdateEvent::Removed { destination: *addr });
        }
        doomed.len()
    }

    /// Processes an incoming `ROUTE_TABLE` frame's entries from `source`.
    /// Returns whether anything in the table changed.
    pub fn process_routing_table_message(
        &self,
        source: u16,
        entries: &[RoutingTableEntry],
        reception_ts: u32,
        local_link_quality: u8,
        max_hops: u8,
    ) -> bool {
        if source == self.self_address || source == 0 {
            return false;
        }
        let mut changed = false;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.nodes.get_mut(&source) {
                Some(route) => {
                    route.is_active = true;
                    route.last_seen_ms = reception_ts;
                    route.last_updated_ms = reception_ts;
                    if route.hop_count != 1 || route.next_hop != source {
                        route.hop_count = 1;
                        route.next_hop = source;
                        changed = true;
                    }
                    route.record_received(Some(local_link_quality), reception_ts);
                }
                None => {
                    if Self::evict_if_full(&mut inner) {
                        let mut route = NetworkNodeRoute::new_direct(source, reception_ts);
                        route.record_received(Some(local_link_quality), reception_ts);
                        inner.nodes.insert(source, route);
                        changed = true;
                    }
                }
            }
        }
        if changed {
            self.notify(RouteUpdateEvent::Added {
                destination: source,
                next_hop: source,
                hop_count: 1,
            });
        }
        let source_quality = {
            let inner = self.inner.lock().unwrap();
            inner
                .nodes
                .get(&source)
                .map(|r| r.composite_link_quality())
                .unwrap_or(local_link_quality)
        };
        for entry in entries {
            if entry.destination == self.self_address || entry.destination == 0 {
                continue;
            }
            let candidate_hop_count = match entry.hop_count.checked_add(1) {
                Some(h) if h <= max_hops => h,
                _ => continue,
            };
            let candidate_quality = entry.link_quality.min(source_quality);
            let candidate = NetworkNodeRoute {
                destination: entry.destination,
                hop_count: candidate_hop_count,
                link_quality: candidate_quality,
                allocated_data_slots: entry.allocated_data_slots,
                next_hop: source,
                last_updated_ms: reception_ts,
                is_active: true,
                battery_level: 0,
                is_network_manager: false,
                capabilities: NodeCapabilities::empty(),
                last_seen_ms: reception_ts,
                messages_expected: 0,
                messages_received: 0,
                remote_reported_quality: None,
                last_message_time_ms: reception_ts,
            };
            let mut inner = self.inner.lock().unwrap();
            match inner.nodes.get(&entry.destination) {
                None => {
                    if Self::evict_if_full(&mut inner) {
                        inner.nodes.insert(entry.destination, candidate);
                        changed = true;
                        drop(inner);
                        self.notify(RouteUpdateEvent::Added {
                            destination: entry.destination,
                            next_hop: source,
                            hop_count: candidate_hop_count,
                        });
                    }
                }
                Some(existing) => {
                    if candidate_wins(&candidate, existing) {
                        let mut updated = candidate;
                        updated.battery_level = existing.battery_level;
                        updated.is_network_manager = existing.is_network_manager;
                        updated.capabilities = existing.capabilities;
                        inner.nodes.insert(entry.destination, updated);
                        changed = true;
                        drop(inner);
                        self.notify(RouteUpdateEvent::Changed {
                            destination: entry.destination,
                            next_hop: source,
                            hop_count: candidate_hop_count,
                        });
                    }
                }
            }
        }
        changed
    }

    /// Records one expected transmission from `neighbor` (called by the
    /// scheduler once per superframe for each direct neighbor).
    pub fn record_expected_message(&self, neighbor: u16) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(route) = inner.nodes.get_mut(&neighbor) {
            route.record_expected();
        }
    }

    /// Resets link-quality counters for `neighbor`. Never called
    /// implicitly by an update — only on explicit request.
    pub fn reset_link_statistics(&self, neighbor: u16) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(route) = inner.nodes.get_mut(&neighbor) {
            route.reset_link_statistics();
        }
    }

    /// Active entries suitable for broadcast, excluding `exclude`.
    pub fn routing_entries_for_broadcast(&self, exclude: u16) -> Vec<RoutingTableEntry> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .values()
            .filter(|r| r.is_active && r.destination != exclude)
            .map(|r| RoutingTableEntry {
                destination: r.destination,
                hop_count: r.hop_count,
                link_quality: r.link_quality,
                allocated_data_slots: r.allocated_data_slots,
            })
            .collect()
    }

    /// A full snapshot of known nodes.
    pub fn get_nodes(&self) -> Vec<NetworkNodeRoute> {
        let inner = self.inner.lock().unwrap();
        inner.nodes.values().cloned().collect()
    }

    pub fn get_node(&self, addr: u16) -> Option<NetworkNodeRoute> {
        self.inner.lock().unwrap().nodes.get(&addr).cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().nodes.clear();
    }

    pub fn statistics(&self) -> RoutingTableStatistics {
        let inner = self.inner.lock().unwrap();
        let mut stats = inner.stats;
        stats.total_entries = inner.nodes.len();
        stats.active_entries = inner.nodes.values().filter(|r| r.is_active).count();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_next_hop_returns_self_for_self() {
        let table = DistanceVectorRoutingTable::new(1);
        assert_eq!(table.find_next_hop(1), Some(1));
    }

    #[test]
    fn update_route_inserts_new_destination() {
        let table = DistanceVectorRoutingTable::new(1);
        assert!(table.update_route(2, 3, 2, 200, 0, 1000).unwrap());
        assert_eq!(table.find_next_hop(3), Some(2));
    }

    #[test]
    fn update_route_rejects_excess_hop_count() {
        let table = DistanceVectorRoutingTable::with_limits(1, 3, 0);
        assert!(!table.update_route(2, 3, 4, 200, 0, 1000).unwrap());
        assert_eq!(table.find_next_hop(3), None);
    }

    #[test]
    fn lower_hop_count_wins_ties_broken_by_quality() {
        let table = DistanceVectorRoutingTable::new(1);
        table.update_route(2, 3, 3, 100, 0, 1000).unwrap();
        assert!(table.update_route(4, 3, 2, 50, 0, 1001).unwrap());
        assert_eq!(table.find_next_hop(3), Some(4));
        // same hop count, lower quality: should not replace
        assert!(!table.update_route(5, 3, 2, 10, 0, 1002).unwrap());
        assert_eq!(table.find_next_hop(3), Some(4));
    }

    #[test]
    fn identical_update_is_idempotent() {
        let table = DistanceVectorRoutingTable::new(1);
        assert!(table.update_route(2, 3, 2, 200, 0, 1000).unwrap());
        assert!(!table.update_route(2, 3, 2, 200, 0, 1001).unwrap());
    }

    #[test]
    fn process_routing_table_message_adds_neighbor_and_two_hop_route() {
        let table = DistanceVectorRoutingTable::new(1);
        let entries = vec![RoutingTableEntry {
            destination: 3,
            hop_count: 1,
            link_quality: 255,
            allocated_data_slots: 0,
        }];
        let changed = table.process_routing_table_message(2, &entries, 1000, 255, 10);
        assert!(changed);
        assert_eq!(table.find_next_hop(2), Some(2));
        assert_eq!(table.find_next_hop(3), Some(2));
        let route_to_3 = table.get_node(3).unwrap();
        assert_eq!(route_to_3.hop_count, 2);
    }

    #[test]
    fn process_routing_table_message_skips_self_and_zero() {
        let table = DistanceVectorRoutingTable::new(1);
        let entries = vec![
            RoutingTableEntry {
                destination: 1,
                hop_count: 1,
                link_quality: 255,
                allocated_data_slots: 0,
            },
            RoutingTableEntry {
                destination: 0,
                hop_count: 1,
                link_quality: 255,
                allocated_data_slots: 0,
            },
        ];
        table.process_routing_table_message(2, &entries, 1000, 255, 10);
        assert_eq!(table.get_nodes().len(), 1); // only the direct neighbor
    }

    #[test]
    fn repeated_identical_message_is_stable() {
        let table = DistanceVectorRoutingTable::new(1);
        let entries = vec![RoutingTableEntry {
            destination: 3,
            hop_count: 1,
            link_quality: 200,
            allocated_data_slots: 0,
        }];
        table.process_routing_table_message(2, &entries, 1000, 200, 10);
        let before = table.get_node(3).unwrap();
        table.process_routing_table_message(2, &entries, 1001, 200, 10);
        let after = table.get_node(3).unwrap();
        assert_eq!(before.hop_count, after.hop_count);
        assert_eq!(before.next_hop, after.next_hop);
    }

    #[test]
    fn remove_inactive_marks_then_evicts() {
        let table = DistanceVectorRoutingTable::new(1);
        table.update_route(2, 3, 1, 255, 0, 0).unwrap();
        let removed = table.remove_inactive(100, 50, 1000);
        assert_eq!(removed, 0);
        assert!(!table.get_node(3).unwrap().is_active);
        let removed = table.remove_inactive(2000, 50, 1000);
        assert_eq!(removed, 1);
        assert!(table.get_node(3).is_none());
    }

    #[test]
    fn capacity_eviction_protects_manager() {
        let table = DistanceVectorRoutingTable::with_limits(1, 10, 2);
        table.update_node(2, 50, true, 0, NodeCapabilities::empty(), 10);
        table.update_node(3, 50, false, 0, NodeCapabilities::empty(), 20);
        assert!(table.update_route(4, 4, 1, 100, 0, 30).unwrap());
        assert!(table.get_node(2).is_some(), "manager must never be evicted");
        assert!(table.get_node(3).is_none());
    }

    #[test]
    fn capacity_eviction_fails_when_all_entries_are_managers() {
        let table = DistanceVectorRoutingTable::with_limits(1, 10, 1);
        table.update_node(2, 50, true, 0, NodeCapabilities::empty(), 10);
        let err = table.update_route(5, 5, 1, 100, 0, 20).unwrap_err();
        assert!(matches!(err, MeshError::CapacityExceeded(_)));
    }

    #[test]
    fn capabilities_display_matches_expected_format() {
        let caps = NodeCapabilities::ROUTER | NodeCapabilities::GATEWAY;
        assert_eq!(caps.to_string(), "ROUTER | GATEWAY");
        assert_eq!(NodeCapabilities::empty().to_string(), "NONE");
    }

    #[test]
    fn local_link_quality_matches_ratio() {
        let mut route = NetworkNodeRoute::new_direct(2, 0);
        route.messages_expected = 10;
        route.messages_received = 5;
        assert_eq!(route.local_link_quality(), 127);
    }
}
