//! Network service: the lifecycle state machine plus routing-update
//! dispatch. Owns no components itself — the coordinator constructs the
//! routing table, node registry, scheduler, and dispatcher and hands them
//! in as shared references.

use std::sync::{Arc, Mutex};

use crate::config::LoRaMeshProtocolConfig;
use crate::dispatcher::MessageQueueDispatcher;
use crate::error::MeshError;
use crate::registry::NetworkNodeRegistry;
use crate::routing::{DistanceVectorRoutingTable, NodeCapabilities};
use crate::rtos::Rtos;
use crate::superframe::{SlotTable, SlotType, SuperframeScheduler};
use crate::time::elapsed;
use crate::wire::{BaseHeader, JoinResponseStatus, Message, MessageType};

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Initializing,
    Discovery,
    Joining,
    NormalOperation,
    NetworkManager,
    FaultRecovery,
}

/// Event surfaced to the coordinator (or any other observer) for routing
/// changes and delivered application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    RouteAdded { destination: u16, next_hop: u16, hop_count: u8 },
    RouteRemoved { destination: u16 },
    DataReceived { source: u16, payload: Vec<u8> },
}

pub type NetworkEventCallback = Box<dyn Fn(NetworkEvent) + Send + Sync>;

struct JoinProgress {
    attempt: u8,
    next_retry_at_ms: Option<u32>,
}

struct ServiceState {
    protocol_state: ProtocolState,
    network_manager_addr: Option<u16>,
    network_id: Option<u16>,
    allocated_slots: u8,
    discovery_started_at_ms: u32,
    last_manager_seen_ms: u32,
    join: JoinProgress,
    slot_table: SlotTable,
    last_broadcast_superframe_start_ms: u32,
}

/// The lifecycle state machine and routing-update dispatcher for one node.
pub struct NetworkService<R: Rtos> {
    self_address: u16,
    config: LoRaMeshProtocolConfig,
    routing: Arc<DistanceVectorRoutingTable>,
    registry: Arc<NetworkNodeRegistry>,
    scheduler: Arc<SuperframeScheduler<R>>,
    dispatcher: Arc<MessageQueueDispatcher>,
    state: Mutex<ServiceState>,
    on_event: Mutex<Option<NetworkEventCallback>>,
}

impl<R: Rtos> NetworkService<R> {
    pub fn new(
        config: LoRaMeshProtocolConfig,
        routing: Arc<DistanceVectorRoutingTable>,
        registry: Arc<NetworkNodeRegistry>,
        scheduler: Arc<SuperframeScheduler<R>>,
        dispatcher: Arc<MessageQueueDispatcher>,
    ) -> Self {
        let self_address = config.node_address;
        let total_slots = config.total_slots;
        NetworkService {
            self_address,
            config,
            routing,
            registry,
            scheduler,
            dispatcher,
            state: Mutex::new(ServiceState {
                protocol_state: ProtocolState::Initializing,
                network_manager_addr: None,
                network_id: None,
                allocated_slots: 0,
                discovery_started_at_ms: 0,
                last_manager_seen_ms: 0,
                join: JoinProgress {
                    attempt: 0,
                    next_retry_at_ms: None,
                },
                slot_table: SlotTable::new(total_slots),
                last_broadcast_superframe_start_ms: 0,
            }),
            on_event: Mutex::new(None),
        }
    }

    pub fn set_on_event(&self, callback: NetworkEventCallback) {
        *self.on_event.lock().unwrap() = Some(callback);
    }

    fn emit(&self, event: NetworkEvent) {
        if let Some(cb) = self.on_event.lock().unwrap().as_ref() {
            cb(event);
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state.lock().unwrap().protocol_state
    }

    pub fn network_manager_address(&self) -> Option<u16> {
        self.state.lock().unwrap().network_manager_addr
    }

    pub fn is_synchronized(&self) -> bool {
        self.scheduler.is_synchronized()
    }

    fn set_state(&self, new_state: ProtocolState) {
        let mut state = self.state.lock().unwrap();
        state.protocol_state = new_state;
        drop(state);
        self.scheduler.set_update_start_on_new_frame(matches!(
            new_state,
            ProtocolState::NetworkManager | ProtocolState::Initializing
        ));
    }

    /// Begins operation: `Initializing` → `Discovery`.
    pub fn start(&self, now: u32) -> Result<(), MeshError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.protocol_state != ProtocolState::Initializing {
                return Err(MeshError::InvalidState(
                    "start() is only valid from Initializing".into(),
                ));
            }
            state.discovery_started_at_ms = now;
        }
        self.set_state(ProtocolState::Discovery);
        self.recompute_slot_table();
        Ok(())
    }

    fn become_network_manager(&self, now: u32) {
        self.routing.update_node(
            self.self_address,
            100,
            true,
            self.config.default_data_slots,
            NodeCapabilities::ROUTER,
            now,
        );
        {
            let mut state = self.state.lock().unwrap();
            state.network_manager_addr = Some(self.self_address);
            state.network_id = Some(self.self_address);
            state.allocated_slots = self.config.default_data_slots;
            state.last_manager_seen_ms = now;
        }
        self.set_state(ProtocolState::NetworkManager);
        self.recompute_slot_table();
    }

    /// Called once `discovery_timeout_ms` has elapsed with no manager
    /// observed. No-op if a manager was already found (state moved past
    /// Discovery in the meantime).
    pub fn on_discovery_timeout(&self, now: u32) {
        if self.state.lock().unwrap().protocol_state != ProtocolState::Discovery {
            return;
        }
        self.become_network_manager(now);
    }

    fn begin_join(&self, manager_addr: u16, now: u32) {
        {
            let mut state = self.state.lock().unwrap();
            state.network_manager_addr = Some(manager_addr);
            state.last_manager_seen_ms = now;
            state.join.attempt = 0;
            state.join.next_retry_at_ms = Some(now);
        }
        self.set_state(ProtocolState::Joining);
    }

    fn queue_join_request(&self, manager_addr: u16) {
        let header = BaseHeader {
            destination: manager_addr,
            source: self.self_address,
            message_type: MessageType::JoinRequest,
            payload_size: 1,
        };
        let message = Message::JoinRequest {
            header,
            payload: vec![self.config.default_data_slots],
        };
        self.dispatcher.enqueue(SlotType::DiscoveryTx, message);
    }

    /// Handles one received, already-decoded frame. `now` is the
    /// reception timestamp.
    pub fn handle_message(&self, message: &Message, now: u32) -> Result<(), MeshError> {
        match message {
            Message::RouteTable {
                header,
                network_manager_addr,
                entries,
                ..
            } => self.handle_route_table(header.source, *network_manager_addr, entries, now),
            Message::JoinRequest { header, payload } => {
                self.handle_join_request(header.source, payload.first().copied().unwrap_or(0), now)
            }
            Message::JoinResponse {
                header,
                network_id,
                allocated_slots,
                status,
            } => self.handle_join_response(header, *network_id, *allocated_slots, *status, now),
            Message::Data { header, payload } => self.handle_data(header, payload, now),
            Message::SlotAllocation { header, payload } => {
                self.handle_slot_allocation(header, payload, now)
            }
            Message::SlotRequest { .. } | Message::Ping { .. } => Ok(()),
        }
    }

    fn handle_route_table(
        &self,
        source: u16,
        network_manager_addr: u16,
        entries: &[crate::wire::RoutingTableEntry],
        now: u32,
    ) -> Result<(), MeshError> {
        let local_quality = self
            .routing
            .get_node(source)
            .map(|r| r.composite_link_quality())
            .unwrap_or(200);
        let changed = self.routing.process_routing_table_message(
            source,
            entries,
            now,
            local_quality,
            self.config.max_hops,
        );
        if changed {
            if let Some(route) = self.routing.get_node(source) {
                self.emit(NetworkEvent::RouteAdded {
                    destination: route.destination,
                    next_hop: route.next_hop,
                    hop_count: route.hop_count,
                });
            }
        }

        let current_state = self.state();
        match current_state {
            ProtocolState::Discovery => {
                self.begin_join(network_manager_addr, now);
                self.queue_join_request(network_manager_addr);
            }
            ProtocolState::Joining | ProtocolState::NormalOperation => {
                let tracked = self.state.lock().unwrap().network_manager_addr;
                if tracked == Some(network_manager_addr) {
                    self.state.lock().unwrap().last_manager_seen_ms = now;
                } else if tracked != Some(network_manager_addr) && network_manager_addr != self.self_address
                {
                    // Manager identity changed underneath us; re-evaluate by
                    // re-joining the newly advertised manager.
                    self.begin_join(network_manager_addr, now);
                }
            }
            ProtocolState::NetworkManager => {
                if network_manager_addr != self.self_address {
                    // Another manager is advertising; the lower address wins,
                    // mirroring a simple split-brain tiebreaker for merges.
                    if network_manager_addr < self.self_address {
                        self.begin_join(network_manager_addr, now);
                    }
                }
            }
            ProtocolState::Initializing | ProtocolState::FaultRecovery => {}
        }
        self.recompute_slot_table();
        Ok(())
    }

    fn handle_join_request(&self, requester: u16, requested_slots: u8, now: u32) -> Result<(), MeshError> {
        let is_manager = matches!(self.state(), ProtocolState::NetworkManager);
        if !is_manager {
            return Ok(());
        }
        let active_count = self
            .routing
            .get_nodes()
            .iter()
            .filter(|n| n.is_active && !n.is_network_manager)
            .count() as u16;
        let status = if self.config.max_network_nodes != 0 && active_count >= self.config.max_network_nodes {
            JoinResponseStatus::CapacityExceeded
        } else {
            JoinResponseStatus::Accepted
        };
        let granted_slots = requested_slots.min(self.config.default_data_slots).max(1);
        if status == JoinResponseStatus::Accepted {
            self.routing.update_route(requester, requester, 1, 200, granted_slots, now)?;
            self.registry
                .update_node(requester, 0, false, NodeCapabilities::empty(), granted_slots, now);
        }
        let network_id = self.state.lock().unwrap().network_id.unwrap_or(self.self_address);
        let header = BaseHeader {
            destination: requester,
            source: self.self_address,
            message_type: MessageType::JoinResponse,
            payload_size: 0,
        };
        let response = Message::JoinResponse {
            header,
            network_id,
            allocated_slots: granted_slots,
            status,
        };
        self.dispatcher.enqueue(SlotType::ControlTx, response);
        self.recompute_slot_table();
        Ok(())
    }

    fn handle_join_response(
        &self,
        header: &BaseHeader,
        network_id: u16,
        allocated_slots: u8,
        status: JoinResponseStatus,
        now: u32,
    ) -> Result<(), MeshError> {
        if header.destination != self.self_address || self.state() != ProtocolState::Joining {
            return Ok(());
        }
        match status {
            JoinResponseStatus::Accepted => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.network_id = Some(network_id);
                    state.allocated_slots = allocated_slots;
                    state.last_manager_seen_ms = now;
                }
                self.set_state(ProtocolState::NormalOperation);
                self.recompute_slot_table();
            }
            JoinResponseStatus::RetryLater => {
                let mut state = self.state.lock().unwrap();
                state.join.attempt += 1;
                if state.join.attempt >= self.config.max_join_retries {
                    drop(state);
                    self.set_state(ProtocolState::FaultRecovery);
                } else {
                    let superframe_duration =
                        self.config.total_slots as u32 * self.config.slot_duration_ms;
                    let base_delay = self.config.retry_delay_superframes * superframe_duration;
                    let backoff = self
                        .config
                        .backoff_multiplier
                        .saturating_pow(state.join.attempt as u32);
                    let delay = base_delay
                        .saturating_mul(backoff)
                        .min(self.config.max_retry_delay_ms);
                    state.join.next_retry_at_ms = Some(now.wrapping_add(delay));
                }
            }
            JoinResponseStatus::Rejected
            | JoinResponseStatus::CapacityExceeded
            | JoinResponseStatus::AuthFailed => {
                self.set_state(ProtocolState::FaultRecovery);
            }
        }
        Ok(())
    }

    fn handle_data(&self, header: &BaseHeader, payload: &[u8], now: u32) -> Result<(), MeshError> {
        if header.destination == self.self_address || header.destination == crate::wire::ADDRESS_BROADCAST
        {
            self.emit(NetworkEvent::DataReceived {
                source: header.source,
                payload: payload.to_vec(),
            });
            if header.destination != crate::wire::ADDRESS_BROADCAST {
                return Ok(());
            }
        }
        if let Some(next_hop) = self.routing.find_next_hop(header.destination) {
            if next_hop != self.self_address {
                let forwarded = Message::Data {
                    header: *header,
                    payload: payload.to_vec(),
                };
                self.dispatcher.enqueue(SlotType::Tx, forwarded);
            }
        }
        let _ = now;
        Ok(())
    }

    fn handle_slot_allocation(&self, header: &BaseHeader, payload: &[u8], _now: u32) -> Result<(), MeshError> {
        if header.destination == self.self_address {
            if let Some(&slots) = payload.first() {
                self.state.lock().unwrap().allocated_slots = slots;
                self.recompute_slot_table();
            }
        }
        Ok(())
    }

    /// Periodic housekeeping driven by the coordinator, once per
    /// superframe (or more often): discovery timeout, join retry/backoff,
    /// manager-liveness check, and periodic routing broadcast.
    pub fn run_maintenance(&self, now: u32) {
        let current_state = self.state();
        match current_state {
            ProtocolState::Initializing => {}
            ProtocolState::Discovery => {
                let started = self.state.lock().unwrap().discovery_started_at_ms;
                if elapsed(now, started) >= self.config.discovery_timeout_ms {
                    self.on_discovery_timeout(now);
                }
            }
            ProtocolState::Joining => {
                let manager = self.state.lock().unwrap().network_manager_addr;
                let due = {
                    let state = self.state.lock().unwrap();
                    state
                        .join
                        .next_retry_at_ms
                        .map(|t| elapsed(now, t) < u32::MAX / 2)
                        .unwrap_or(false)
                };
                if due {
                    if let Some(manager_addr) = manager {
                        self.queue_join_request(manager_addr);
                    }
                    self.state.lock().unwrap().join.next_retry_at_ms = None;
                }
            }
            ProtocolState::NormalOperation => {
                let last_seen = self.state.lock().unwrap().last_manager_seen_ms;
                if elapsed(now, last_seen) >= self.config.node_timeout_ms {
                    self.set_state(ProtocolState::FaultRecovery);
                } else {
                    self.maybe_broadcast_routes(now);
                }
            }
            ProtocolState::NetworkManager => {
                self.routing.remove_inactive(
                    now,
                    self.config.route_timeout_ms,
                    self.config.node_timeout_ms,
                );
                self.maybe_broadcast_routes(now);
            }
            ProtocolState::FaultRecovery => {
                self.routing.clear();
                {
                    let mut state = self.state.lock().unwrap();
                    state.network_manager_addr = None;
                    state.discovery_started_at_ms = now;
                }
                self.set_state(ProtocolState::Discovery);
            }
        }
    }

    fn maybe_broadcast_routes(&self, now: u32) {
        if self.dispatcher.has_message_of_type(MessageType::RouteTable) {
            return;
        }
        let message = self.build_route_table_message(now);
        self.dispatcher.enqueue(SlotType::ControlTx, message);
    }

    /// Builds a routing-table broadcast from the current routing state,
    /// without touching the dispatcher queue. Used both for the periodic
    /// broadcast above and for synthesizing a fallback frame when a
    /// CONTROL_TX slot arrives with nothing already queued.
    pub fn build_route_table_message(&self, now: u32) -> Message {
        let manager_addr = self
            .state
            .lock()
            .unwrap()
            .network_manager_addr
            .unwrap_or(self.self_address);
        let entries = self.routing.routing_entries_for_broadcast(self.self_address);
        let header = BaseHeader {
            destination: crate::wire::ADDRESS_BROADCAST,
            source: self.self_address,
            message_type: MessageType::RouteTable,
            payload_size: 0,
        };
        Message::RouteTable {
            header,
            network_manager_addr: manager_addr,
            table_version: (now / self.config.hello_interval_ms.max(1)) as u8,
            entries,
        }
    }

    /// Rebuilds this node's slot table from its role, the configured
    /// slot-region sizes, and currently known neighbors.
    pub fn recompute_slot_table(&self) {
        let total = self.config.total_slots;
        let discovery_slots = self.config.default_discovery_slots.min(total as u8) as u16;
        let control_slots = self
            .config
            .default_control_slots
            .min((total.saturating_sub(discovery_slots)) as u8) as u16;
        let data_region_start = discovery_slots + control_slots;
        let data_slots = total.saturating_sub(data_region_start);

        let mut table = SlotTable::new(total);
        let is_manager = matches!(self.state(), ProtocolState::NetworkManager);
        let seeking_manager = matches!(
            self.state(),
            ProtocolState::Discovery | ProtocolState::Joining
        );

        for slot in 0..discovery_slots {
            let slot_type = if slot == 0 && seeking_manager && !is_manager {
                SlotType::DiscoveryTx
            } else {
                SlotType::DiscoveryRx
            };
            table.set(slot, slot_type);
        }

        if control_slots > 0 {
            let own_control_slot = discovery_slots + (self.self_address % control_slots);
            for slot in discovery_slots..data_region_start {
                let slot_type = if slot == own_control_slot {
                    SlotType::ControlTx
                } else {
                    SlotType::ControlRx
                };
                table.set(slot, slot_type);
            }
        }

        if data_slots > 0 {
            let allocated = self.state.lock().unwrap().allocated_slots.max(1) as u16;
            let own_start = data_region_start + (self.self_address % data_slots);
            for offset in 0..allocated.min(data_slots) {
                let slot = data_region_start + ((own_start - data_region_start + offset) % data_slots);
                table.set(slot, SlotType::Tx);
            }
            for slot in data_region_start..total {
                if table.get(slot) == SlotType::Sleep {
                    table.set(slot, SlotType::Rx);
                }
            }
        }

        self.state.lock().unwrap().slot_table = table;
    }

    pub fn slot_table(&self) -> SlotTable {
        self.state.lock().unwrap().slot_table.clone()
    }

    pub fn dispatcher(&self) -> &Arc<MessageQueueDispatcher> {
        &self.dispatcher
    }

    pub fn routing_table(&self) -> &Arc<DistanceVectorRoutingTable> {
        &self.routing
    }

    pub fn registry(&self) -> &Arc<NetworkNodeRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtos::virtual_rtos::VirtualRtos;

    fn make_service(address: u16) -> NetworkService<VirtualRtos> {
        let mut config = LoRaMeshProtocolConfig::default();
        config.node_address = address;
        config.discovery_timeout_ms = 1000;
        let rtos = Arc::new(VirtualRtos::new());
        let routing = Arc::new(DistanceVectorRoutingTable::with_limits(
            address,
            config.max_hops,
            config.max_network_nodes,
        ));
        let registry = Arc::new(NetworkNodeRegistry::new(config.max_network_nodes));
        let scheduler = SuperframeScheduler::new(rtos, config.total_slots, config.slot_duration_ms);
        let dispatcher = Arc::new(MessageQueueDispatcher::new());
        NetworkService::new(config, routing, registry, scheduler, dispatcher)
    }

    #[test]
    fn single_node_becomes_network_manager_after_discovery_timeout() {
        let service = make_service(1);
        service.start(0).unwrap();
        assert_eq!(service.state(), ProtocolState::Discovery);
        service.run_maintenance(1001);
        assert_eq!(service.state(), ProtocolState::NetworkManager);
        assert_eq!(service.network_manager_address(), Some(1));
    }

    #[test]
    fn route_table_during_discovery_triggers_join() {
        let service = make_service(2);
        service.start(0).unwrap();
        let entries = vec![];
        service
            .handle_route_table(10, 10, &entries, 100)
            .unwrap();
        assert_eq!(service.state(), ProtocolState::Joining);
        assert_eq!(service.network_manager_address(), Some(10));
        assert!(!service.dispatcher().is_empty(SlotType::DiscoveryTx));
    }

    #[test]
    fn accepted_join_response_moves_to_normal_operation() {
        let service = make_service(2);
        service.start(0).unwrap();
        service.handle_route_table(10, 10, &[], 100).unwrap();
        let header = BaseHeader {
            destination: 2,
            source: 10,
            message_type: MessageType::JoinResponse,
            payload_size: 0,
        };
        service
            .handle_join_response(&header, 10, 2, JoinResponseStatus::Accepted, 150)
            .unwrap();
        assert_eq!(service.state(), ProtocolState::NormalOperation);
    }

    #[test]
    fn manager_accepts_join_request_under_capacity() {
        let service = make_service(1);
        service.start(0).unwrap();
        service.run_maintenance(2000);
        assert_eq!(service.state(), ProtocolState::NetworkManager);
        service.handle_join_request(5, 2, 2100).unwrap();
        assert!(!service.dispatcher().is_empty(SlotType::ControlTx));
        match service.dispatcher().extract(SlotType::ControlTx).unwrap() {
            Message::JoinResponse { status, .. } => assert_eq!(status, JoinResponseStatus::Accepted),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn manager_loss_triggers_fault_recovery_then_rediscovery() {
        let service = make_service(2);
        service.start(0).unwrap();
        service.handle_route_table(10, 10, &[], 100).unwrap();
        let header = BaseHeader {
            destination: 2,
            source: 10,
            message_type: MessageType::JoinResponse,
            payload_size: 0,
        };
        service
            .handle_join_response(&header, 10, 2, JoinResponseStatus::Accepted, 150)
            .unwrap();
        assert_eq!(service.state(), ProtocolState::NormalOperation);
        service.run_maintenance(150 + service.config.node_timeout_ms + 1);
        assert_eq!(service.state(), ProtocolState::Discovery);
    }
}
