//! Protocol coordinator: the top-level owner. Constructs the routing
//! table, registry, dispatcher, scheduler, and network service; runs the
//! single main task that drains received radio frames and turns slot
//! transitions into radio state changes and dispatched frames.

use std::sync::{Arc, Mutex};

use crate::config::LoRaMeshProtocolConfig;
use crate::dispatcher::MessageQueueDispatcher;
use crate::error::MeshError;
use crate::logging::{log_error, log_warn};
use crate::network::{NetworkEvent, NetworkEventCallback, NetworkService};
use crate::radio::{RadioConfig, RadioDriver, RadioState, ReceivedFrame};
use crate::registry::NetworkNodeRegistry;
use crate::routing::DistanceVectorRoutingTable;
use crate::rtos::{QueueReceiveResult, Rtos, TaskPriority};
use crate::superframe::{SlotType, SuperframeScheduler};
use crate::wire::Message;

const RECEIVE_QUEUE_CAPACITY: usize = 32;
const MAINTENANCE_POLL_INTERVAL_MS: u32 = 1;

/// Top-level owner of one node's protocol stack. Generic over the radio
/// driver and the RTOS so the same coordinator code runs against real
/// hardware or a [`crate::radio::MockRadio`] under [`crate::rtos::virtual_rtos::VirtualRtos`].
pub struct ProtocolCoordinator<R: Rtos, Radio: RadioDriver + 'static> {
    rtos: Arc<R>,
    radio: Arc<Radio>,
    config: LoRaMeshProtocolConfig,
    routing: Arc<DistanceVectorRoutingTable>,
    registry: Arc<NetworkNodeRegistry>,
    dispatcher: Arc<MessageQueueDispatcher>,
    scheduler: Arc<SuperframeScheduler<R>>,
    network: Arc<NetworkService<R>>,
    receive_queue: R::Queue<ReceivedFrame>,
    main_task: Mutex<Option<R::Task>>,
}

impl<R: Rtos, Radio: RadioDriver + 'static> ProtocolCoordinator<R, Radio> {
    pub fn new(config: LoRaMeshProtocolConfig, rtos: Arc<R>, radio: Arc<Radio>) -> Result<Arc<Self>, MeshError> {
        config.validate()?;
        let routing = Arc::new(DistanceVectorRoutingTable::with_limits(
            config.node_address,
            config.max_hops,
            config.max_network_nodes,
        ));
        let registry = Arc::new(NetworkNodeRegistry::new(config.max_network_nodes));
        let dispatcher = Arc::new(MessageQueueDispatcher::new());
        dispatcher.set_max_size(config.max_network_nodes.max(8) as usize);
        let scheduler = SuperframeScheduler::new(rtos.clone(), config.total_slots, config.slot_duration_ms);
        let network = Arc::new(NetworkService::new(
            config.clone(),
            routing.clone(),
            registry.clone(),
            scheduler.clone(),
            dispatcher.clone(),
        ));
        let receive_queue = rtos.create_queue(RECEIVE_QUEUE_CAPACITY);

        let coordinator = Arc::new(ProtocolCoordinator {
            rtos,
            radio,
            config,
            routing,
            registry,
            dispatcher,
            scheduler,
            network,
            receive_queue,
            main_task: Mutex::new(None),
        });

        let isr_queue = coordinator.receive_queue.clone();
        let isr_rtos = coordinator.rtos.clone();
        coordinator.radio.set_on_receive(Box::new(move |frame| {
            let _ = isr_rtos.send_to_queue_isr(&isr_queue, frame);
        }));

        Ok(coordinator)
    }

    pub fn network(&self) -> &Arc<NetworkService<R>> {
        &self.network
    }

    pub fn routing_table(&self) -> &Arc<DistanceVectorRoutingTable> {
        &self.routing
    }

    pub fn registry(&self) -> &Arc<NetworkNodeRegistry> {
        &self.registry
    }

    pub fn set_on_network_event(&self, callback: NetworkEventCallback) {
        self.network.set_on_event(callback);
    }

    /// Brings the radio up, arms the scheduler, starts the network
    /// service, and spawns the main drain-and-dispatch task.
    pub fn start(self: &Arc<Self>, now: u32) -> Result<(), MeshError> {
        self.radio.begin(RadioConfig::default())?;
        self.radio.start_receive()?;
        self.network.start(now)?;
        self.scheduler.start(now)?;

        let coordinator = self.clone();
        let task = self.rtos.spawn("protocol-coordinator", TaskPriority::High, move || {
            coordinator.main_loop();
        });
        *self.main_task.lock().unwrap() = Some(task);
        Ok(())
    }

    pub fn stop(&self) -> Result<(), MeshError> {
        self.scheduler.stop()?;
        self.rtos.request_stop();
        if let Some(task) = self.main_task.lock().unwrap().take() {
            self.rtos.delete_task(task);
        }
        self.radio.sleep()?;
        Ok(())
    }

    fn main_loop(self: Arc<Self>) {
        while !self.rtos.should_stop() {
            match self
                .rtos
                .receive_from_queue(&self.receive_queue, MAINTENANCE_POLL_INTERVAL_MS)
            {
                QueueReceiveResult::Ok(frame) => self.handle_received_frame(&frame),
                QueueReceiveResult::Timeout => {}
                QueueReceiveResult::Empty | QueueReceiveResult::Error => break,
            }
            let now = self.rtos.tick_count();
            self.network.run_maintenance(now);
            self.drive_slot(now);
        }
    }

    fn handle_received_frame(&self, frame: &ReceivedFrame) {
        let now = self.rtos.tick_count();
        match Message::deserialize(&frame.bytes) {
            Ok(message) => {
                let _ = self.network.handle_message(&message, now);
            }
            Err(err) => {
                log_warn(
                    self.config.node_address,
                    &format!("dropping malformed frame ({} bytes): {err}", frame.bytes.len()),
                );
            }
        }
    }

    /// Responds to the current slot: switches the radio into the right
    /// state and, for a transmit slot, extracts and sends one queued frame.
    /// If a CONTROL_TX slot has nothing queued, a routing-table broadcast
    /// is synthesized on the fly so convergence keeps making progress.
    fn drive_slot(&self, now: u32) {
        let slot_table = self.network.slot_table();
        let slot_type = self.scheduler.current_slot_type(&slot_table, now);
        match slot_type {
            SlotType::Tx | SlotType::ControlTx | SlotType::DiscoveryTx => {
                let message = self.dispatcher.extract(slot_type).or_else(|| {
                    (slot_type == SlotType::ControlTx).then(|| self.network.build_route_table_message(now))
                });
                if let Some(message) = message {
                    self.transmit(message);
                }
                self.try_start_receive();
            }
            SlotType::Rx | SlotType::ControlRx | SlotType::DiscoveryRx => {
                self.try_start_receive();
            }
            SlotType::Sleep => {
                if let Err(err) = self.radio.sleep() {
                    log_warn(self.config.node_address, &format!("failed to sleep radio: {err}"));
                }
            }
        }
    }

    fn transmit(&self, message: Message) {
        let bytes = match message.serialize() {
            Ok(bytes) => bytes,
            Err(err) => {
                log_error(self.config.node_address, &format!("failed to serialize outgoing frame: {err}"));
                return;
            }
        };
        if let Err(err) = self.radio.set_state(RadioState::Transmit) {
            log_error(self.config.node_address, &format!("failed to switch radio to transmit: {err}"));
            return;
        }
        if let Err(err) = self.radio.send(&bytes) {
            log_error(self.config.node_address, &format!("failed to send frame: {err}"));
        }
    }

    fn try_start_receive(&self) {
        if let Err(err) = self.radio.start_receive() {
            log_warn(self.config.node_address, &format!("failed to start receive: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::MockRadioBus;
    use crate::rtos::virtual_rtos::VirtualRtos;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_isolated_node_becomes_network_manager() {
        let mut config = LoRaMeshProtocolConfig::default();
        config.node_address = 1;
        config.discovery_timeout_ms = 100;
        config.total_slots = 8;
        config.slot_duration_ms = 10;

        let rtos = Arc::new(VirtualRtos::new());
        let bus = MockRadioBus::new(0);
        let radio = crate::radio::MockRadio::new(1, &bus);
        let coordinator = ProtocolCoordinator::new(config, rtos.clone(), radio).unwrap();

        let became_manager = Arc::new(AtomicUsize::new(0));
        let became_manager_clone = became_manager.clone();
        coordinator.set_on_network_event(Box::new(move |event| {
            if let NetworkEvent::RouteAdded { .. } = event {
                became_manager_clone.fetch_add(1, Ordering::SeqCst);
            }
        }));

        coordinator.start(rtos.now()).unwrap();
        for _ in 0..50 {
            rtos.advance_time(20);
            std::thread::sleep(std::time::Duration::from_millis(2));
            if coordinator.network().state() == crate::network::ProtocolState::NetworkManager {
                break;
            }
        }
        assert_eq!(coordinator.network().state(), crate::network::ProtocolState::NetworkManager);
        coordinator.stop().unwrap();
    }
}
