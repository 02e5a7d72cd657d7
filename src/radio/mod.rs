//! Radio driver trait and a mock implementation for tests. Production
//! hardware binds an SX126x/RFM9x-style driver against the same trait; the
//! core never depends on a concrete chip.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::MeshError;

/// Power state the radio can be commanded into between slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Sleep,
    Receive,
    Transmit,
    Idle,
}

/// Minimal LoRa modulation configuration the core needs to size slot
/// durations; a concrete driver maps these onto its own register set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioConfig {
    pub frequency_hz: u32,
    pub bandwidth_hz: u32,
    pub spreading_factor: u8,
    pub coding_rate_denominator: u8,
    pub tx_power_dbm: i8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            frequency_hz: 868_000_000,
            bandwidth_hz: 125_000,
            spreading_factor: 7,
            coding_rate_denominator: 5,
            tx_power_dbm: 14,
        }
    }
}

/// A frame delivered from the radio, as handed to the ISR-equivalent
/// receive callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub bytes: Vec<u8>,
    pub rssi_dbm: i8,
    pub snr_db: i8,
}

/// Callback type for [`RadioDriver::set_on_receive`]. Invoked from an
/// ISR-equivalent context; implementations must not block in it.
pub type ReceiveCallback = Box<dyn Fn(ReceivedFrame) + Send + Sync>;

/// Narrow interface the coordinator drives the physical radio through.
pub trait RadioDriver: Send + Sync {
    fn configure(&self, config: RadioConfig) -> Result<(), MeshError>;
    fn begin(&self, config: RadioConfig) -> Result<(), MeshError>;
    fn sleep(&self) -> Result<(), MeshError>;
    fn start_receive(&self) -> Result<(), MeshError>;

    /// Hands `bytes` to the hardware for transmission. Returns once the
    /// frame has been handed off, not after airtime completes.
    fn send(&self, bytes: &[u8]) -> Result<(), MeshError>;
    fn set_state(&self, state: RadioState) -> Result<(), MeshError>;
    fn set_on_receive(&self, callback: ReceiveCallback);

    /// Estimated time-on-air, in milliseconds, for a frame of `length_bytes`.
    fn time_on_air(&self, length_bytes: usize) -> u32;

    fn rssi(&self) -> i8;
    fn snr(&self) -> i8;
    fn is_transmitting(&self) -> bool;
}

struct MockRadioState {
    config: RadioConfig,
    radio_state: RadioState,
    is_transmitting: bool,
    last_rssi: i8,
    last_snr: i8,
    on_receive: Option<ReceiveCallback>,
}

/// A shared in-memory bus with configurable packet loss, letting a test
/// put several [`MockRadio`] instances on the same "air" for deterministic
/// multi-node scenarios: every registered radio sees every other's
/// transmissions, dropped uniformly at random at the configured rate.
pub struct MockRadioBus {
    peers: Mutex<Vec<Arc<MockRadio>>>,
    loss_numerator: Mutex<u32>,
    loss_denominator: u32,
    rng_state: Mutex<u64>,
}

impl MockRadioBus {
    pub fn new(loss_rate_percent: u32) -> Arc<Self> {
        Arc::new(MockRadioBus {
            peers: Mutex::new(Vec::new()),
            loss_numerator: Mutex::new(loss_rate_percent.min(100)),
            loss_denominator: 100,
            rng_state: Mutex::new(0x9E3779B97F4A7C15),
        })
    }

    fn register(self: &Arc<Self>, radio: Arc<MockRadio>) {
        self.peers.lock().unwrap().push(radio);
    }

    fn next_roll(&self) -> u32 {
        let mut state = self.rng_state.lock().unwrap();
        // xorshift64star, deterministic and dependency-free.
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state % 100) as u32
    }

    fn should_drop(&self) -> bool {
        let threshold = *self.loss_numerator.lock().unwrap();
        threshold > 0 && self.next_roll() < (threshold * 100 / self.loss_denominator.max(1))
    }

    fn deliver(&self, sender_addr: u16, frame: ReceivedFrame) {
        let peers = self.peers.lock().unwrap();
        for peer in peers.iter() {
            if peer.address == sender_addr {
                continue;
            }
            if self.should_drop() {
                continue;
            }
            peer.receive(frame.clone());
        }
    }
}

/// In-memory [`RadioDriver`] for deterministic tests, connected to peers
/// through a [`MockRadioBus`].
pub struct MockRadio {
    address: u16,
    bus: Arc<MockRadioBus>,
    state: Mutex<MockRadioState>,
    inbox: Mutex<VecDeque<ReceivedFrame>>,
}

impl MockRadio {
    pub fn new(address: u16, bus: &Arc<MockRadioBus>) -> Arc<Self> {
        let radio = Arc::new(MockRadio {
            address,
            bus: bus.clone(),
            state: Mutex::new(MockRadioState {
                config: RadioConfig::default(),
                radio_state: RadioState::Idle,
                is_transmitting: false,
                last_rssi: -60,
                last_snr: 8,
                on_receive: None,
            }),
            inbox: Mutex::new(VecDeque::new()),
        });
        bus.register(radio.clone());
        radio
    }

    fn receive(&self, frame: ReceivedFrame) {
        let state = self.state.lock().unwrap();
        if state.radio_state != RadioState::Receive {
            return;
        }
        if let Some(callback) = state.on_receive.as_ref() {
            callback(frame);
        } else {
            drop(state);
            self.inbox.lock().unwrap().push_back(frame);
        }
    }

    /// Pops one queued received frame when no callback has been
    /// registered (used by tests that poll rather than subscribe).
    pub fn poll_received(&self) -> Option<ReceivedFrame> {
        self.inbox.lock().unwrap().pop_front()
    }
}

impl RadioDriver for MockRadio {
    fn configure(&self, config: RadioConfig) -> Result<(), MeshError> {
        self.state.lock().unwrap().config = config;
        Ok(())
    }

    fn begin(&self, config: RadioConfig) -> Result<(), MeshError> {
        self.configure(config)
    }

    fn sleep(&self) -> Result<(), MeshError> {
        self.set_state(RadioState::Sleep)
    }

    fn start_receive(&self) -> Result<(), MeshError> {
        self.set_state(RadioState::Receive)
    }

    fn send(&self, bytes: &[u8]) -> Result<(), MeshError> {
        if bytes.len() > crate::wire::MAX_FRAME_SIZE {
            return Err(MeshError::BufferOverflow {
                needed: bytes.len(),
                available: crate::wire::MAX_FRAME_SIZE,
            });
        }
        {
            let mut state = self.state.lock().unwrap();
            state.is_transmitting = true;
        }
        self.bus.deliver(
            self.address,
            ReceivedFrame {
                bytes: bytes.to_vec(),
                rssi_dbm: -60,
                snr_db: 8,
            },
        );
        self.state.lock().unwrap().is_transmitting = false;
        Ok(())
    }

    fn set_state(&self, state: RadioState) -> Result<(), MeshError> {
        self.state.lock().unwrap().radio_state = state;
        Ok(())
    }

    fn set_on_receive(&self, callback: ReceiveCallback) {
        self.state.lock().unwrap().on_receive = Some(callback);
    }

    fn time_on_air(&self, length_bytes: usize) -> u32 {
        let state = self.state.lock().unwrap();
        let sf = state.config.spreading_factor.max(7) as u32;
        let bw = state.config.bandwidth_hz.max(1);
        let symbol_time_us = (1u64 << sf) * 1_000_000 / bw as u64;
        let symbols = (length_bytes as u64 + 13).max(8);
        ((symbol_time_us * symbols) / 1000).max(1) as u32
    }

    fn rssi(&self) -> i8 {
        self.state.lock().unwrap().last_rssi
    }

    fn snr(&self) -> i8 {
        self.state.lock().unwrap().last_snr
    }

    fn is_transmitting(&self) -> bool {
        self.state.lock().unwrap().is_transmitting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lossless_bus_delivers_to_all_peers() {
        let bus = MockRadioBus::new(0);
        let a = MockRadio::new(1, &bus);
        let b = MockRadio::new(2, &bus);
        b.start_receive().unwrap();
        a.send(&[1, 2, 3]).unwrap();
        let frame = b.poll_received().expect("frame should be delivered");
        assert_eq!(frame.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn receiver_not_listening_drops_frame() {
        let bus = MockRadioBus::new(0);
        let a = MockRadio::new(1, &bus);
        let b = MockRadio::new(2, &bus);
        b.sleep().unwrap();
        a.send(&[9]).unwrap();
        assert!(b.poll_received().is_none());
    }

    #[test]
    fn callback_is_invoked_instead_of_queuing() {
        let bus = MockRadioBus::new(0);
        let a = MockRadio::new(1, &bus);
        let b = MockRadio::new(2, &bus);
        b.start_receive().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        b.set_on_receive(Box::new(move |_frame| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));
        a.send(&[1]).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let bus = MockRadioBus::new(0);
        let a = MockRadio::new(1, &bus);
        let err = a.send(&vec![0u8; 300]).unwrap_err();
        assert!(matches!(err, MeshError::BufferOverflow { .. }));
    }
}
