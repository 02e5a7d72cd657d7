//! Protocol configuration: the parameters the coordinator loads once at
//! start and hands down to each component.

use crate::error::MeshError;
use serde::{Deserialize, Serialize};

/// Configuration for a LoRaMesh node. Every field has a conservative default;
/// `validate()` must be called before the configuration is handed to the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoRaMeshProtocolConfig {
    /// This node's 16-bit address. Must not be `0x0000` or `0xFFFF`.
    pub node_address: u16,
    /// Interval, in milliseconds, between unsolicited routing broadcasts.
    pub hello_interval_ms: u32,
    /// Age, in milliseconds, after which a route is marked inactive.
    pub route_timeout_ms: u32,
    /// Age, in milliseconds, after which a node entry is evicted entirely.
    pub node_timeout_ms: u32,
    /// Maximum hop count a route may carry before being rejected.
    pub max_hops: u8,
    /// Maximum total frame size in bytes (header + trailer + payload).
    pub max_packet_size: u8,
    /// Maximum number of nodes the routing table / registry will hold. 0 = unlimited.
    pub max_network_nodes: u16,
    /// Default number of data slots allocated to a newly joined node.
    pub default_data_slots: u8,
    /// Default number of control slots in the superframe.
    pub default_control_slots: u8,
    /// Default number of discovery slots in the superframe.
    pub default_discovery_slots: u8,
    /// Slot duration in milliseconds.
    pub slot_duration_ms: u32,
    /// Total number of slots in one superframe.
    pub total_slots: u16,
    /// Guard time, in milliseconds, reserved at the edge of each slot.
    pub guard_time_ms: u32,
    /// How long, in milliseconds, a node listens during Discovery before
    /// declaring itself network manager.
    pub discovery_timeout_ms: u32,
    /// Base retry delay for a `RetryLater` join response, in superframes.
    pub retry_delay_superframes: u32,
    /// Maximum number of join attempts before giving up.
    pub max_join_retries: u8,
    /// Multiplier applied to the retry delay on each successive attempt.
    pub backoff_multiplier: u32,
    /// Hard ceiling on the join retry delay, in milliseconds.
    pub max_retry_delay_ms: u32,
}

impl Default for LoRaMeshProtocolConfig {
    fn default() -> Self {
        LoRaMeshProtocolConfig {
            node_address: 0x0001,
            hello_interval_ms: 120_000,
            route_timeout_ms: 300_000,
            node_timeout_ms: 600_000,
            max_hops: 10,
            max_packet_size: 255,
            max_network_nodes: 64,
            default_data_slots: 2,
            default_control_slots: 2,
            default_discovery_slots: 2,
            slot_duration_ms: 100,
            total_slots: 16,
            guard_time_ms: 5,
            discovery_timeout_ms: 5_000,
            retry_delay_superframes: 4,
            max_join_retries: 5,
            backoff_multiplier: 2,
            max_retry_delay_ms: 60_000,
        }
    }
}

impl LoRaMeshProtocolConfig {
    /// Builds the default configuration, matching `CreateDefault` in the
    /// original protocol configuration type.
    pub fn create_default() -> Self {
        Self::default()
    }

    /// Validates every field, returning the first out-of-range field named
    /// in the error.
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.node_address == 0x0000 || self.node_address == 0xFFFF {
            return Err(MeshError::invalid_argument(
                "node_address",
                "must not be the reserved none (0x0000) or broadcast (0xFFFF) address",
            ));
        }
        if self.hello_interval_ms == 0 {
            return Err(MeshError::invalid_argument(
                "hello_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.route_timeout_ms == 0 {
            return Err(MeshError::invalid_argument(
                "route_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.node_timeout_ms < self.route_timeout_ms {
            return Err(MeshError::invalid_argument(
                "node_timeout_ms",
                "must be at least route_timeout_ms",
            ));
        }
        if self.max_hops == 0 {
            return Err(MeshError::invalid_argument(
                "max_hops",
                "must be at least one",
            ));
        }
        if self.max_packet_size == 0 {
            return Err(MeshError::invalid_argument(
                "max_packet_size",
                "must be greater than zero",
            ));
        }
        if self.total_slots == 0 {
            return Err(MeshError::invalid_argument(
                "total_slots",
                "must be at least one",
            ));
        }
        if self.slot_duration_ms == 0 {
            return Err(MeshError::invalid_argument(
                "slot_duration_ms",
                "must be greater than zero",
            ));
        }
        let control_and_discovery =
            self.default_control_slots as u32 + self.default_discovery_slots as u32;
        if control_and_discovery as u16 > self.total_slots {
            return Err(MeshError::invalid_argument(
                "default_control_slots",
                "control + discovery slots must not exceed total_slots",
            ));
        }
        if self.backoff_multiplier == 0 {
            return Err(MeshError::invalid_argument(
                "backoff_multiplier",
                "must be at least one",
            ));
        }
        if self.max_retry_delay_ms == 0 {
            return Err(MeshError::invalid_argument(
                "max_retry_delay_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
