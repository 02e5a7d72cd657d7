//! # loramesh - a TDMA mesh networking protocol core for LoRa radios
//!
//! `loramesh` implements the node-side protocol for a small, synchronized,
//! multi-hop mesh over LoRa: a superframe scheduler divides time into
//! transmit/receive/sleep slots, a distance-vector routing table tracks
//! reachability and link quality, and a lifecycle state machine takes a
//! node from cold start through discovery, joining, and steady-state
//! operation (or, for exactly one node per network, network-manager duty).
//!
//! The core is transport- and RTOS-agnostic: [`radio::RadioDriver`] is the
//! only seam to physical hardware, and every task-spawning component is
//! generic over [`rtos::Rtos`] rather than tied to a specific concurrency
//! runtime. [`rtos::virtual_rtos::VirtualRtos`] plus [`radio::MockRadio`]
//! let the full stack run under a deterministic virtual clock for testing.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use loramesh::config::LoRaMeshProtocolConfig;
//! use loramesh::coordinator::ProtocolCoordinator;
//! use loramesh::rtos::std_rtos::StdRtos;
//! use loramesh::radio::{MockRadio, MockRadioBus};
//!
//! let config = LoRaMeshProtocolConfig::default();
//! let rtos = Arc::new(StdRtos::new());
//! let bus = MockRadioBus::new(0);
//! let radio = MockRadio::new(config.node_address, &bus);
//! let coordinator = ProtocolCoordinator::new(config, rtos.clone(), radio).unwrap();
//! coordinator.start(rtos.tick_count()).unwrap();
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod network;
pub mod radio;
pub mod registry;
pub mod routing;
pub mod rtos;
pub mod superframe;
pub mod time;
pub mod wire;

pub use crate::config::LoRaMeshProtocolConfig;
pub use crate::coordinator::ProtocolCoordinator;
pub use crate::error::{MeshError, Result};
pub use crate::logging::{init_logger, log_debug, log_error, log_info, log_warn};
pub use crate::network::{NetworkEvent, NetworkService, ProtocolState};
pub use crate::rtos::Rtos;
pub use crate::wire::Message;
