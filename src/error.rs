//! # LoRaMesh Error Handling
//!
//! This module defines the `MeshError` enum, the single error type returned
//! by every fallible public operation in the crate.

use thiserror::Error;

/// Represents the different error kinds that can occur in the LoRaMesh core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// The wire codec rejected malformed input.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A caller-supplied parameter was out of range.
    #[error("invalid argument: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// The operation is not permitted in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A routing table, queue, or node registry is full with no evictable entry.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The radio driver reported a hardware failure.
    #[error("hardware error: {0}")]
    HardwareError(String),

    /// A waited operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// A provided buffer was too small for the data.
    #[error("buffer overflow: needed {needed}, had {available}")]
    BufferOverflow { needed: usize, available: usize },

    /// Serialization would have produced a frame exceeding the 255-byte limit.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl MeshError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        MeshError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MeshError>;
