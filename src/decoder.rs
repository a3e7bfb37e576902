//! The state-payload decoding seam.
//!
//! Decoding a reassembled state payload into a `DeviceSnapshot` is
//! firmware-format-specific and deliberately kept outside this crate's
//! concerns (see spec's Non-goals); callers supply a `StateDecoder`.
//! A decode failure never reaches a caller as an `Error` — it's logged
//! and the datagram is dropped, same as any other malformed input.

use std::fmt;

use crate::types::DeviceSnapshot;

/// Why a state payload couldn't be turned into a `DeviceSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode device state: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a reassembled state payload into a `DeviceSnapshot`.
///
/// This is an external collaborator interface: this crate ships no
/// concrete implementation, since the on-wire state encoding is
/// firmware- and model-specific.
pub trait StateDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<DeviceSnapshot, DecodeError>;
}
