//! Transport abstraction for APDU exchange
//!
//! The card manager is transport-agnostic: anything that can move a command
//! byte string to a card and return the response bytes (including the status
//! word) can drive it. PC/SC, socket relays and test scripts all fit behind
//! the same trait.

use bytes::Bytes;
use thiserror::Error;

/// Errors raised by the underlying card transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to transmit or receive data
    #[error("transmission failed")]
    Transmission,

    /// The card or reader went away
    #[error("device error: {0}")]
    Device(String),
}

/// A synchronous, order-preserving APDU transport.
///
/// Implementations must accept commands up to 261 bytes (a full short-form
/// APDU with Lc, 255 data bytes and Le) and must return the complete
/// response including the two status bytes.
pub trait CardTransport {
    /// Transmit a raw command APDU and return the raw response
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;
}
