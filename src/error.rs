use thiserror::Error;

use crate::apdu::StatusWord;
use crate::transport::TransportError;

/// Result type for GlobalPlatform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-related errors; fatal to the session
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Card returned a non-success status word
    #[error("card returned error status: {0}")]
    CardStatus(StatusWord),

    /// Length or structure violation of a card response
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),

    /// Wrong data length
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Card reported 6982/6983 during INITIALIZE UPDATE
    #[error("INITIALIZE UPDATE rejected, card locked?")]
    CardLocked,

    /// Card cryptogram mismatch or EXTERNAL AUTHENTICATE rejected
    #[error("card authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Requested secure channel protocol does not match the card's
    #[error("secure channel protocol mismatch: requested SCP{requested:02}, card reported SCP{reported:02}")]
    ScpVersionMismatch {
        /// SCP family requested by the host
        requested: u8,
        /// SCP family reported by the card
        reported: u8,
    },

    /// Card reported an SCP version this crate does not implement
    #[error("unsupported SCP version: {0}")]
    UnsupportedScpVersion(u8),

    /// Static key set version does not match the card's key information
    #[error("key version mismatch: host has {host}, card reported {card}")]
    KeyVersionMismatch {
        /// Key version of the host key set
        host: u8,
        /// Key version reported by the card
        card: u8,
    },

    /// Response MAC verification failed
    #[error("response MAC verification failed")]
    RmacInvalid,

    /// APDU exceeds the secure channel wrapping budget
    #[error("APDU too long for secure channel wrapping")]
    ApduTooLong,

    /// Caller misuse
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Cryptographic misconfiguration; a bug, not a protocol condition
    #[error("cryptographic error: {0}")]
    Crypto(&'static str),

    /// No security domain could be selected
    #[error("could not select a security domain")]
    NoSecurityDomain,

    /// Recoverable card condition promoted to an error by strict mode
    #[error("strict mode: {0}")]
    Strict(&'static str),
}

impl Error {
    /// Check if this error represents a specific card status
    pub const fn is_status(&self, status: u16) -> bool {
        matches!(self, Self::CardStatus(sw) if sw.to_u16() == status)
    }

    /// Try to extract a status word if this error contains one
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::CardStatus(sw) => Some(*sw),
            _ => None,
        }
    }
}
