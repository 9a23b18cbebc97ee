//! INITIALIZE UPDATE command
//!
//! Starts the mutual authentication handshake. The response carries the
//! card's key diversification data, key information, challenge and
//! cryptogram in a fixed 28-byte layout.

use crate::apdu::Command;
use crate::constants::{cla, ins, CHALLENGE_LENGTH, INIT_UPDATE_RESPONSE_LENGTH};
use crate::{Error, Result};

/// Build an INITIALIZE UPDATE for the given key version and identifier
pub fn with_challenge(key_version: u8, key_id: u8, host_challenge: &[u8; 8]) -> Command {
    Command::new(cla::GP, ins::INITIALIZE_UPDATE, key_version, key_id)
        .with_data(host_challenge.to_vec())
        .with_le(0)
}

/// Generate a host challenge from the thread-local cryptographic RNG
pub fn random_challenge() -> [u8; CHALLENGE_LENGTH] {
    let mut challenge = [0u8; CHALLENGE_LENGTH];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut challenge);
    challenge
}

/// Parsed INITIALIZE UPDATE response data
#[derive(Debug, Clone)]
pub struct InitUpdateResponse {
    raw: [u8; INIT_UPDATE_RESPONSE_LENGTH],
}

impl InitUpdateResponse {
    /// Parse the 28-byte response payload
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != INIT_UPDATE_RESPONSE_LENGTH {
            return Err(Error::InvalidLength {
                expected: INIT_UPDATE_RESPONSE_LENGTH,
                actual: data.len(),
            });
        }

        let mut raw = [0u8; INIT_UPDATE_RESPONSE_LENGTH];
        raw.copy_from_slice(data);
        Ok(Self { raw })
    }

    /// The complete response, as fed to key diversification
    pub const fn raw(&self) -> &[u8; INIT_UPDATE_RESPONSE_LENGTH] {
        &self.raw
    }

    /// Key diversification data (bytes 0..10), opaque at this layer
    pub fn key_diversification_data(&self) -> &[u8] {
        &self.raw[0..10]
    }

    /// Key version number the card used
    pub const fn key_version(&self) -> u8 {
        self.raw[10]
    }

    /// SCP major version the card reports (1 or 2)
    pub const fn scp_version(&self) -> u8 {
        self.raw[11]
    }

    /// The full 8-byte card challenge
    pub fn card_challenge(&self) -> [u8; 8] {
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&self.raw[12..20]);
        challenge
    }

    /// The SCP02 sequence counter: the first two card challenge bytes
    pub fn sequence_counter(&self) -> [u8; 2] {
        [self.raw[12], self.raw[13]]
    }

    /// The card's authentication cryptogram
    pub fn card_cryptogram(&self) -> [u8; 8] {
        let mut cryptogram = [0u8; 8];
        cryptogram.copy_from_slice(&self.raw[20..28]);
        cryptogram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_initialize_update_command() {
        let challenge = hex!("f0467f908e5ca23f");
        let cmd = with_challenge(0x00, 0x00, &challenge);

        assert_eq!(cmd.cla, cla::GP);
        assert_eq!(cmd.ins, ins::INITIALIZE_UPDATE);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("8050000008f0467f908e5ca23f00"));
    }

    #[test]
    fn test_random_challenge() {
        // Two draws colliding would mean the RNG is not wired up
        assert_ne!(random_challenge(), random_challenge());
    }

    #[test]
    fn test_parse_response() {
        let data = hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce4");
        let response = InitUpdateResponse::parse(&data).unwrap();

        assert_eq!(
            response.key_diversification_data(),
            hex!("00000265018303953662")
        );
        assert_eq!(response.key_version(), 0x20);
        assert_eq!(response.scp_version(), 0x02);
        assert_eq!(response.sequence_counter(), hex!("000d"));
        assert_eq!(response.card_challenge(), hex!("000de9c62ba1c4c8"));
        assert_eq!(response.card_cryptogram(), hex!("e55fcb91b6654ce4"));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(matches!(
            InitUpdateResponse::parse(&[0u8; 27]),
            Err(Error::InvalidLength {
                expected: 28,
                actual: 27
            })
        ));
    }
}
