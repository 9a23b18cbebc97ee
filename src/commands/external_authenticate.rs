//! EXTERNAL AUTHENTICATE command
//!
//! Completes mutual authentication: P1 carries the security level that will
//! apply to the rest of the session, the payload is the host cryptogram.
//! Always sent MAC-wrapped.

use crate::apdu::Command;
use crate::constants::{cla, ins};
use crate::secure_channel::SecurityLevel;

/// Build an EXTERNAL AUTHENTICATE carrying the host cryptogram
pub fn with_cryptogram(security_level: SecurityLevel, host_cryptogram: &[u8; 8]) -> Command {
    Command::new(
        cla::MAC,
        ins::EXTERNAL_AUTHENTICATE,
        security_level.bits(),
        0x00,
    )
    .with_data(host_cryptogram.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_external_authenticate_command() {
        let cryptogram = hex!("1d4de92eaf7a2c9f");
        let cmd = with_cryptogram(SecurityLevel::MAC, &cryptogram);

        assert_eq!(cmd.to_bytes().as_ref(), hex!("84820100081d4de92eaf7a2c9f"));

        let cmd = with_cryptogram(SecurityLevel::MAC.with_enc().with_rmac(), &cryptogram);
        assert_eq!(cmd.p1, 0x13);
    }
}
