//! SELECT command
//!
//! Selects a security domain by DF name and extracts its AID from the FCI
//! template the card returns.

use crate::aid::Aid;
use crate::apdu::Command;
use crate::constants::{cla, ins, select_p1, tags};
use crate::util::tlv::find_tlv_value;
use crate::{Error, Result};

/// SELECT with an empty AID: most cards answer with their issuer
/// security domain
pub fn issuer_security_domain() -> Command {
    Command::new(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00).with_le(0)
}

/// SELECT by DF name with an explicit AID
pub fn by_name(aid: &[u8]) -> Command {
    Command::new(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00)
        .with_data(aid.to_vec())
        .with_le(0)
}

/// Extract the selected AID from an FCI template: tag 0x84 inside tag 0x6F
pub fn parse_fci_aid(fci: &[u8]) -> Result<Aid> {
    let template = find_tlv_value(fci, tags::FCI_TEMPLATE)
        .map_err(|_| Error::InvalidResponse("missing FCI template"))?;
    let aid = find_tlv_value(&template, tags::FCI_AID)
        .map_err(|_| Error::InvalidResponse("FCI template has no AID"))?;
    Aid::new(aid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_select_commands() {
        assert_eq!(
            issuer_security_domain().to_bytes().as_ref(),
            hex!("00A4040000")
        );
        assert_eq!(
            by_name(&hex!("A000000151000000")).to_bytes().as_ref(),
            hex!("00A4040008A00000015100000000")
        );
    }

    #[test]
    fn test_parse_fci_aid() {
        let fci = hex!("6F10840AA000000151000000 0000A5029F6501FF");
        let aid = parse_fci_aid(&fci).unwrap();
        assert_eq!(aid.as_bytes(), hex!("A0000001510000000000"));
    }

    #[test]
    fn test_parse_fci_missing_tags() {
        assert!(parse_fci_aid(&hex!("6F04A5029F65")).is_err());
        assert!(parse_fci_aid(&hex!("840AA0000001510000000000")).is_err());
    }
}
