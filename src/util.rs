//! Common utilities for GlobalPlatform operations

use bytes::Bytes;
use iso7816_tlv::simple::Tlv;

use crate::{Error, Result};

/// Guard a slice against an unexpected length
pub fn check_length(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

pub mod tlv {
    use super::*;

    /// Iterator over the simple TLV objects at the top level of a buffer.
    ///
    /// Ends at the first byte sequence that does not parse as a TLV.
    pub struct TlvEntries<'a> {
        rest: &'a [u8],
    }

    impl Iterator for TlvEntries<'_> {
        type Item = Tlv;

        fn next(&mut self) -> Option<Tlv> {
            if self.rest.is_empty() {
                return None;
            }
            match Tlv::parse(self.rest) {
                (Ok(entry), rest) => {
                    self.rest = rest;
                    Some(entry)
                }
                (Err(_), _) => {
                    self.rest = &[];
                    None
                }
            }
        }
    }

    /// Walk the top-level TLV entries of `data`
    pub fn tlv_entries(data: &[u8]) -> TlvEntries<'_> {
        TlvEntries { rest: data }
    }

    /// The value of the first top-level TLV carrying `tag`
    pub fn find_tlv_value(data: &[u8], tag: u8) -> Result<Bytes> {
        tlv_entries(data)
            .find(|entry| {
                let entry_tag: u8 = entry.tag().into();
                entry_tag == tag
            })
            .map(|entry| Bytes::copy_from_slice(entry.value()))
            .ok_or(Error::InvalidResponse("expected TLV tag not present"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_tlv_entries() {
        let data = hex!("4F07A000000003000084074143434F554E54");
        let tags: Vec<u8> = tlv::tlv_entries(&data)
            .map(|entry| entry.tag().into())
            .collect();
        assert_eq!(tags, [0x4F, 0x84]);

        // Garbage after a valid entry ends the walk instead of looping
        let data = hex!("4F07A00000000300008407");
        assert_eq!(tlv::tlv_entries(&data).count(), 1);
    }

    #[test]
    fn test_find_tlv_value() {
        let data = hex!("4F07A000000003000084074143434F554E54");

        let aid = tlv::find_tlv_value(&data, 0x4F).unwrap();
        assert_eq!(aid, Bytes::from(hex!("A0000000030000").to_vec()));

        let label = tlv::find_tlv_value(&data, 0x84).unwrap();
        assert_eq!(label, Bytes::from(hex!("4143434F554E54").to_vec()));

        assert!(matches!(
            tlv::find_tlv_value(&data, 0x50),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_check_length() {
        assert!(check_length(&[0u8; 8], 8).is_ok());
        assert!(matches!(
            check_length(&[0u8; 7], 8),
            Err(Error::InvalidLength {
                expected: 8,
                actual: 7
            })
        ));
    }
}
