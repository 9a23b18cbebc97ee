//! Application identifiers

use std::fmt;

use bytes::Bytes;

use crate::{Error, Result};

/// An ISO 7816-5 application identifier: 5 to 16 bytes, compared by value
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Aid(Bytes);

impl Aid {
    /// Create an AID, validating its length
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if !(5..=16).contains(&bytes.len()) {
            return Err(Error::InvalidArgument("AID must be 5 to 16 bytes"));
        }
        Ok(Self(bytes))
    }

    /// The raw AID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// AIDs are never empty; present for clippy symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(bytes))
    }
}

impl AsRef<[u8]> for Aid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_aid_length_bounds() {
        assert!(Aid::new(hex!("A000000003").to_vec()).is_ok());
        assert!(Aid::new(hex!("A0000000030000000000000000000000").to_vec()).is_ok());
        assert!(Aid::new(hex!("A0000000").to_vec()).is_err());
        assert!(Aid::new(vec![0u8; 17]).is_err());
    }

    #[test]
    fn test_aid_equality_and_display() {
        let a = Aid::new(hex!("A000000151000000").to_vec()).unwrap();
        let b = Aid::try_from(hex!("A000000151000000").as_ref()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "A000000151000000");
        assert_eq!(a.len(), 8);
    }
}
