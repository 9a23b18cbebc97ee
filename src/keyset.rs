//! Key sets for secure channel establishment
//!
//! A [`KeySet`] holds the ENC/MAC/KEK triple shared with a card plus the
//! key version and identifier used to address it, and knows how to
//! diversify itself from the card's key diversification data. Session key
//! sets derived during channel setup additionally carry the SCP02 RMAC key.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::DEFAULT_KEY;
use crate::crypto::enc_3des_ecb;
use crate::{Error, Result};

/// The role of a key within a key set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    /// Command encryption key
    Enc = 1,
    /// Command MAC key
    Mac = 2,
    /// Key encryption key
    Kek = 3,
    /// Response MAC key (SCP02 session key sets only)
    Rmac = 4,
}

/// Key diversification scheme applied to default key sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Diversification {
    /// Keys are used as-is
    #[default]
    None,
    /// EMV CPS diversification
    Emv,
    /// VISA2 diversification
    Visa2,
    /// KDF3 diversification (AES key sets only; rejected here)
    Kdf3,
}

/// A set of symmetric card keys
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    #[zeroize(skip)]
    version: u8,
    #[zeroize(skip)]
    id: u8,
    enc: [u8; 16],
    mac: [u8; 16],
    kek: [u8; 16],
    rmac: Option<[u8; 16]>,
    #[zeroize(skip)]
    diversification: Diversification,
    #[zeroize(skip)]
    derived: bool,
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("version", &self.version)
            .field("id", &self.id)
            .field("diversification", &self.diversification)
            .field("derived", &self.derived)
            .finish_non_exhaustive()
    }
}

impl Default for KeySet {
    /// The default test key set found on most blank cards
    fn default() -> Self {
        Self::from_single_key(DEFAULT_KEY)
    }
}

impl KeySet {
    /// Create a key set with the specified version, identifier and keys
    ///
    /// The key identifier must be in the 0..=127 range; the version may be
    /// any byte, with 0 and 255 both meaning "any/default".
    pub fn new(version: u8, id: u8, enc: [u8; 16], mac: [u8; 16], kek: [u8; 16]) -> Result<Self> {
        if id > 127 {
            return Err(Error::InvalidArgument("key identifier out of range"));
        }
        Ok(Self {
            version,
            id,
            enc,
            mac,
            kek,
            rmac: None,
            diversification: Diversification::None,
            derived: false,
        })
    }

    /// Create a key set where all three keys are the same
    pub fn from_single_key(key: [u8; 16]) -> Self {
        Self {
            version: 0,
            id: 0,
            enc: key,
            mac: key,
            kek: key,
            rmac: None,
            diversification: Diversification::None,
            derived: false,
        }
    }

    /// Set the diversification scheme for this key set
    #[must_use]
    pub fn with_diversification(mut self, diversification: Diversification) -> Self {
        self.diversification = diversification;
        self
    }

    /// Session key set constructor used after channel negotiation
    pub(crate) fn session(
        version: u8,
        id: u8,
        enc: [u8; 16],
        mac: [u8; 16],
        kek: [u8; 16],
        rmac: Option<[u8; 16]>,
    ) -> Self {
        Self {
            version,
            id,
            enc,
            mac,
            kek,
            rmac,
            diversification: Diversification::None,
            derived: false,
        }
    }

    /// The key version number
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// The key identifier
    pub const fn id(&self) -> u8 {
        self.id
    }

    /// The diversification scheme
    pub const fn diversification(&self) -> Diversification {
        self.diversification
    }

    /// Whether `diversify` has already been applied
    pub const fn is_derived(&self) -> bool {
        self.derived
    }

    /// Get a key by type as a 16-byte value
    pub fn key(&self, key_type: KeyType) -> Result<&[u8; 16]> {
        match key_type {
            KeyType::Enc => Ok(&self.enc),
            KeyType::Mac => Ok(&self.mac),
            KeyType::Kek => Ok(&self.kek),
            KeyType::Rmac => self
                .rmac
                .as_ref()
                .ok_or(Error::InvalidArgument("key set has no RMAC key")),
        }
    }

    /// Get a key by type in its 24-byte K1‖K2‖K1 triple DES form
    pub fn key_3des(&self, key_type: KeyType) -> Result<[u8; 24]> {
        Ok(crate::crypto::resize_key_24(self.key(key_type)?))
    }

    /// Get the single-DES (K1) form of a key
    pub fn key_des(&self, key_type: KeyType) -> Result<[u8; 8]> {
        let key = self.key(key_type)?;
        let mut k1 = [0u8; 8];
        k1.copy_from_slice(&key[..8]);
        Ok(k1)
    }

    /// Whether this key set still needs diversification before use
    pub fn needs_diversity(&self) -> bool {
        self.diversification != Diversification::None && !self.derived
    }

    /// Diversify the key set in place from an INITIALIZE UPDATE response
    ///
    /// The first ten response bytes are the card's key diversification
    /// data. May be applied at most once, and only to default key sets
    /// (version 0 or 255).
    pub fn diversify(&mut self, init_response: &[u8; 28]) -> Result<()> {
        if self.derived {
            return Err(Error::InvalidArgument("key set already diversified"));
        }
        if self.version != 0 && self.version != 255 {
            return Err(Error::InvalidArgument(
                "only default key sets can be diversified",
            ));
        }

        let kdd = &init_response[0..10];
        for key_type in [KeyType::Enc, KeyType::Mac, KeyType::Kek] {
            let data = match self.diversification {
                Diversification::None => return Ok(()),
                Diversification::Emv => fill_emv(kdd, key_type),
                Diversification::Visa2 => fill_visa2(kdd, key_type),
                Diversification::Kdf3 => {
                    return Err(Error::Crypto(
                        "KDF3 diversification is not defined for 3DES key sets",
                    ))
                }
            };

            let mut diversified = [0u8; 16];
            diversified.copy_from_slice(&enc_3des_ecb(self.key(key_type)?, &data)?);
            match key_type {
                KeyType::Enc => self.enc = diversified,
                KeyType::Mac => self.mac = diversified,
                KeyType::Kek => self.kek = diversified,
                KeyType::Rmac => unreachable!(),
            }
        }

        self.derived = true;
        Ok(())
    }
}

/// EMV CPS derivation data: the six rightmost bytes of the key
/// diversification data, twice, with 0xF0/0x0F separators and the key index
fn fill_emv(kdd: &[u8], key_type: KeyType) -> [u8; 16] {
    let mut data = [0u8; 16];
    data[0..6].copy_from_slice(&kdd[4..10]);
    data[6] = 0xF0;
    data[7] = key_type as u8;
    data[8..14].copy_from_slice(&kdd[4..10]);
    data[14] = 0x0F;
    data[15] = key_type as u8;
    data
}

/// VISA2 derivation data: chip serial bytes rearranged around the same
/// 0xF0/0x0F separators and key index
fn fill_visa2(kdd: &[u8], key_type: KeyType) -> [u8; 16] {
    let mut data = [0u8; 16];
    data[0..2].copy_from_slice(&kdd[0..2]);
    data[2..6].copy_from_slice(&kdd[4..8]);
    data[6] = 0xF0;
    data[7] = key_type as u8;
    data[8..10].copy_from_slice(&kdd[0..2]);
    data[10..14].copy_from_slice(&kdd[4..8]);
    data[14] = 0x0F;
    data[15] = key_type as u8;
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_from_single_key() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        let keys = KeySet::from_single_key(key);

        assert_eq!(keys.key(KeyType::Enc).unwrap(), &key);
        assert_eq!(keys.key(KeyType::Mac).unwrap(), &key);
        assert_eq!(keys.key(KeyType::Kek).unwrap(), &key);
        assert!(keys.key(KeyType::Rmac).is_err());
        assert_eq!(keys.version(), 0);
        assert!(!keys.needs_diversity());
    }

    #[test]
    fn test_key_views() {
        let keys = KeySet::default();
        assert_eq!(
            keys.key_3des(KeyType::Enc).unwrap(),
            hex!("404142434445464748494a4b4c4d4e4f4041424344454647")
        );
        assert_eq!(
            keys.key_des(KeyType::Mac).unwrap(),
            hex!("4041424344454647")
        );
    }

    #[test]
    fn test_id_range() {
        let key = DEFAULT_KEY;
        assert!(KeySet::new(0, 127, key, key, key).is_ok());
        assert!(KeySet::new(0, 128, key, key, key).is_err());
    }

    #[test]
    fn test_diversify_emv() {
        let mut response = [0u8; 28];
        response[0..10].copy_from_slice(&hex!("00010203040506070809"));

        let mut keys = KeySet::default().with_diversification(Diversification::Emv);
        assert!(keys.needs_diversity());
        keys.diversify(&response).unwrap();

        // ENC key diversified with the EMV layout and key index 1
        let mut data = [0u8; 16];
        data[0..6].copy_from_slice(&hex!("040506070809"));
        data[6] = 0xF0;
        data[7] = 1;
        data[8..14].copy_from_slice(&hex!("040506070809"));
        data[14] = 0x0F;
        data[15] = 1;
        let mut expected = [0u8; 16];
        expected.copy_from_slice(&enc_3des_ecb(&DEFAULT_KEY, &data).unwrap());
        assert_eq!(keys.key(KeyType::Enc).unwrap(), &expected);

        assert!(keys.is_derived());
        assert!(!keys.needs_diversity());

        // A second application is refused
        assert!(keys.diversify(&response).is_err());
    }

    #[test]
    fn test_diversify_requires_default_version() {
        let key = DEFAULT_KEY;
        let mut keys = KeySet::new(0x20, 0, key, key, key)
            .unwrap()
            .with_diversification(Diversification::Visa2);
        assert!(keys.diversify(&[0u8; 28]).is_err());
    }

    #[test]
    fn test_kdf3_rejected() {
        let mut keys = KeySet::default().with_diversification(Diversification::Kdf3);
        assert!(matches!(keys.diversify(&[0u8; 28]), Err(Error::Crypto(_))));
    }
}
