//! Secure channel wrapping for SCP01 and SCP02
//!
//! [`SecureChannelWrapper`] owns the session keys and chaining state of one
//! secure channel and rewrites every command passing through it: command MAC
//! with an evolving ICV, optional command encryption, and optional response
//! MAC verification. It is a value type bound to exactly one transport
//! channel; a transport error leaves its chaining state unusable and the
//! wrapper must be discarded.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use subtle::ConstantTimeEq;

use crate::apdu::{Command, Response};
use crate::constants::{scp, security_level};
use crate::crypto::{self, NULL_BYTES_8};
use crate::keyset::{KeySet, KeyType};
use crate::{Error, Result};

/// Protection applied to commands and responses on a secure channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    /// No protection
    pub const CLEAR: Self = Self(0);
    /// Command MAC
    pub const MAC: Self = Self(security_level::MAC);

    /// Build a security level from its P1 bit encoding.
    ///
    /// Unknown bits are rejected; requesting ENC implicitly enables MAC.
    pub fn from_bits(bits: u8) -> Result<Self> {
        let known = security_level::MAC | security_level::ENC | security_level::RMAC;
        if bits & !known != 0 {
            return Err(Error::InvalidArgument("unknown security level bits"));
        }

        let mut bits = bits;
        if bits & security_level::ENC != 0 {
            bits |= security_level::MAC;
        }
        Ok(Self(bits))
    }

    /// Add command encryption (and therefore command MAC)
    #[must_use]
    pub const fn with_enc(self) -> Self {
        Self(self.0 | security_level::ENC | security_level::MAC)
    }

    /// Add response MAC
    #[must_use]
    pub const fn with_rmac(self) -> Self {
        Self(self.0 | security_level::RMAC)
    }

    /// The P1 bit encoding of this level
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether command MAC is enabled
    pub const fn mac(self) -> bool {
        self.0 & security_level::MAC != 0
    }

    /// Whether command encryption is enabled
    pub const fn enc(self) -> bool {
        self.0 & security_level::ENC != 0
    }

    /// Whether response MAC is enabled
    pub const fn rmac(self) -> bool {
        self.0 & security_level::RMAC != 0
    }

    pub(crate) const fn without_rmac(self) -> Self {
        Self(self.0 & !security_level::RMAC)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("CLEAR");
        }
        let mut parts = Vec::new();
        if self.mac() {
            parts.push("MAC");
        }
        if self.enc() {
            parts.push("ENC");
        }
        if self.rmac() {
            parts.push("RMAC");
        }
        f.write_str(&parts.join("+"))
    }
}

/// A secure channel protocol variant: family plus option byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScpVariant {
    family: u8,
    option: u8,
}

/// Per-variant behavior of the wrapper
#[derive(Debug, Clone, Copy)]
pub(crate) struct VariantFlags {
    /// Re-encrypt the ICV before each command after the first
    pub icv_encrypt: bool,
    /// MAC covers the modified CLA and Lc
    pub pre_mac: bool,
    /// MAC covers the original APDU; CLA and Lc change afterwards
    pub post_mac: bool,
}

impl ScpVariant {
    /// SCP01, option 0x05
    pub const SCP01_05: Self = Self::new(scp::SCP01, 0x05);
    /// SCP01, option 0x15
    pub const SCP01_15: Self = Self::new(scp::SCP01, 0x15);
    /// SCP02, option 0x04
    pub const SCP02_04: Self = Self::new(scp::SCP02, 0x04);
    /// SCP02, option 0x05
    pub const SCP02_05: Self = Self::new(scp::SCP02, 0x05);
    /// SCP02, option 0x0A (implicit channel)
    pub const SCP02_0A: Self = Self::new(scp::SCP02, 0x0A);
    /// SCP02, option 0x0B (implicit channel)
    pub const SCP02_0B: Self = Self::new(scp::SCP02, 0x0B);
    /// SCP02, option 0x14
    pub const SCP02_14: Self = Self::new(scp::SCP02, 0x14);
    /// SCP02, option 0x15
    pub const SCP02_15: Self = Self::new(scp::SCP02, 0x15);
    /// SCP02, option 0x1A (implicit channel)
    pub const SCP02_1A: Self = Self::new(scp::SCP02, 0x1A);
    /// SCP02, option 0x1B (implicit channel)
    pub const SCP02_1B: Self = Self::new(scp::SCP02, 0x1B);

    const fn new(family: u8, option: u8) -> Self {
        Self { family, option }
    }

    /// Protocol family: 1 for SCP01, 2 for SCP02
    pub const fn family(self) -> u8 {
        self.family
    }

    /// The variant option byte
    pub const fn option(self) -> u8 {
        self.option
    }

    /// Whether this is an SCP01 variant
    pub const fn is_scp01(self) -> bool {
        self.family == scp::SCP01
    }

    /// Whether this variant uses an implicitly opened channel and cannot
    /// take part in an explicit INITIALIZE UPDATE handshake
    pub const fn is_implicit(self) -> bool {
        matches!(self.option, 0x0A | 0x0B | 0x1A | 0x1B)
    }

    pub(crate) const fn flags(self) -> VariantFlags {
        VariantFlags {
            icv_encrypt: matches!(
                self,
                Self::SCP01_15 | Self::SCP02_14 | Self::SCP02_15 | Self::SCP02_1A | Self::SCP02_1B
            ),
            pre_mac: matches!(
                self,
                Self::SCP01_05
                    | Self::SCP01_15
                    | Self::SCP02_04
                    | Self::SCP02_05
                    | Self::SCP02_14
                    | Self::SCP02_15
            ),
            post_mac: matches!(
                self,
                Self::SCP02_0A | Self::SCP02_0B | Self::SCP02_1A | Self::SCP02_1B
            ),
        }
    }
}

impl fmt::Display for ScpVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SCP{:02}_{:02X}", self.family, self.option)
    }
}

/// Per-session wrapper adding MAC/ENC to commands and checking response MACs
#[derive(Clone)]
pub struct SecureChannelWrapper {
    /// Session keys
    keys: KeySet,
    /// Protocol variant in effect
    variant: ScpVariant,
    /// Active security level
    security_level: SecurityLevel,
    /// Command MAC chaining vector
    icv: [u8; 8],
    /// Response MAC chaining vector
    ricv: [u8; 8],
    /// Accumulated response MAC input; grows for the whole session
    rmac_data: BytesMut,
}

impl fmt::Debug for SecureChannelWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannelWrapper")
            .field("variant", &self.variant)
            .field("security_level", &self.security_level)
            .finish_non_exhaustive()
    }
}

impl SecureChannelWrapper {
    /// Create a wrapper around freshly derived session keys
    pub fn new(keys: KeySet, variant: ScpVariant, security_level: SecurityLevel) -> Result<Self> {
        if security_level.rmac() {
            if variant.is_scp01() {
                return Err(Error::InvalidArgument("response MAC requires SCP02"));
            }
            keys.key(KeyType::Rmac)?;
        }

        Ok(Self {
            keys,
            variant,
            security_level,
            icv: NULL_BYTES_8,
            ricv: NULL_BYTES_8,
            rmac_data: BytesMut::new(),
        })
    }

    /// The active security level
    pub const fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// The protocol variant in effect
    pub const fn variant(&self) -> ScpVariant {
        self.variant
    }

    /// The current command MAC chaining vector
    pub const fn icv(&self) -> &[u8; 8] {
        &self.icv
    }

    pub(crate) fn set_security_level(&mut self, security_level: SecurityLevel) {
        self.security_level = security_level;
    }

    /// Seed the response MAC chain from the current command ICV; called
    /// once, right after EXTERNAL AUTHENTICATE succeeds
    pub(crate) fn start_rmac(&mut self) {
        self.ricv = self.icv;
    }

    /// Wrap a command for transmission
    pub fn wrap(&mut self, command: &Command) -> Result<Command> {
        let data = command.data().unwrap_or(&[]);
        let lc = data.len();

        if self.security_level.rmac() {
            self.rmac_data.put_u8(command.cla & !0x07);
            self.rmac_data.put_u8(command.ins);
            self.rmac_data.put_u8(command.p1);
            self.rmac_data.put_u8(command.p2);
            if lc > 0 {
                self.rmac_data.put_u8(lc as u8);
                self.rmac_data.put_slice(data);
            }
        }

        if !self.security_level.mac() && !self.security_level.enc() {
            return Ok(command.clone());
        }

        let flags = self.variant.flags();

        let mut max_len = 255;
        if self.security_level.mac() {
            max_len -= 8;
        }
        if self.security_level.enc() {
            max_len -= 8;
        }
        if lc > max_len {
            return Err(Error::ApduTooLong);
        }

        let mut new_cla = command.cla;
        let mut new_lc = lc;
        let mut mac = None;

        if self.security_level.mac() {
            // Past the first command the ICV is a previous MAC; some
            // variants require it re-encrypted before use.
            if flags.icv_encrypt && self.icv != NULL_BYTES_8 {
                self.icv = if self.variant.is_scp01() {
                    crypto::encrypt_icv_3des(self.keys.key(KeyType::Mac)?, &self.icv)?
                } else {
                    crypto::encrypt_icv_des(self.keys.key(KeyType::Mac)?, &self.icv)?
                };
            }

            if flags.pre_mac {
                new_cla |= 0x04;
                new_lc += 8;
            }

            let mut mac_input = BytesMut::with_capacity(5 + lc);
            mac_input.put_u8(new_cla);
            mac_input.put_u8(command.ins);
            mac_input.put_u8(command.p1);
            mac_input.put_u8(command.p2);
            mac_input.put_u8(new_lc as u8);
            mac_input.put_slice(data);

            let padded = crypto::pad80(&mac_input);
            let iv = self.icv;
            self.icv = if self.variant.is_scp01() {
                crypto::mac_3des(self.keys.key(KeyType::Mac)?, &padded, &iv)?
            } else {
                crypto::mac_des_3des(self.keys.key(KeyType::Mac)?, &padded, &iv)?
            };

            if flags.post_mac {
                new_cla |= 0x04;
                new_lc += 8;
            }
            mac = Some(self.icv);
        }

        let mut new_data = data.to_vec();
        if self.security_level.enc() && lc > 0 {
            let plain = if self.variant.is_scp01() {
                // SCP01 encrypts Lc together with the data, padded only
                // when not already block aligned
                let mut buf = Vec::with_capacity(1 + lc);
                buf.push(lc as u8);
                buf.extend_from_slice(data);
                if buf.len() % 8 != 0 {
                    crypto::pad80(&buf)
                } else {
                    buf
                }
            } else {
                crypto::pad80(data)
            };

            new_lc += plain.len() - lc;
            new_data = crypto::enc_3des_cbc(self.keys.key(KeyType::Enc)?, &NULL_BYTES_8, &plain)?;
        }

        let mut body = BytesMut::with_capacity(new_lc);
        body.put_slice(&new_data);
        if let Some(mac) = &mac {
            body.put_slice(mac);
        }
        debug_assert_eq!(body.len(), new_lc);

        let mut wrapped = Command::new(new_cla, command.ins, command.p1, command.p2);
        if !body.is_empty() {
            wrapped = wrapped.with_data(body.freeze());
        }
        if let Some(le) = command.le {
            wrapped = wrapped.with_le(le);
        }
        Ok(wrapped)
    }

    /// Verify and strip the response MAC, if response MACs are active
    pub fn unwrap(&mut self, response: Response) -> Result<Response> {
        if !self.security_level.rmac() {
            return Ok(response);
        }

        let data = response.data();
        if data.len() < 8 {
            return Err(Error::InvalidResponse("response too short for its MAC"));
        }
        let resp_len = data.len() - 8;

        self.rmac_data.put_u8(resp_len as u8);
        self.rmac_data.put_slice(&data[..resp_len]);
        self.rmac_data.put_u8(response.status().sw1);
        self.rmac_data.put_u8(response.status().sw2);

        let padded = crypto::pad80(&self.rmac_data);
        let iv = self.ricv;
        self.ricv = crypto::mac_des_3des(self.keys.key(KeyType::Rmac)?, &padded, &iv)?;

        if !bool::from(self.ricv.ct_eq(&data[resp_len..])) {
            return Err(Error::RmacInvalid);
        }

        Ok(Response::new(
            Bytes::copy_from_slice(&data[..resp_len]),
            response.status(),
        ))
    }
}
