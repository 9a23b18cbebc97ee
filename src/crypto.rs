//! Cryptographic operations for the SCP01 and SCP02 protocols
//!
//! This module provides the DES/3DES primitives the secure channel is built
//! from: ISO 9797-1 method 2 padding, the full 3DES-CBC MAC used by SCP01
//! commands and by both authentication cryptograms, the ANSI X9.19 retail
//! MAC used by SCP02 commands and response MACs, CBC/ECB encryption for
//! session key derivation and command confidentiality, and the ICV
//! re-encryption step some protocol options require.

use block_padding::{Iso7816, Padding};
use cbc_mac::{CbcMac, Mac};
use cipher::{
    consts::U8,
    generic_array::GenericArray,
    BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use des::{Des, TdesEde3};

use crate::{Error, Result};

/// Null bytes used as initial IV
pub const NULL_BYTES_8: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0];

/// SCP02 derivation purpose for the command MAC key
pub const DERIVATION_PURPOSE_MAC: [u8; 2] = [0x01, 0x01];
/// SCP02 derivation purpose for the response MAC key
pub const DERIVATION_PURPOSE_RMAC: [u8; 2] = [0x01, 0x02];
/// SCP02 derivation purpose for the encryption key
pub const DERIVATION_PURPOSE_ENC: [u8; 2] = [0x01, 0x82];
/// SCP02 derivation purpose for the key encryption key
pub const DERIVATION_PURPOSE_KEK: [u8; 2] = [0x01, 0x81];

/// Resize a 16-byte key to 24 bytes for 3DES
///
/// This copies the first 8 bytes (K1) to the end of the key, producing the
/// K1‖K2‖K1 form of a two-key triple DES key.
pub fn resize_key_24(key: &[u8; 16]) -> [u8; 24] {
    let mut result = [0u8; 24];
    result[..16].copy_from_slice(key);
    result[16..24].copy_from_slice(&key[0..8]);
    result
}

/// Pad data to an 8-byte multiple per ISO 9797-1 method 2
///
/// Always appends 0x80 followed by zero bytes, growing the input by one to
/// eight bytes.
pub fn pad80(data: &[u8]) -> Vec<u8> {
    let padded_len = (data.len() / 8 + 1) * 8;
    let mut out = vec![0u8; padded_len];
    out[..data.len()].copy_from_slice(data);

    let last: &mut GenericArray<u8, U8> = GenericArray::from_mut_slice(&mut out[padded_len - 8..]);
    Iso7816::pad(last, data.len() % 8);
    out
}

fn require_blocks(data: &[u8]) -> Result<()> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(Error::Crypto("input is not block aligned"));
    }
    Ok(())
}

/// Calculate a MAC using full 3DES in CBC mode
///
/// Used for SCP01 command MACs and for both mutual-authentication
/// cryptograms. `data` must already be padded to an 8-byte multiple.
pub fn mac_3des(key: &[u8; 16], data: &[u8], iv: &[u8; 8]) -> Result<[u8; 8]> {
    require_blocks(data)?;

    let key24 = resize_key_24(key);
    let mut mac = <CbcMac<TdesEde3> as Mac>::new_from_slice(&key24)
        .map_err(|_| Error::Crypto("failed to initialize 3DES MAC"))?;

    // CbcMac chains from a zero state, so a non-zero IV is folded into the
    // first block before it is processed.
    let mut first_block = [0u8; 8];
    first_block.copy_from_slice(&data[..8]);
    for (b, c) in first_block.iter_mut().zip(iv.iter()) {
        *b ^= *c;
    }

    mac.update(&first_block);
    mac.update(&data[8..]);

    Ok(mac.finalize().into_bytes().into())
}

/// Calculate an ANSI X9.19 retail MAC
///
/// Single DES in CBC mode with K1 over all blocks except the last, then
/// 3DES (decrypt with K2, re-encrypt with K1 folded into one EDE operation)
/// on the final block. Used for SCP02 command and response MACs. `data`
/// must already be padded to an 8-byte multiple.
pub fn mac_des_3des(key: &[u8; 16], data: &[u8], iv: &[u8; 8]) -> Result<[u8; 8]> {
    require_blocks(data)?;

    let des_cipher = Des::new_from_slice(&key[..8])
        .map_err(|_| Error::Crypto("failed to initialize DES cipher"))?;
    let des3_cipher = TdesEde3::new_from_slice(&resize_key_24(key))
        .map_err(|_| Error::Crypto("failed to initialize 3DES cipher"))?;

    let mut chain = *iv;
    let (head, last) = data.split_at(data.len() - 8);

    for chunk in head.chunks(8) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (b, c) in block.iter_mut().zip(chain.iter()) {
            *b ^= *c;
        }
        des_cipher.encrypt_block(&mut block);
        chain.copy_from_slice(&block);
    }

    let mut block = GenericArray::clone_from_slice(last);
    for (b, c) in block.iter_mut().zip(chain.iter()) {
        *b ^= *c;
    }
    des3_cipher.encrypt_block(&mut block);

    Ok(block.into())
}

/// Encrypt block-aligned data with 3DES in CBC mode
pub fn enc_3des_cbc(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    require_blocks(data)?;

    let key24 = resize_key_24(key);
    let mut blocks: Vec<GenericArray<u8, U8>> =
        data.chunks(8).map(GenericArray::clone_from_slice).collect();

    let iv = GenericArray::clone_from_slice(iv);
    let mut encryptor = cbc::Encryptor::<TdesEde3>::new(&key24.into(), &iv);
    encryptor.encrypt_blocks_mut(&mut blocks);

    let mut out = Vec::with_capacity(data.len());
    for block in &blocks {
        out.extend_from_slice(block);
    }
    Ok(out)
}

/// Encrypt block-aligned data with 3DES in ECB mode
///
/// SCP01 derives all three session keys by encrypting the 16-byte
/// derivation data this way.
pub fn enc_3des_ecb(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    require_blocks(data)?;

    let cipher = TdesEde3::new_from_slice(&resize_key_24(key))
        .map_err(|_| Error::Crypto("failed to initialize 3DES cipher"))?;

    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(8) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Re-encrypt an ICV with single DES (K1 only), as SCP02 variants with
/// ICV encryption require between commands
pub fn encrypt_icv_des(mac_key: &[u8; 16], icv: &[u8; 8]) -> Result<[u8; 8]> {
    let cipher = Des::new_from_slice(&mac_key[..8])
        .map_err(|_| Error::Crypto("failed to initialize DES cipher"))?;

    let mut block = GenericArray::clone_from_slice(icv);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

/// Re-encrypt an ICV with 3DES, as SCP01 variants with ICV encryption
/// require between commands
pub fn encrypt_icv_3des(mac_key: &[u8; 16], icv: &[u8; 8]) -> Result<[u8; 8]> {
    let cipher = TdesEde3::new_from_slice(&resize_key_24(mac_key))
        .map_err(|_| Error::Crypto("failed to initialize 3DES cipher"))?;

    let mut block = GenericArray::clone_from_slice(icv);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

/// Derive an SCP02 session key from a card key using the sequence counter
/// and a derivation purpose constant
pub fn derive_scp02_key(card_key: &[u8; 16], seq: &[u8; 2], purpose: &[u8; 2]) -> Result<[u8; 16]> {
    let mut derivation_data = [0u8; 16];
    derivation_data[0..2].copy_from_slice(purpose);
    derivation_data[2..4].copy_from_slice(seq);

    let encrypted = enc_3des_cbc(card_key, &NULL_BYTES_8, &derivation_data)?;

    let mut result = [0u8; 16];
    result.copy_from_slice(&encrypted);
    Ok(result)
}
