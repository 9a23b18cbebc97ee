//! Load file interface
//!
//! CAP file parsing lives outside this crate; anything that can present a
//! package as an AID, a code length and a sequence of sized load blocks can
//! be loaded through [`crate::CardManager::load_cap_file`].

use bytes::Bytes;

use crate::aid::Aid;

/// Maximum block size for LOAD commands: 255 minus the 8-byte command MAC
pub const DEFAULT_BLOCK_SIZE: usize = 247;

/// A parsed CAP file, seen as an opaque source of load blocks
pub trait LoadFile {
    /// The package AID
    fn package_aid(&self) -> &Aid;

    /// Length of the load file data, with or without debug components
    fn code_length(&self, include_debug: bool) -> u32;

    /// The load file cut into blocks of at most `block_size` bytes
    fn load_blocks(
        &self,
        include_debug: bool,
        separate_components: bool,
        block_size: usize,
    ) -> Vec<Bytes>;

    /// The load file data hash, empty when not available
    fn load_file_data_hash(&self, include_debug: bool) -> Vec<u8>;
}

/// Options controlling how a load file is transferred to the card
#[derive(Debug, Clone)]
pub struct LoadParameters {
    /// Include debug components in the transfer
    pub include_debug: bool,
    /// Keep components in separate blocks
    pub separate_components: bool,
    /// Maximum LOAD block size
    pub block_size: usize,
    /// Send the `EF 04 C6 02 <code length>` system parameter block
    pub load_params: bool,
    /// Send the load file data hash
    pub use_hash: bool,
}

impl Default for LoadParameters {
    fn default() -> Self {
        Self {
            include_debug: false,
            separate_components: false,
            block_size: DEFAULT_BLOCK_SIZE,
            load_params: false,
            use_hash: false,
        }
    }
}
