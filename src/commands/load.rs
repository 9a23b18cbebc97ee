//! LOAD command
//!
//! Carries one block of a load file; the last block is flagged in P1 and
//! P2 numbers the blocks from zero.

use crate::apdu::Command;
use crate::constants::{cla, ins, load_p1};

/// Build a LOAD command for one block
pub fn block(is_last: bool, index: u8, data: &[u8]) -> Command {
    let p1 = if is_last {
        load_p1::LAST_BLOCK
    } else {
        load_p1::MORE_BLOCKS
    };
    Command::new(cla::GP, ins::LOAD, p1, index).with_data(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_load_blocks() {
        let cmd = block(false, 0, &hex!("C48201A1"));
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E8000004C48201A1"));

        let cmd = block(true, 7, &hex!("0102"));
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E88007020102"));
    }
}
