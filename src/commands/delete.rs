//! DELETE command
//!
//! Removes applications, packages and other objects from the card.

use bytes::{BufMut, BytesMut};

use crate::aid::Aid;
use crate::apdu::Command;
use crate::constants::{cla, delete_p2, ins, tags};

/// Build a DELETE for the given AID; `delete_related` also removes
/// dependent objects
pub fn delete_object(aid: &Aid, delete_related: bool) -> Command {
    let mut data = BytesMut::with_capacity(2 + aid.len());
    data.put_u8(tags::AID);
    data.put_u8(aid.len() as u8);
    data.put_slice(aid.as_bytes());

    let p2 = if delete_related {
        delete_p2::OBJECT_AND_RELATED
    } else {
        delete_p2::OBJECT
    };
    Command::new(cla::GP, ins::DELETE, 0x00, p2).with_data(data.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_delete_command() {
        let aid = Aid::new(hex!("A000000062030108 01").to_vec()).unwrap();
        let cmd = delete_object(&aid, true);

        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex!("80E400800B4F09A0000000620301 0801")
        );

        let cmd = delete_object(&aid, false);
        assert_eq!(cmd.p2, delete_p2::OBJECT);
        assert_eq!(cmd.data(), Some(hex!("4F09A00000006203010801").as_ref()));
    }
}
