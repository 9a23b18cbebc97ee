//! INSTALL command
//!
//! Covers the three INSTALL forms the card manager uses: for load, for
//! install-and-make-selectable, and for make-default-selected.

use bytes::{BufMut, BytesMut};

use crate::aid::Aid;
use crate::apdu::Command;
use crate::constants::{cla, ins, install_p1, tags};

fn with_p1_data(p1: u8, data: BytesMut) -> Command {
    Command::new(cla::GP, ins::INSTALL, p1, 0x00).with_data(data.freeze())
}

fn put_lv(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}

/// INSTALL [for load]: announce a package before its LOAD blocks
///
/// `hash` is the optional load-file-data hash and `load_params` the
/// optional system parameter block; both may be empty.
pub fn for_load(package: &Aid, security_domain: &Aid, hash: &[u8], load_params: &[u8]) -> Command {
    let mut data =
        BytesMut::with_capacity(5 + package.len() + security_domain.len() + hash.len() + load_params.len());
    put_lv(&mut data, package.as_bytes());
    put_lv(&mut data, security_domain.as_bytes());
    put_lv(&mut data, hash);
    put_lv(&mut data, load_params);
    data.put_u8(0x00); // no load token

    with_p1_data(install_p1::FOR_LOAD, data)
}

/// INSTALL [for install and make selectable]
///
/// `params` must be a complete parameter TLV (`C9 len …`); pass the
/// default empty block via [`default_install_params`].
pub fn for_install_and_make_selectable(
    package: &Aid,
    applet: &Aid,
    instance: &Aid,
    privileges: u8,
    params: &[u8],
    token: &[u8],
) -> Command {
    let mut data = BytesMut::with_capacity(
        6 + package.len() + applet.len() + instance.len() + params.len() + token.len(),
    );
    put_lv(&mut data, package.as_bytes());
    put_lv(&mut data, applet.as_bytes());
    put_lv(&mut data, instance.as_bytes());
    data.put_u8(0x01);
    data.put_u8(privileges);
    put_lv(&mut data, params);
    put_lv(&mut data, token);

    with_p1_data(install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE, data)
}

/// INSTALL [for make selectable] marking an installed applet as the
/// default selected application
pub fn make_default_selected(aid: &Aid, privileges: u8) -> Command {
    let mut data = BytesMut::with_capacity(7 + aid.len());
    data.put_u8(0x00);
    data.put_u8(0x00);
    put_lv(&mut data, aid.as_bytes());
    data.put_u8(0x01);
    data.put_u8(privileges);
    data.put_u8(0x00);
    data.put_u8(0x00);

    with_p1_data(install_p1::FOR_MAKE_SELECTABLE, data)
}

/// The empty application parameter block: a zero-length C9 TLV
pub fn default_install_params() -> Vec<u8> {
    vec![tags::APPLICATION_PARAMETERS, 0x00]
}
