//! GET STATUS command
//!
//! Lists on-card content one scope at a time. Responses come back as a raw
//! record stream (not TLV): each record is a length-prefixed AID followed
//! by the lifecycle and privileges bytes, and — for the module scope — a
//! counted list of module AIDs.

use crate::aid::Aid;
use crate::apdu::Command;
use crate::constants::{cla, get_status_p1, get_status_p2, ins, tags};
use crate::registry::{Kind, RegistryEntry};
use crate::{Error, Result};

/// Build a GET STATUS for one scope; `next` continues a 6310 batch
pub fn list(p1: u8, next: bool) -> Command {
    let p2 = if next {
        get_status_p2::NEXT
    } else {
        get_status_p2::ALL
    };
    Command::new(cla::GP, ins::GET_STATUS, p1, p2).with_data(vec![tags::AID, 0x00])
}

fn read_u8(data: &[u8], index: &mut usize) -> Result<u8> {
    let value = *data
        .get(*index)
        .ok_or(Error::InvalidResponse("truncated GET STATUS record"))?;
    *index += 1;
    Ok(value)
}

fn read_aid(data: &[u8], index: &mut usize) -> Result<Aid> {
    let len = read_u8(data, index)? as usize;
    let end = index
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(Error::InvalidResponse("truncated GET STATUS record"))?;
    let aid = Aid::new(data[*index..end].to_vec())?;
    *index = end;
    Ok(aid)
}

/// Parse the concatenated record stream of one GET STATUS scope
pub fn parse_entries(data: &[u8], p1: u8) -> Result<Vec<RegistryEntry>> {
    let mut entries = Vec::new();
    let mut index = 0;

    while index < data.len() {
        let aid = read_aid(data, &mut index)?;
        let life_cycle = read_u8(data, &mut index)?;
        let privileges = read_u8(data, &mut index)?;

        let kind = match p1 {
            get_status_p1::ISSUER_SECURITY_DOMAIN => Kind::IssuerSecurityDomain,
            get_status_p1::APPLICATIONS => {
                if privileges & 0x80 == 0 {
                    Kind::Application
                } else {
                    Kind::SecurityDomain
                }
            }
            get_status_p1::EXEC_LOAD_FILES_AND_MODULES => Kind::ExecutableLoadFilesAndModules,
            get_status_p1::EXEC_LOAD_FILES => Kind::ExecutableLoadFiles,
            _ => return Err(Error::InvalidArgument("unknown GET STATUS scope")),
        };

        let mut entry = RegistryEntry::new(aid, life_cycle, privileges, kind);
        if p1 == get_status_p1::EXEC_LOAD_FILES_AND_MODULES {
            let num_modules = read_u8(data, &mut index)?;
            for _ in 0..num_modules {
                entry.add_module(read_aid(data, &mut index)?);
            }
        }
        entries.push(entry);
    }

    Ok(entries)
}
