//! APDU command and response value types
//!
//! Short-form ISO/IEC 7816-4 framing only: Lc and Le are single bytes and an
//! Le of 0 requests 256 response bytes. Extended length is not supported.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Status word trailing every card response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte
    pub sw1: u8,
    /// Second status byte
    pub sw2: u8,
}

impl StatusWord {
    /// Create a status word from its two bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create a status word from a 16-bit value
    pub const fn from_u16(sw: u16) -> Self {
        Self {
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// The status word as a 16-bit value
    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | self.sw2 as u16
    }

    /// Whether this is the 9000 success status
    pub const fn is_success(self) -> bool {
        self.to_u16() == 0x9000
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// APDU command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected response length (optional; 0 means 256)
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Command payload data, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Payload length (Lc), 0 when there is no data
    pub fn lc(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Serialize to raw APDU bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(4 + 1 + self.lc() + 1);

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }
}

/// APDU response: payload plus trailing status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from payload and status
    pub const fn new(data: Bytes, status: StatusWord) -> Self {
        Self { data, status }
    }

    /// Parse a raw response: at least the two status bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::InvalidResponse("response shorter than a status word"));
        }

        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: Bytes::copy_from_slice(data),
            status: StatusWord::new(sw[0], sw[1]),
        })
    }

    /// Response payload without the status word
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is 9000
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Succeed with the payload, or fail with the card's status word
    pub fn into_success(self) -> Result<Bytes> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(Error::CardStatus(self.status))
        }
    }
}
