// Legacy wire protocol: message header, opcodes and request ids.

pub mod message;
pub mod reply;
pub mod transport;

pub use message::{
    DeleteMessage, GetMoreMessage, InsertMessage, KillCursorsMessage, QueryFlags, QueryMessage,
    UpdateFlags, UpdateMessage, WireMessage,
};
pub use reply::{ReplyMessage, ResponseFlags};
pub use transport::{Connection, TcpTransport, Transport};

use crate::error::DriverError;
use crate::result::DriverResult;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Read;
use std::sync::atomic::{AtomicI32, Ordering};

/// Largest message accepted in either direction by default (48 MiB).
pub const MAX_MESSAGE_SIZE: usize = 48 * 1024 * 1024;

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Process-wide, increasing request id.
pub fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl TryFrom<i32> for OpCode {
    type Error = DriverError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(OpCode::Reply),
            2001 => Ok(OpCode::Update),
            2002 => Ok(OpCode::Insert),
            2004 => Ok(OpCode::Query),
            2005 => Ok(OpCode::GetMore),
            2006 => Ok(OpCode::Delete),
            2007 => Ok(OpCode::KillCursors),
            other => Err(DriverError::Protocol(format!("unknown opcode {}", other))),
        }
    }
}

/// The 16 bytes in front of every message, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl MessageHeader {
    pub const LENGTH: usize = 16;

    pub fn new(request_id: i32, op_code: OpCode) -> Self {
        MessageHeader {
            length: 0,
            request_id,
            response_to: 0,
            op_code,
        }
    }

    pub fn write_to(&self, buffer: &mut Vec<u8>) -> DriverResult<()> {
        buffer.write_i32::<LittleEndian>(self.length)?;
        buffer.write_i32::<LittleEndian>(self.request_id)?;
        buffer.write_i32::<LittleEndian>(self.response_to)?;
        buffer.write_i32::<LittleEndian>(self.op_code as i32)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> DriverResult<Self> {
        let length = reader.read_i32::<LittleEndian>()?;
        let request_id = reader.read_i32::<LittleEndian>()?;
        let response_to = reader.read_i32::<LittleEndian>()?;
        let op_code = OpCode::try_from(reader.read_i32::<LittleEndian>()?)?;
        Ok(MessageHeader {
            length,
            request_id,
            response_to,
            op_code,
        })
    }
}
