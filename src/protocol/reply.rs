use crate::document::Document;
use crate::document::bson::{BsonDecoder, BsonError};
use crate::error::DriverError;
use crate::protocol::{MAX_MESSAGE_SIZE, MessageHeader, OpCode};
use crate::registry::{Decoded, Shape, TypeRegistry};
use crate::result::DriverResult;
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tracing::debug;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ResponseFlags: i32 {
        const CURSOR_NOT_FOUND   = 0b0000_0001;
        const QUERY_FAILURE      = 0b0000_0010;
        const SHARD_CONFIG_STALE = 0b0000_0100;
        const AWAIT_CAPABLE      = 0b0000_1000;
    }
}

/// Header plus flags, cursor id, starting-from and number-returned.
pub const REPLY_PREFIX_LEN: usize = MessageHeader::LENGTH + 20;

/// A parsed OP_REPLY.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyMessage {
    header: MessageHeader,
    flags: ResponseFlags,
    cursor_id: i64,
    starting_from: i32,
    number_returned: i32,
    documents: Vec<Document>,
}

impl ReplyMessage {
    /// Parse a complete reply. `data` must be exactly as long as the header says.
    pub fn from_bytes(data: &[u8], decoder: &BsonDecoder<'_>) -> DriverResult<Self> {
        if data.len() < REPLY_PREFIX_LEN {
            return Err(DriverError::Protocol(format!(
                "reply of {} bytes is shorter than its fixed fields",
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let header = MessageHeader::read_from(&mut cursor)?;
        if header.op_code != OpCode::Reply {
            return Err(DriverError::Protocol(format!(
                "expected a reply, got {:?}",
                header.op_code
            )));
        }
        if header.length as usize != data.len() || header.length < REPLY_PREFIX_LEN as i32 {
            return Err(DriverError::Protocol(format!(
                "server indicated reply would be {} bytes, got {}",
                header.length,
                data.len()
            )));
        }

        let flags = ResponseFlags::from_bits_retain(cursor.read_i32::<LittleEndian>()?);
        let cursor_id = cursor.read_i64::<LittleEndian>()?;
        let starting_from = cursor.read_i32::<LittleEndian>()?;
        let number_returned = cursor.read_i32::<LittleEndian>()?;
        if number_returned < 0 {
            return Err(DriverError::Protocol(format!(
                "negative document count {}",
                number_returned
            )));
        }
        if starting_from.checked_add(number_returned).is_none() {
            return Err(DriverError::Protocol(format!(
                "batch of {} documents starting at {} overflows the cursor position",
                number_returned, starting_from
            )));
        }

        let mut documents = Vec::with_capacity((number_returned as usize).min(1024));
        while (cursor.position() as usize) < data.len() {
            let doc = decoder.decode_document_from(&mut cursor).map_err(|err| match err {
                BsonError::DecodeTruncated { .. } => {
                    DriverError::Protocol(format!("document overruns the reply: {}", err))
                }
                other => DriverError::Bson(other),
            })?;
            documents.push(doc);
        }
        if documents.len() != number_returned as usize {
            return Err(DriverError::Protocol(format!(
                "reply announced {} documents but carried {}",
                number_returned,
                documents.len()
            )));
        }

        debug!(
            response_to = header.response_to,
            cursor_id,
            documents = documents.len(),
            flags = ?flags,
            "parsed reply"
        );
        Ok(ReplyMessage {
            header,
            flags,
            cursor_id,
            starting_from,
            number_returned,
            documents,
        })
    }

    /// Read one reply from a byte stream.
    pub fn read_from<R: Read>(reader: &mut R, decoder: &BsonDecoder<'_>) -> DriverResult<Self> {
        Self::read_from_with_limit(reader, decoder, MAX_MESSAGE_SIZE)
    }

    pub fn read_from_with_limit<R: Read>(
        reader: &mut R,
        decoder: &BsonDecoder<'_>,
        max_message_size: usize,
    ) -> DriverResult<Self> {
        let mut prefix = [0u8; 4];
        reader.read_exact(&mut prefix)?;
        let mut buffer = vec![0u8; reply_length(prefix, max_message_size)?];
        buffer[..4].copy_from_slice(&prefix);
        reader.read_exact(&mut buffer[4..])?;
        Self::from_bytes(&buffer, decoder)
    }

    pub fn response_to(&self) -> i32 {
        self.header.response_to
    }

    pub fn request_id(&self) -> i32 {
        self.header.request_id
    }

    pub fn flags(&self) -> ResponseFlags {
        self.flags
    }

    /// Zero once the server has closed the cursor.
    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    /// Offset of this batch within the cursor's results.
    pub fn cursor_position(&self) -> i32 {
        self.starting_from
    }

    pub fn next_position(&self) -> i32 {
        self.starting_from.saturating_add(self.number_returned)
    }

    pub fn number_returned(&self) -> i32 {
        self.number_returned
    }

    pub fn has_error(&self) -> bool {
        self.flags
            .intersects(ResponseFlags::QUERY_FAILURE | ResponseFlags::CURSOR_NOT_FOUND)
    }

    /// The `$err` text of a failed query.
    pub fn error_message(&self) -> Option<&str> {
        if !self.flags.contains(ResponseFlags::QUERY_FAILURE) {
            return None;
        }
        self.documents.first().and_then(|doc| doc.get_str("$err"))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    pub fn decode_documents<T: Shape>(&self, registry: &TypeRegistry) -> DriverResult<Vec<Decoded<T>>> {
        self.documents
            .iter()
            .map(|doc| registry.bind::<T>(doc.clone()).map_err(DriverError::from))
            .collect()
    }

    /// Turn a failure flag into an error.
    pub fn ensure_ok(self) -> DriverResult<Self> {
        if self.flags.contains(ResponseFlags::QUERY_FAILURE) {
            return Err(DriverError::Protocol(format!(
                "query failure: {}",
                self.error_message().unwrap_or("no error message")
            )));
        }
        if self.flags.contains(ResponseFlags::CURSOR_NOT_FOUND) {
            return Err(DriverError::Protocol(format!(
                "cursor {} not found",
                self.cursor_id
            )));
        }
        Ok(self)
    }
}

/// Validate the length prefix of an incoming reply.
pub(crate) fn reply_length(prefix: [u8; 4], max_message_size: usize) -> DriverResult<usize> {
    let length = i32::from_le_bytes(prefix);
    if length < REPLY_PREFIX_LEN as i32 || length as usize > max_message_size {
        return Err(DriverError::Protocol(format!(
            "server indicated reply would be {} bytes",
            length
        )));
    }
    Ok(length as usize)
}
