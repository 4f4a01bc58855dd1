use crate::document::Document;
use crate::document::bson::BsonEncoder;
use crate::error::DriverError;
use crate::protocol::{MAX_MESSAGE_SIZE, MessageHeader, OpCode};
use crate::registry::{Shape, TypeRegistry};
use crate::result::DriverResult;
use bitflags::bitflags;
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::trace;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UpdateFlags: i32 {
        const UPSERT       = 0b0000_0001;
        const MULTI_UPDATE = 0b0000_0010;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b0000_0010;
        const SLAVE_OK          = 0b0000_0100;
        const NO_CURSOR_TIMEOUT = 0b0001_0000;
    }
}

/// A request that can be framed for the wire.
pub trait WireMessage {
    fn op_code(&self) -> OpCode;

    /// Everything after the header.
    fn write_body(&self, buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>) -> DriverResult<()>;

    fn to_bytes(&self, request_id: i32, encoder: &BsonEncoder<'_>) -> DriverResult<Vec<u8>> {
        self.to_bytes_with_limit(request_id, encoder, MAX_MESSAGE_SIZE)
    }

    fn to_bytes_with_limit(
        &self,
        request_id: i32,
        encoder: &BsonEncoder<'_>,
        max_message_size: usize,
    ) -> DriverResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(256);
        MessageHeader::new(request_id, self.op_code()).write_to(&mut buffer)?;
        self.write_body(&mut buffer, encoder)?;

        let size = buffer.len();
        if size > max_message_size {
            return Err(DriverError::InvalidMessage(format!(
                "message of {} bytes exceeds the {} byte limit",
                size, max_message_size
            )));
        }
        let length = i32::try_from(size)
            .map_err(|_| DriverError::InvalidMessage(format!("message of {} bytes", size)))?;
        buffer[0..4].copy_from_slice(&length.to_le_bytes());
        trace!(request_id, op_code = ?self.op_code(), bytes = size, "framed message");
        Ok(buffer)
    }
}

fn write_collection(buffer: &mut Vec<u8>, collection: &str) -> DriverResult<()> {
    if collection.contains('\0') {
        return Err(DriverError::InvalidMessage(format!(
            "collection name contains a null byte: {:?}",
            collection
        )));
    }
    buffer.extend_from_slice(collection.as_bytes());
    buffer.write_u8(0x00)?;
    Ok(())
}

fn write_document(buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>, doc: &Document) -> DriverResult<()> {
    let bytes = encoder.encode_document(doc)?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}

/// OP_INSERT: one or more documents for a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertMessage {
    collection: String,
    documents: Vec<Document>,
    check_keys: bool,
}

impl InsertMessage {
    pub fn new(collection: impl Into<String>) -> Self {
        InsertMessage {
            collection: collection.into(),
            documents: Vec::new(),
            check_keys: true,
        }
    }

    pub fn with_documents(collection: impl Into<String>, documents: Vec<Document>) -> Self {
        InsertMessage {
            documents,
            ..InsertMessage::new(collection)
        }
    }

    /// Reject `$`-prefixed, dotted or empty keys before framing. On by default.
    pub fn check_keys(mut self, check_keys: bool) -> Self {
        self.check_keys = check_keys;
        self
    }

    pub fn push(&mut self, doc: Document) -> &mut Self {
        self.documents.push(doc);
        self
    }

    pub fn push_shape<T: Shape>(&mut self, registry: &TypeRegistry, value: &T) -> DriverResult<&mut Self> {
        let doc = registry.to_document(value)?;
        Ok(self.push(doc))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

impl WireMessage for InsertMessage {
    fn op_code(&self) -> OpCode {
        OpCode::Insert
    }

    fn write_body(&self, buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        if self.documents.is_empty() {
            return Err(DriverError::InvalidMessage(format!(
                "insert into {} without documents",
                self.collection
            )));
        }
        buffer.write_i32::<LittleEndian>(0)?;
        write_collection(buffer, &self.collection)?;
        for doc in &self.documents {
            if self.check_keys {
                encoder
                    .validator()
                    .validate_storage_keys(doc)
                    .map_err(|err| DriverError::InvalidMessage(err.to_string()))?;
            }
            write_document(buffer, encoder, doc)?;
        }
        Ok(())
    }
}

/// OP_UPDATE: apply `update` to documents matching `selector`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMessage {
    collection: String,
    flags: UpdateFlags,
    selector: Document,
    update: Document,
}

impl UpdateMessage {
    pub fn new(collection: impl Into<String>, selector: Document, update: Document) -> Self {
        UpdateMessage {
            collection: collection.into(),
            flags: UpdateFlags::empty(),
            selector,
            update,
        }
    }

    pub fn with_flags(mut self, flags: UpdateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.flags.set(UpdateFlags::UPSERT, upsert);
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.flags.set(UpdateFlags::MULTI_UPDATE, multi);
        self
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }
}

impl WireMessage for UpdateMessage {
    fn op_code(&self) -> OpCode {
        OpCode::Update
    }

    fn write_body(&self, buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        buffer.write_i32::<LittleEndian>(0)?;
        write_collection(buffer, &self.collection)?;
        buffer.write_i32::<LittleEndian>(self.flags.bits())?;
        write_document(buffer, encoder, &self.selector)?;
        write_document(buffer, encoder, &self.update)
    }
}

/// OP_DELETE: remove documents matching `selector`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteMessage {
    collection: String,
    selector: Document,
}

impl DeleteMessage {
    pub fn new(collection: impl Into<String>, selector: Document) -> Self {
        DeleteMessage {
            collection: collection.into(),
            selector,
        }
    }
}

impl WireMessage for DeleteMessage {
    fn op_code(&self) -> OpCode {
        OpCode::Delete
    }

    fn write_body(&self, buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        buffer.write_i32::<LittleEndian>(0)?;
        write_collection(buffer, &self.collection)?;
        buffer.write_i32::<LittleEndian>(0)?;
        write_document(buffer, encoder, &self.selector)
    }
}

/// OP_QUERY: open a cursor over `query`, optionally projecting `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMessage {
    flags: QueryFlags,
    collection: String,
    skip: i32,
    number_to_return: i32,
    query: Document,
    fields: Option<Document>,
}

impl QueryMessage {
    pub fn new(collection: impl Into<String>, query: Document) -> Self {
        QueryMessage {
            flags: QueryFlags::empty(),
            collection: collection.into(),
            skip: 0,
            number_to_return: 0,
            query,
            fields: None,
        }
    }

    pub fn with_flags(mut self, flags: QueryFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn skip(mut self, skip: i32) -> Self {
        self.skip = skip;
        self
    }

    /// Batch size. Negative asks the server to close the cursor after one batch.
    pub fn limit(mut self, number_to_return: i32) -> Self {
        self.number_to_return = number_to_return;
        self
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl WireMessage for QueryMessage {
    fn op_code(&self) -> OpCode {
        OpCode::Query
    }

    fn write_body(&self, buffer: &mut Vec<u8>, encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        buffer.write_i32::<LittleEndian>(self.flags.bits())?;
        write_collection(buffer, &self.collection)?;
        buffer.write_i32::<LittleEndian>(self.skip)?;
        buffer.write_i32::<LittleEndian>(self.number_to_return)?;
        write_document(buffer, encoder, &self.query)?;
        if let Some(fields) = &self.fields {
            write_document(buffer, encoder, fields)?;
        }
        Ok(())
    }
}

/// OP_GET_MORE: next batch of an open cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMoreMessage {
    collection: String,
    number_to_return: i32,
    cursor_id: i64,
}

impl GetMoreMessage {
    pub fn new(collection: impl Into<String>, number_to_return: i32, cursor_id: i64) -> Self {
        GetMoreMessage {
            collection: collection.into(),
            number_to_return,
            cursor_id,
        }
    }
}

impl WireMessage for GetMoreMessage {
    fn op_code(&self) -> OpCode {
        OpCode::GetMore
    }

    fn write_body(&self, buffer: &mut Vec<u8>, _encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        buffer.write_i32::<LittleEndian>(0)?;
        write_collection(buffer, &self.collection)?;
        buffer.write_i32::<LittleEndian>(self.number_to_return)?;
        buffer.write_i64::<LittleEndian>(self.cursor_id)?;
        Ok(())
    }
}

/// OP_KILL_CURSORS: release server-side cursors.
#[derive(Debug, Clone, PartialEq)]
pub struct KillCursorsMessage {
    cursor_ids: Vec<i64>,
}

impl KillCursorsMessage {
    pub fn new(cursor_ids: Vec<i64>) -> Self {
        KillCursorsMessage { cursor_ids }
    }

    pub fn cursor_ids(&self) -> &[i64] {
        &self.cursor_ids
    }
}

impl WireMessage for KillCursorsMessage {
    fn op_code(&self) -> OpCode {
        OpCode::KillCursors
    }

    fn write_body(&self, buffer: &mut Vec<u8>, _encoder: &BsonEncoder<'_>) -> DriverResult<()> {
        if self.cursor_ids.is_empty() {
            return Err(DriverError::InvalidMessage(
                "kill cursors without cursor ids".to_string(),
            ));
        }
        let count = i32::try_from(self.cursor_ids.len()).map_err(|_| {
            DriverError::InvalidMessage(format!("{} cursor ids", self.cursor_ids.len()))
        })?;
        buffer.write_i32::<LittleEndian>(0)?;
        buffer.write_i32::<LittleEndian>(count)?;
        for id in &self.cursor_ids {
            buffer.write_i64::<LittleEndian>(*id)?;
        }
        Ok(())
    }
}
