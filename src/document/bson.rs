use crate::document::object_id::{OBJECT_ID_LEN, ObjectId};
use crate::document::types::{
    Binary, BinarySubtype, DbPointer, JavaScriptWithScope, Regex, Timestamp, Value,
};
use crate::document::validator::{DocumentValidator, ValidationError};
use crate::document::Document;
use crate::registry::{Decoded, Shape, TypeRegistry};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tracing::trace;

pub const TYPE_DOUBLE: u8 = 0x01;
pub const TYPE_STRING: u8 = 0x02;
pub const TYPE_DOCUMENT: u8 = 0x03;
pub const TYPE_ARRAY: u8 = 0x04;
pub const TYPE_BINARY: u8 = 0x05;
pub const TYPE_UNDEFINED: u8 = 0x06;
pub const TYPE_OBJECTID: u8 = 0x07;
pub const TYPE_BOOL: u8 = 0x08;
pub const TYPE_DATETIME: u8 = 0x09;
pub const TYPE_NULL: u8 = 0x0A;
pub const TYPE_REGEX: u8 = 0x0B;
pub const TYPE_DBPOINTER: u8 = 0x0C;
pub const TYPE_JAVASCRIPT: u8 = 0x0D;
pub const TYPE_SYMBOL: u8 = 0x0E;
pub const TYPE_JAVASCRIPT_WITH_SCOPE: u8 = 0x0F;
pub const TYPE_INT32: u8 = 0x10;
pub const TYPE_TIMESTAMP: u8 = 0x11;
pub const TYPE_INT64: u8 = 0x12;
pub const TYPE_MAXKEY: u8 = 0x7F;
pub const TYPE_MINKEY: u8 = 0xFF;

/// Largest document the encoder accepts by default (4 MiB).
pub const MAX_DOCUMENT_SIZE: usize = 4 * 1024 * 1024;

/// Length prefix plus terminator of `{}`.
pub const MIN_DOCUMENT_SIZE: usize = 5;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Double = TYPE_DOUBLE,
    String = TYPE_STRING,
    EmbeddedDocument = TYPE_DOCUMENT,
    Array = TYPE_ARRAY,
    Binary = TYPE_BINARY,
    Undefined = TYPE_UNDEFINED,
    ObjectId = TYPE_OBJECTID,
    Boolean = TYPE_BOOL,
    DateTime = TYPE_DATETIME,
    Null = TYPE_NULL,
    Regex = TYPE_REGEX,
    DbPointer = TYPE_DBPOINTER,
    JavaScript = TYPE_JAVASCRIPT,
    Symbol = TYPE_SYMBOL,
    JavaScriptWithScope = TYPE_JAVASCRIPT_WITH_SCOPE,
    Int32 = TYPE_INT32,
    Timestamp = TYPE_TIMESTAMP,
    Int64 = TYPE_INT64,
    MaxKey = TYPE_MAXKEY,
    MinKey = TYPE_MINKEY,
}

impl ElementType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ElementType {
    type Error = BsonError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        let element_type = match tag {
            TYPE_DOUBLE => ElementType::Double,
            TYPE_STRING => ElementType::String,
            TYPE_DOCUMENT => ElementType::EmbeddedDocument,
            TYPE_ARRAY => ElementType::Array,
            TYPE_BINARY => ElementType::Binary,
            TYPE_UNDEFINED => ElementType::Undefined,
            TYPE_OBJECTID => ElementType::ObjectId,
            TYPE_BOOL => ElementType::Boolean,
            TYPE_DATETIME => ElementType::DateTime,
            TYPE_NULL => ElementType::Null,
            TYPE_REGEX => ElementType::Regex,
            TYPE_DBPOINTER => ElementType::DbPointer,
            TYPE_JAVASCRIPT => ElementType::JavaScript,
            TYPE_SYMBOL => ElementType::Symbol,
            TYPE_JAVASCRIPT_WITH_SCOPE => ElementType::JavaScriptWithScope,
            TYPE_INT32 => ElementType::Int32,
            TYPE_TIMESTAMP => ElementType::Timestamp,
            TYPE_INT64 => ElementType::Int64,
            TYPE_MAXKEY => ElementType::MaxKey,
            TYPE_MINKEY => ElementType::MinKey,
            other => return Err(BsonError::UnknownTypeTag(other)),
        };
        Ok(element_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BsonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Shape {shape} cannot be mapped to a document")]
    UnsupportedShape { shape: String },
    #[error("Unexpected end of data: expected {expected} bytes, got {actual}")]
    DecodeTruncated { expected: usize, actual: usize },
    #[error("Unknown BSON type tag: {0:#04x}")]
    UnknownTypeTag(u8),
    #[error("Document too large: {size} bytes (max: {max})")]
    DocumentTooLarge { size: usize, max: usize },
    #[error("Invalid document length: declared {declared}, available {available}")]
    InvalidLength { declared: i64, available: usize },
    #[error("Invalid string encoding")]
    InvalidString,
    #[error("Invalid string length: {0}")]
    InvalidStringLength(i32),
    #[error("Invalid binary length: {0}")]
    InvalidBinaryLength(i32),
    #[error("Invalid ObjectId length: {0} bytes")]
    InvalidObjectIdLength(usize),
    #[error("Invalid ObjectId hex: {0}")]
    InvalidObjectIdHex(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("Invalid field name: {0}")]
    InvalidKey(String),
    #[error("C string contains a null byte: {0:?}")]
    InvalidCString(String),
    #[error("Missing null terminator")]
    MissingNullTerminator,
    #[error("Document does not end with 0x00")]
    MissingTerminator,
    #[error("Nesting depth limit exceeded: {depth} levels (max: {max})")]
    NestingTooDeep { depth: usize, max: usize },
    #[error("Field {shape}.{field} expects {expected}, found {found:?}")]
    FieldTypeMismatch {
        shape: String,
        field: String,
        expected: String,
        found: ElementType,
    },
}

impl From<ValidationError> for BsonError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NestingDepthExceeded(depth, max) => {
                BsonError::NestingTooDeep { depth, max }
            }
            other => BsonError::InvalidKey(other.to_string()),
        }
    }
}

/// Serialize with default limits.
pub fn serialize_document(doc: &Document) -> Result<Vec<u8>, BsonError> {
    let registry = TypeRegistry::new();
    BsonEncoder::new(&registry).encode_document(doc)
}

/// Deserialize a buffer holding exactly one document.
pub fn deserialize_document(data: &[u8]) -> Result<Document, BsonError> {
    let registry = TypeRegistry::new();
    BsonDecoder::new(&registry).decode_document(data)
}

/// Turns documents, shapes and single values into their binary form.
///
/// The encoded size is computed up front, so an oversized document is
/// rejected before any bytes are produced.
#[derive(Clone)]
pub struct BsonEncoder<'r> {
    registry: &'r TypeRegistry,
    validator: DocumentValidator,
    max_document_size: usize,
}

impl<'r> BsonEncoder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        BsonEncoder {
            registry,
            validator: DocumentValidator::new(),
            max_document_size: MAX_DOCUMENT_SIZE,
        }
    }

    pub fn with_max_document_size(mut self, max_document_size: usize) -> Self {
        self.max_document_size = max_document_size;
        self
    }

    pub fn with_validator(mut self, validator: DocumentValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    pub fn validator(&self) -> &DocumentValidator {
        &self.validator
    }

    pub fn max_document_size(&self) -> usize {
        self.max_document_size
    }

    pub fn encode_document(&self, doc: &Document) -> Result<Vec<u8>, BsonError> {
        let size = doc.encoded_len();
        if size > self.max_document_size {
            return Err(BsonError::DocumentTooLarge {
                size,
                max: self.max_document_size,
            });
        }

        let mut buffer = Vec::with_capacity(size);
        self.write_document(&mut buffer, doc, 0)?;
        trace!(bytes = buffer.len(), fields = doc.len(), "encoded document");
        Ok(buffer)
    }

    /// Encode a typed value, appending `extra` after the shape's own fields.
    pub fn encode<T: Shape>(&self, value: &T, extra: Option<&Document>) -> Result<Vec<u8>, BsonError> {
        let mut doc = self.registry.to_document(value)?;
        if let Some(extra) = extra {
            doc.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self.encode_document(&doc)
    }

    /// Payload of a single value, without tag or key.
    pub fn encode_value(&self, value: &Value) -> Result<Vec<u8>, BsonError> {
        let mut buffer = Vec::new();
        self.write_value(&mut buffer, value, 0)?;
        Ok(buffer)
    }

    fn write_document(&self, buffer: &mut Vec<u8>, doc: &Document, depth: usize) -> Result<(), BsonError> {
        self.validator.validate_depth(depth)?;
        let start = buffer.len();
        buffer.write_i32::<LittleEndian>(0)?;
        for (key, value) in doc {
            self.write_element(buffer, key, value, depth)?;
        }
        buffer.write_u8(0x00)?;
        patch_length(buffer, start)
    }

    fn write_array(&self, buffer: &mut Vec<u8>, items: &[Value], depth: usize) -> Result<(), BsonError> {
        self.validator.validate_depth(depth)?;
        let start = buffer.len();
        buffer.write_i32::<LittleEndian>(0)?;
        for (i, item) in items.iter().enumerate() {
            self.write_element(buffer, &i.to_string(), item, depth)?;
        }
        buffer.write_u8(0x00)?;
        patch_length(buffer, start)
    }

    fn write_element(&self, buffer: &mut Vec<u8>, key: &str, value: &Value, depth: usize) -> Result<(), BsonError> {
        self.validator.validate_key(key)?;
        buffer.write_u8(value.element_type().tag())?;
        buffer.extend_from_slice(key.as_bytes());
        buffer.write_u8(0x00)?;
        self.write_value(buffer, value, depth)
    }

    fn write_value(&self, buffer: &mut Vec<u8>, value: &Value, depth: usize) -> Result<(), BsonError> {
        match value {
            Value::Null | Value::Undefined | Value::MinKey | Value::MaxKey => {}
            Value::Bool(b) => buffer.write_u8(u8::from(*b))?,
            Value::I32(i) => buffer.write_i32::<LittleEndian>(*i)?,
            Value::I64(i) => buffer.write_i64::<LittleEndian>(*i)?,
            Value::F64(f) => buffer.write_f64::<LittleEndian>(*f)?,
            Value::String(s) | Value::JavaScript(s) | Value::Symbol(s) => write_string(buffer, s)?,
            Value::ObjectId(oid) => buffer.extend_from_slice(oid.as_bytes()),
            Value::DateTime(dt) => buffer.write_i64::<LittleEndian>(dt.timestamp_millis())?,
            Value::Regex(re) => {
                write_cstring(buffer, &re.pattern)?;
                write_cstring(buffer, &re.options)?;
            }
            Value::Binary(bin) => write_binary(buffer, bin)?,
            Value::Document(doc) => self.write_document(buffer, doc, depth + 1)?,
            Value::Array(items) => self.write_array(buffer, items, depth + 1)?,
            Value::DbPointer(ptr) => {
                write_string(buffer, &ptr.namespace)?;
                buffer.extend_from_slice(ptr.id.as_bytes());
            }
            Value::JavaScriptWithScope(js) => {
                let start = buffer.len();
                buffer.write_i32::<LittleEndian>(0)?;
                write_string(buffer, &js.code)?;
                self.write_document(buffer, &js.scope, depth + 1)?;
                patch_length(buffer, start)?;
            }
            Value::Timestamp(ts) => {
                buffer.write_u32::<LittleEndian>(ts.increment)?;
                buffer.write_u32::<LittleEndian>(ts.time)?;
            }
        }
        Ok(())
    }
}

fn patch_length(buffer: &mut [u8], start: usize) -> Result<(), BsonError> {
    let size = buffer.len() - start;
    let length = i32::try_from(size).map_err(|_| BsonError::DocumentTooLarge {
        size,
        max: i32::MAX as usize,
    })?;
    (&mut buffer[start..start + 4]).write_i32::<LittleEndian>(length)?;
    Ok(())
}

fn length_prefix(len: usize) -> Result<i32, BsonError> {
    i32::try_from(len).map_err(|_| BsonError::DocumentTooLarge {
        size: len,
        max: i32::MAX as usize,
    })
}

fn write_string(buffer: &mut Vec<u8>, s: &str) -> Result<(), BsonError> {
    buffer.write_i32::<LittleEndian>(length_prefix(s.len() + 1)?)?;
    buffer.extend_from_slice(s.as_bytes());
    buffer.write_u8(0x00)?;
    Ok(())
}

fn write_cstring(buffer: &mut Vec<u8>, s: &str) -> Result<(), BsonError> {
    if s.contains('\0') {
        return Err(BsonError::InvalidCString(s.to_string()));
    }
    buffer.extend_from_slice(s.as_bytes());
    buffer.write_u8(0x00)?;
    Ok(())
}

fn write_binary(buffer: &mut Vec<u8>, bin: &Binary) -> Result<(), BsonError> {
    let len = length_prefix(bin.bytes.len())?;
    match bin.subtype {
        BinarySubtype::ByteArray => {
            // old binary layout repeats the length inside the payload
            buffer.write_i32::<LittleEndian>(length_prefix(bin.bytes.len() + 4)?)?;
            buffer.write_u8(u8::from(bin.subtype))?;
            buffer.write_i32::<LittleEndian>(len)?;
        }
        BinarySubtype::UuidLegacy | BinarySubtype::Uuid if bin.bytes.len() != 16 => {
            return Err(BsonError::InvalidBinaryLength(len));
        }
        _ => {
            buffer.write_i32::<LittleEndian>(len)?;
            buffer.write_u8(u8::from(bin.subtype))?;
        }
    }
    buffer.extend_from_slice(&bin.bytes);
    Ok(())
}

/// Reads documents back from their binary form.
///
/// Each document's declared length fixes the region its elements are read
/// from; no read crosses the end of the enclosing region.
#[derive(Clone)]
pub struct BsonDecoder<'r> {
    registry: &'r TypeRegistry,
    validator: DocumentValidator,
}

impl<'r> BsonDecoder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        BsonDecoder {
            registry,
            validator: DocumentValidator::new(),
        }
    }

    pub fn with_validator(mut self, validator: DocumentValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// `data` must hold exactly one document.
    pub fn decode_document(&self, data: &[u8]) -> Result<Document, BsonError> {
        if data.len() < 4 {
            return Err(BsonError::DecodeTruncated {
                expected: 4,
                actual: data.len(),
            });
        }
        let declared = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if declared >= 0 && (declared as usize) < data.len() {
            return Err(BsonError::InvalidLength {
                declared: i64::from(declared),
                available: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let doc = self.read_document(&mut cursor, 0)?;
        trace!(bytes = data.len(), fields = doc.len(), "decoded document");
        Ok(doc)
    }

    /// Decode the document starting at the cursor and move past it.
    pub fn decode_document_from(&self, cursor: &mut Cursor<&[u8]>) -> Result<Document, BsonError> {
        self.read_document(cursor, 0)
    }

    /// Decode and bind to `T`; keys with no matching field come back in
    /// `Decoded::unmapped`.
    pub fn decode<T: Shape>(&self, data: &[u8]) -> Result<Decoded<T>, BsonError> {
        if !self.registry.is_decodable::<T>() {
            return Err(BsonError::UnsupportedShape {
                shape: self.registry.shape_name::<T>(),
            });
        }
        let doc = self.decode_document(data)?;
        self.registry.bind::<T>(doc)
    }

    /// Decode a single payload of the given tag. Returns the value and the
    /// number of bytes consumed.
    pub fn decode_value(&self, data: &[u8], tag: u8) -> Result<(Value, usize), BsonError> {
        let element_type = ElementType::try_from(tag)?;
        let mut cursor = Cursor::new(data);
        let value = self.read_value(&mut cursor, element_type, 0)?;
        Ok((value, cursor.position() as usize))
    }

    fn read_document(&self, cursor: &mut Cursor<&[u8]>, depth: usize) -> Result<Document, BsonError> {
        self.validator.validate_depth(depth)?;
        let region = take_region(cursor)?;

        // region always ends with the terminator byte, elements live before it
        let body_end = region.len() - 1;
        if region[body_end] != 0x00 {
            return Err(BsonError::MissingTerminator);
        }

        let mut body = Cursor::new(&region[..body_end]);
        body.set_position(4);
        let mut doc = Document::new();
        while (body.position() as usize) < body_end {
            let tag = read_u8_checked(&mut body)?;
            let element_type = ElementType::try_from(tag)?;
            let key = read_cstring(&mut body)?;
            let value = self.read_value(&mut body, element_type, depth)?;
            doc.push(key, value);
        }
        Ok(doc)
    }

    fn read_value(
        &self,
        cursor: &mut Cursor<&[u8]>,
        element_type: ElementType,
        depth: usize,
    ) -> Result<Value, BsonError> {
        let value = match element_type {
            ElementType::Double => Value::F64(read_f64_checked(cursor)?),
            ElementType::String => Value::String(read_string(cursor)?),
            ElementType::EmbeddedDocument => Value::Document(self.read_document(cursor, depth + 1)?),
            ElementType::Array => {
                let items = self.read_document(cursor, depth + 1)?;
                Value::Array(items.into_iter().map(|(_, v)| v).collect())
            }
            ElementType::Binary => Value::Binary(read_binary(cursor)?),
            ElementType::Undefined => Value::Undefined,
            ElementType::ObjectId => Value::ObjectId(ObjectId::try_from(read_bytes(cursor, OBJECT_ID_LEN)?)?),
            ElementType::Boolean => Value::Bool(read_u8_checked(cursor)? != 0),
            ElementType::DateTime => {
                let millis = read_i64_checked(cursor)?;
                let dt = chrono::DateTime::from_timestamp_millis(millis)
                    .ok_or(BsonError::InvalidTimestamp(millis))?;
                Value::DateTime(dt)
            }
            ElementType::Null => Value::Null,
            ElementType::Regex => {
                let pattern = read_cstring(cursor)?;
                let options = read_cstring(cursor)?;
                Value::Regex(Regex { pattern, options })
            }
            ElementType::DbPointer => {
                let namespace = read_string(cursor)?;
                let id = ObjectId::try_from(read_bytes(cursor, OBJECT_ID_LEN)?)?;
                Value::DbPointer(DbPointer { namespace, id })
            }
            ElementType::JavaScript => Value::JavaScript(read_string(cursor)?),
            ElementType::Symbol => Value::Symbol(read_string(cursor)?),
            ElementType::JavaScriptWithScope => {
                let start = cursor.position() as usize;
                let total = read_i32_checked(cursor)?;
                // i32 total + smallest string + smallest document
                if total < 4 + 5 + MIN_DOCUMENT_SIZE as i32 {
                    return Err(BsonError::InvalidLength {
                        declared: i64::from(total),
                        available: remaining(cursor) + 4,
                    });
                }
                ensure_available(cursor, total as usize - 4)?;
                let code = read_string(cursor)?;
                let scope = self.read_document(cursor, depth + 1)?;
                let consumed = cursor.position() as usize - start;
                if consumed != total as usize {
                    return Err(BsonError::InvalidLength {
                        declared: i64::from(total),
                        available: consumed,
                    });
                }
                Value::JavaScriptWithScope(JavaScriptWithScope { code, scope })
            }
            ElementType::Int32 => Value::I32(read_i32_checked(cursor)?),
            ElementType::Timestamp => {
                let increment = read_u32_checked(cursor)?;
                let time = read_u32_checked(cursor)?;
                Value::Timestamp(Timestamp { time, increment })
            }
            ElementType::Int64 => Value::I64(read_i64_checked(cursor)?),
            ElementType::MinKey => Value::MinKey,
            ElementType::MaxKey => Value::MaxKey,
        };
        Ok(value)
    }
}

/// Slice out the length-prefixed document at the cursor and advance past it.
fn take_region<'a>(cursor: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], BsonError> {
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let available = remaining(cursor);

    let declared = read_i32_checked(cursor)?;
    if declared < MIN_DOCUMENT_SIZE as i32 {
        return Err(BsonError::InvalidLength {
            declared: i64::from(declared),
            available,
        });
    }
    let declared = declared as usize;
    if declared > available {
        return Err(BsonError::DecodeTruncated {
            expected: declared,
            actual: available,
        });
    }

    cursor.set_position((start + declared) as u64);
    Ok(&data[start..start + declared])
}

fn remaining(cursor: &Cursor<&[u8]>) -> usize {
    cursor.get_ref().len().saturating_sub(cursor.position() as usize)
}

fn ensure_available(cursor: &Cursor<&[u8]>, needed: usize) -> Result<(), BsonError> {
    let available = remaining(cursor);
    if available < needed {
        return Err(BsonError::DecodeTruncated {
            expected: needed,
            actual: available,
        });
    }
    Ok(())
}

fn read_u8_checked(cursor: &mut Cursor<&[u8]>) -> Result<u8, BsonError> {
    ensure_available(cursor, 1)?;
    Ok(cursor.read_u8()?)
}

fn read_i32_checked(cursor: &mut Cursor<&[u8]>) -> Result<i32, BsonError> {
    ensure_available(cursor, 4)?;
    Ok(cursor.read_i32::<LittleEndian>()?)
}

fn read_u32_checked(cursor: &mut Cursor<&[u8]>) -> Result<u32, BsonError> {
    ensure_available(cursor, 4)?;
    Ok(cursor.read_u32::<LittleEndian>()?)
}

fn read_i64_checked(cursor: &mut Cursor<&[u8]>) -> Result<i64, BsonError> {
    ensure_available(cursor, 8)?;
    Ok(cursor.read_i64::<LittleEndian>()?)
}

fn read_f64_checked(cursor: &mut Cursor<&[u8]>) -> Result<f64, BsonError> {
    ensure_available(cursor, 8)?;
    Ok(cursor.read_f64::<LittleEndian>()?)
}

fn read_bytes<'a>(cursor: &mut Cursor<&'a [u8]>, len: usize) -> Result<&'a [u8], BsonError> {
    ensure_available(cursor, len)?;
    let data: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    cursor.set_position((start + len) as u64);
    Ok(&data[start..start + len])
}

fn read_cstring(cursor: &mut Cursor<&[u8]>) -> Result<String, BsonError> {
    let data: &[u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let rest = data.get(start..).unwrap_or_default();
    let end = rest
        .iter()
        .position(|&b| b == 0x00)
        .ok_or(BsonError::MissingNullTerminator)?;
    let text = std::str::from_utf8(&rest[..end]).map_err(|_| BsonError::InvalidString)?;
    cursor.set_position((start + end + 1) as u64);
    Ok(text.to_string())
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, BsonError> {
    let length = read_i32_checked(cursor)?;
    if length < 1 {
        return Err(BsonError::InvalidStringLength(length));
    }
    let bytes = read_bytes(cursor, length as usize)?;
    let (text, terminator) = bytes.split_at(bytes.len() - 1);
    if terminator[0] != 0x00 {
        return Err(BsonError::MissingNullTerminator);
    }
    String::from_utf8(text.to_vec()).map_err(|_| BsonError::InvalidString)
}

fn read_binary(cursor: &mut Cursor<&[u8]>) -> Result<Binary, BsonError> {
    let length = read_i32_checked(cursor)?;
    if length < 0 {
        return Err(BsonError::InvalidBinaryLength(length));
    }
    let subtype = BinarySubtype::from(read_u8_checked(cursor)?);
    let payload_len = match subtype {
        BinarySubtype::ByteArray => {
            let inner = read_i32_checked(cursor)?;
            if inner < 0 || inner.checked_add(4) != Some(length) {
                return Err(BsonError::InvalidBinaryLength(inner));
            }
            inner
        }
        BinarySubtype::UuidLegacy | BinarySubtype::Uuid if length != 16 => {
            return Err(BsonError::InvalidBinaryLength(length));
        }
        _ => length,
    };
    let bytes = read_bytes(cursor, payload_len as usize)?;
    Ok(Binary::with_subtype(subtype, bytes.to_vec()))
}
