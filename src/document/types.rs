// Value model for the wire format.
//
// Every BSON element type this driver can meet on the wire has a variant here,
// so the encoder and decoder can match exhaustively. Accessors are strict: they
// return `None` for any variant other than the one asked for, with the single
// exception of lossless integer widening in `as_i64` and `as_f64`.

use crate::document::Document;
use crate::document::bson::ElementType;
use crate::document::object_id::ObjectId;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Binary(Binary),
    ObjectId(ObjectId),
    Regex(Regex),
    DateTime(DateTime<Utc>),
    Document(Document),
    Array(Vec<Value>),
    DbPointer(DbPointer),
    JavaScript(String),
    JavaScriptWithScope(JavaScriptWithScope),
    Symbol(String),
    Timestamp(Timestamp),
    Undefined,
    MinKey,
    MaxKey,
}

/// Binary subtype discriminator, the byte written after the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    /// Generic bytes with a second, redundant length prefix.
    ByteArray,
    /// 16-byte UUID in the legacy little-endian GUID layout.
    UuidLegacy,
    Uuid,
    Md5,
    UserDefined(u8),
}

impl From<u8> for BinarySubtype {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BinarySubtype::Generic,
            0x01 => BinarySubtype::Function,
            0x02 => BinarySubtype::ByteArray,
            0x03 => BinarySubtype::UuidLegacy,
            0x04 => BinarySubtype::Uuid,
            0x05 => BinarySubtype::Md5,
            other => BinarySubtype::UserDefined(other),
        }
    }
}

impl From<BinarySubtype> for u8 {
    fn from(subtype: BinarySubtype) -> u8 {
        match subtype {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::ByteArray => 0x02,
            BinarySubtype::UuidLegacy => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::UserDefined(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    /// Raw byte buffer, written with the `ByteArray` subtype.
    pub fn new(bytes: Vec<u8>) -> Self {
        Binary {
            subtype: BinarySubtype::ByteArray,
            bytes,
        }
    }

    pub fn with_subtype(subtype: BinarySubtype, bytes: Vec<u8>) -> Self {
        Binary { subtype, bytes }
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Binary {
            subtype: BinarySubtype::UuidLegacy,
            bytes: uuid.to_bytes_le().to_vec(),
        }
    }

    /// Interpret the payload as a UUID. Legacy payloads use the GUID byte order.
    pub fn to_uuid(&self) -> Option<Uuid> {
        let bytes: [u8; 16] = self.bytes.as_slice().try_into().ok()?;
        match self.subtype {
            BinarySubtype::UuidLegacy => Some(Uuid::from_bytes_le(bytes)),
            BinarySubtype::Uuid => Some(Uuid::from_bytes(bytes)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Regex {
            pattern: pattern.into(),
            options: options.into(),
        }
    }
}

/// Deprecated DB reference: a namespace plus the id of the referenced document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbPointer {
    pub namespace: String,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptWithScope {
    pub code: String,
    pub scope: Document,
}

/// Internal replication timestamp: seconds plus an ordinal within the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub time: u32,
    pub increment: u32,
}

impl Value {
    pub fn element_type(&self) -> ElementType {
        match self {
            Value::Null => ElementType::Null,
            Value::Bool(_) => ElementType::Boolean,
            Value::I32(_) => ElementType::Int32,
            Value::I64(_) => ElementType::Int64,
            Value::F64(_) => ElementType::Double,
            Value::String(_) => ElementType::String,
            Value::Binary(_) => ElementType::Binary,
            Value::ObjectId(_) => ElementType::ObjectId,
            Value::Regex(_) => ElementType::Regex,
            Value::DateTime(_) => ElementType::DateTime,
            Value::Document(_) => ElementType::EmbeddedDocument,
            Value::Array(_) => ElementType::Array,
            Value::DbPointer(_) => ElementType::DbPointer,
            Value::JavaScript(_) => ElementType::JavaScript,
            Value::JavaScriptWithScope(_) => ElementType::JavaScriptWithScope,
            Value::Symbol(_) => ElementType::Symbol,
            Value::Timestamp(_) => ElementType::Timestamp,
            Value::Undefined => ElementType::Undefined,
            Value::MinKey => ElementType::MinKey,
            Value::MaxKey => ElementType::MaxKey,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::I32(_) | Value::I64(_) | Value::F64(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(i) => Some(i64::from(*i)),
            Value::I64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(i) => Some(f64::from(*i)),
            Value::F64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Value::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Plain JSON values map onto the narrowest numeric variant that holds them.
    /// `{"$oid": hex}` and `{"$date": millis}` are recognised.
    pub fn from_json_value(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::I32(small),
                        Err(_) => Value::I64(i),
                    }
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json_value).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(serde_json::Value::String(hex)) = map.get("$oid") {
                        if let Ok(oid) = ObjectId::parse_str(hex) {
                            return Value::ObjectId(oid);
                        }
                    }
                    if let Some(millis) = map.get("$date").and_then(|v| v.as_i64()) {
                        if let Some(dt) = DateTime::from_timestamp_millis(millis) {
                            return Value::DateTime(dt);
                        }
                    }
                }
                Value::Document(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_json_value(v)))
                        .collect(),
                )
            }
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Null | Value::Undefined => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::I32(i) => json!(i),
            Value::I64(i) => json!(i),
            Value::F64(f) => json!(f),
            Value::String(s) => json!(s),
            Value::Binary(bin) => json!({
                "$binary": hex::encode(&bin.bytes),
                "$type": format!("{:02x}", u8::from(bin.subtype)),
            }),
            Value::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
            Value::Regex(re) => json!({ "$regex": re.pattern, "$options": re.options }),
            Value::DateTime(dt) => json!({ "$date": dt.timestamp_millis() }),
            Value::Document(doc) => doc.to_json_value(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_value).collect())
            }
            Value::DbPointer(ptr) => json!({ "$ref": ptr.namespace, "$id": ptr.id.to_hex() }),
            Value::JavaScript(code) => json!({ "$code": code }),
            Value::JavaScriptWithScope(js) => {
                json!({ "$code": js.code, "$scope": js.scope.to_json_value() })
            }
            Value::Symbol(s) => json!({ "$symbol": s }),
            Value::Timestamp(ts) => json!({ "$timestamp": { "t": ts.time, "i": ts.increment } }),
            Value::MinKey => json!({ "$minKey": 1 }),
            Value::MaxKey => json!({ "$maxKey": 1 }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(i) => write!(f, "{}", i),
            Value::I64(i) => write!(f, "{}", i),
            Value::F64(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::ObjectId(oid) => write!(f, "{}", oid),
            other => write!(f, "{}", other.to_json_value()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectId> for Value {
    fn from(v: ObjectId) -> Self {
        Value::ObjectId(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Binary> for Value {
    fn from(v: Binary) -> Self {
        Value::Binary(v)
    }
}

impl From<Regex> for Value {
    fn from(v: Regex) -> Self {
        Value::Regex(v)
    }
}

impl From<Document> for Value {
    fn from(v: Document) -> Self {
        Value::Document(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Binary(Binary::from_uuid(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}
