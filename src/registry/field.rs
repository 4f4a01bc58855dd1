// Leaf types a shape field may hold, and how each maps to a Value.

use crate::document::types::{Binary, Regex, Value};
use crate::document::{Document, ObjectId};
use crate::registry::{Capabilities, TypeRegistry, Walk};
use chrono::{DateTime, Utc};
use std::any::TypeId;
use std::fmt;
use uuid::Uuid;

/// Static description of a field's type, enough to decide encodability and
/// decodability without touching an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Int32,
    Int64,
    Double,
    Boolean,
    String,
    Binary,
    ObjectId,
    Regex,
    DateTime,
    Guid,
    Document,
    Any,
    Nullable(Box<FieldKind>),
    List(Box<FieldKind>),
    Embedded(ShapeRef),
}

impl FieldKind {
    /// Leaves that always carry a value and so cannot represent a missing one.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            FieldKind::Int32
                | FieldKind::Int64
                | FieldKind::Double
                | FieldKind::Boolean
                | FieldKind::DateTime
                | FieldKind::Guid
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Int32 => write!(f, "int32"),
            FieldKind::Int64 => write!(f, "int64"),
            FieldKind::Double => write!(f, "double"),
            FieldKind::Boolean => write!(f, "bool"),
            FieldKind::String => write!(f, "string"),
            FieldKind::Binary => write!(f, "binary"),
            FieldKind::ObjectId => write!(f, "objectId"),
            FieldKind::Regex => write!(f, "regex"),
            FieldKind::DateTime => write!(f, "date"),
            FieldKind::Guid => write!(f, "guid"),
            FieldKind::Document => write!(f, "document"),
            FieldKind::Any => write!(f, "any"),
            FieldKind::Nullable(inner) => write!(f, "nullable {}", inner),
            FieldKind::List(inner) => write!(f, "list of {}", inner),
            FieldKind::Embedded(shape) => write!(f, "{}", shape.type_name),
        }
    }
}

/// Handle to a nested shape, used to walk composites without knowing their
/// concrete type at the call site.
#[derive(Clone, Copy)]
pub struct ShapeRef {
    type_id: TypeId,
    type_name: &'static str,
    probe: fn(&TypeRegistry, &mut Walk) -> Capabilities,
}

impl ShapeRef {
    pub fn of<U: crate::registry::Shape>() -> Self {
        ShapeRef {
            type_id: TypeId::of::<U>(),
            type_name: std::any::type_name::<U>(),
            probe: TypeRegistry::walk_capabilities::<U>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn probe(&self, registry: &TypeRegistry, walk: &mut Walk) -> Capabilities {
        (self.probe)(registry, walk)
    }
}

impl fmt::Debug for ShapeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ShapeRef").field(&self.type_name).finish()
    }
}

impl PartialEq for ShapeRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// A Rust type that can sit in a shape field.
///
/// `from_value` hands the value back on mismatch so the caller can report
/// what was actually found.
pub trait FieldType: Sized + Send + Sync + 'static {
    fn kind() -> FieldKind;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, Value>;
}

impl FieldType for i32 {
    fn kind() -> FieldKind {
        FieldKind::Int32
    }

    fn to_value(&self) -> Value {
        Value::I32(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::I32(i) => Ok(i),
            other => Err(other),
        }
    }
}

impl FieldType for i64 {
    fn kind() -> FieldKind {
        FieldKind::Int64
    }

    fn to_value(&self) -> Value {
        Value::I64(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::I32(i) => Ok(i64::from(i)),
            Value::I64(i) => Ok(i),
            other => Err(other),
        }
    }
}

impl FieldType for f64 {
    fn kind() -> FieldKind {
        FieldKind::Double
    }

    fn to_value(&self) -> Value {
        Value::F64(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::F64(f) => Ok(f),
            Value::I32(i) => Ok(f64::from(i)),
            Value::I64(i) => Ok(i as f64),
            other => Err(other),
        }
    }
}

impl FieldType for bool {
    fn kind() -> FieldKind {
        FieldKind::Boolean
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl FieldType for String {
    fn kind() -> FieldKind {
        FieldKind::String
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::String(s) | Value::Symbol(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl FieldType for Binary {
    fn kind() -> FieldKind {
        FieldKind::Binary
    }

    fn to_value(&self) -> Value {
        Value::Binary(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Binary(bin) => Ok(bin),
            other => Err(other),
        }
    }
}

impl FieldType for ObjectId {
    fn kind() -> FieldKind {
        FieldKind::ObjectId
    }

    fn to_value(&self) -> Value {
        Value::ObjectId(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::ObjectId(oid) => Ok(oid),
            other => Err(other),
        }
    }
}

impl FieldType for Regex {
    fn kind() -> FieldKind {
        FieldKind::Regex
    }

    fn to_value(&self) -> Value {
        Value::Regex(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Regex(re) => Ok(re),
            other => Err(other),
        }
    }
}

impl FieldType for DateTime<Utc> {
    fn kind() -> FieldKind {
        FieldKind::DateTime
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(other),
        }
    }
}

impl FieldType for Uuid {
    fn kind() -> FieldKind {
        FieldKind::Guid
    }

    fn to_value(&self) -> Value {
        Value::Binary(Binary::from_uuid(*self))
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Binary(bin) => match bin.to_uuid() {
                Some(uuid) => Ok(uuid),
                None => Err(Value::Binary(bin)),
            },
            other => Err(other),
        }
    }
}

impl FieldType for Document {
    fn kind() -> FieldKind {
        FieldKind::Document
    }

    fn to_value(&self) -> Value {
        Value::Document(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Document(doc) => Ok(doc),
            other => Err(other),
        }
    }
}

impl FieldType for Value {
    fn kind() -> FieldKind {
        FieldKind::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }
}

impl<F: FieldType> FieldType for Option<F> {
    fn kind() -> FieldKind {
        FieldKind::Nullable(Box::new(F::kind()))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null | Value::Undefined => Ok(None),
            other => F::from_value(other).map(Some),
        }
    }
}

impl<F: FieldType> FieldType for Vec<F> {
    fn kind() -> FieldKind {
        FieldKind::List(Box::new(F::kind()))
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(FieldType::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Array(items) => items.into_iter().map(F::from_value).collect(),
            other => Err(other),
        }
    }
}
