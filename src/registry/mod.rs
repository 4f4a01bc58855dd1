// Shape registry: per-type field maps and capability flags, computed once
// from each type's `Schema` and cached by `TypeId`.

pub mod field;
pub mod schema;

pub use field::{FieldKind, FieldType, ShapeRef};
pub use schema::{Schema, Shape};

use crate::document::bson::BsonError;
use crate::document::{Document, Value};
use schema::FieldDescriptor;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Wire key of the identifier field.
pub const ID_KEY: &str = "_id";

/// Maps a shape field to the key it is stored under.
///
/// Returning `None` keeps the field name. Identifier fields are always stored
/// under `_id` and never consult the resolver.
pub trait KeyAliasResolver: Send + Sync {
    fn wire_key(&self, shape: &str, field: &str) -> Option<String>;
}

/// Every field is stored under its own name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAliases;

impl KeyAliasResolver for NoAliases {
    fn wire_key(&self, _shape: &str, _field: &str) -> Option<String> {
        None
    }
}

/// Explicit `(shape, field) -> key` table.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    aliases: HashMap<(String, String), String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, shape: &str, field: &str, key: &str) -> Self {
        self.aliases
            .insert((shape.to_string(), field.to_string()), key.to_string());
        self
    }
}

impl KeyAliasResolver for AliasMap {
    fn wire_key(&self, shape: &str, field: &str) -> Option<String> {
        self.aliases
            .get(&(shape.to_string(), field.to_string()))
            .cloned()
    }
}

/// Whether a shape can be written, read, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub encodable: bool,
    pub decodable: bool,
}

impl Capabilities {
    const ALL: Capabilities = Capabilities {
        encodable: true,
        decodable: true,
    };
}

/// Result of binding a document to a shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    /// Entries that matched no writable field, keyed by their original
    /// spelling. Entries of nested shapes carry a dotted path prefix.
    pub unmapped: Document,
}

/// Capability walk state. Shapes on `visiting` are assumed capable when met
/// again, and `lowest_assumed` records the outermost shape such an assumption
/// was made about.
#[derive(Debug, Default)]
pub(crate) struct Walk {
    visiting: Vec<TypeId>,
    lowest_assumed: Option<usize>,
}

pub(crate) struct BoundField<T> {
    wire_key: String,
    descriptor: FieldDescriptor<T>,
}

pub(crate) struct ShapeEntry<T> {
    name: String,
    constructor: Option<fn() -> T>,
    fields: Vec<BoundField<T>>,
    by_key: HashMap<String, usize>,
}

type ErasedEntry = Arc<dyn Any + Send + Sync>;

/// Cache of shape descriptions.
///
/// Entries are built outside the lock and the first one stored wins, so
/// concurrent first use of a shape is safe. The maps only grow unless
/// `invalidate` or `clear` is called.
pub struct TypeRegistry {
    resolver: Box<dyn KeyAliasResolver>,
    entries: RwLock<HashMap<TypeId, ErasedEntry>>,
    capabilities: RwLock<HashMap<TypeId, Capabilities>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::with_resolver(NoAliases)
    }

    pub fn with_resolver(resolver: impl KeyAliasResolver + 'static) -> Self {
        TypeRegistry {
            resolver: Box::new(resolver),
            entries: RwLock::new(HashMap::new()),
            capabilities: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_encodable<T: Shape>(&self) -> bool {
        self.capabilities::<T>().encodable
    }

    pub fn is_decodable<T: Shape>(&self) -> bool {
        self.capabilities::<T>().decodable
    }

    pub fn capabilities<T: Shape>(&self) -> Capabilities {
        self.walk_capabilities::<T>(&mut Walk::default())
    }

    pub fn shape_name<T: Shape>(&self) -> String {
        self.entry::<T>().name.clone()
    }

    /// Lower-cased wire key to field name.
    pub fn field_map<T: Shape>(&self) -> HashMap<String, String> {
        let entry = self.entry::<T>();
        entry
            .by_key
            .iter()
            .map(|(key, &index)| (key.clone(), entry.fields[index].descriptor.name.clone()))
            .collect()
    }

    /// Drop everything cached about `T`. Capability flags of other shapes may
    /// depend on `T`, so they are dropped as well.
    pub fn invalidate<T: Shape>(&self) {
        let id = TypeId::of::<T>();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fields of `value` in declared order. Unset optional fields are written
    /// as null. The `UnsupportedShape` branch is unreachable for shapes built
    /// through [`Schema`], whose field types are checked at compile time.
    pub fn to_document<T: Shape>(&self, value: &T) -> Result<Document, BsonError> {
        if !self.is_encodable::<T>() {
            return Err(BsonError::UnsupportedShape {
                shape: self.shape_name::<T>(),
            });
        }
        self.fields_to_document(value)
    }

    /// Build a `T` from `doc`. Keys are matched without regard to case.
    pub fn bind<T: Shape>(&self, doc: Document) -> Result<Decoded<T>, BsonError> {
        if !self.is_decodable::<T>() {
            return Err(BsonError::UnsupportedShape {
                shape: self.shape_name::<T>(),
            });
        }
        let mut unmapped = Document::new();
        let value = self.bind_fields::<T>(doc, &mut unmapped, "")?;
        Ok(Decoded { value, unmapped })
    }

    pub(crate) fn fields_to_document<T: Shape>(&self, value: &T) -> Result<Document, BsonError> {
        let entry = self.entry::<T>();
        let mut doc = Document::with_capacity(entry.fields.len());
        for field in &entry.fields {
            if let Some(getter) = &field.descriptor.getter {
                doc.push(field.wire_key.clone(), getter(value, self)?);
            }
        }
        Ok(doc)
    }

    fn bind_fields<T: Shape>(
        &self,
        doc: Document,
        unmapped: &mut Document,
        path: &str,
    ) -> Result<T, BsonError> {
        let entry = self.entry::<T>();
        let constructor = entry.constructor.ok_or_else(|| BsonError::UnsupportedShape {
            shape: entry.name.clone(),
        })?;
        let mut instance = constructor();

        for (key, value) in doc {
            let key_path = join_path(path, &key);
            let setter = entry
                .by_key
                .get(&key.to_lowercase())
                .and_then(|&index| entry.fields[index].descriptor.setter.as_ref());
            match setter {
                Some(setter) => {
                    let mut ctx = BindContext {
                        registry: self,
                        unmapped: &mut *unmapped,
                        path: key_path,
                        shape: &entry.name,
                    };
                    setter(&mut instance, value, &mut ctx)?;
                }
                None => unmapped.push(key_path, value),
            }
        }
        Ok(instance)
    }

    pub(crate) fn walk_capabilities<T: Shape>(&self, walk: &mut Walk) -> Capabilities {
        let id = TypeId::of::<T>();
        if let Some(found) = self.cached_capabilities(id) {
            return found;
        }
        if let Some(position) = walk.visiting.iter().position(|visiting| *visiting == id) {
            walk.lowest_assumed = Some(walk.lowest_assumed.map_or(position, |low| low.min(position)));
            return Capabilities::ALL;
        }

        let depth = walk.visiting.len();
        walk.visiting.push(id);
        let entry = self.entry::<T>();
        let mut found = Capabilities {
            encodable: true,
            decodable: entry.constructor.is_some(),
        };
        for field in &entry.fields {
            let descriptor = &field.descriptor;
            if descriptor.getter.is_some() && !self.kind_encodable(&descriptor.kind, walk) {
                found.encodable = false;
            }
            if descriptor.setter.is_some() && !self.kind_decodable(&descriptor.kind, true, walk) {
                found.decodable = false;
            }
        }
        walk.visiting.pop();

        match walk.lowest_assumed {
            // still relies on a shape further out that is not finished yet
            Some(low) if low < depth => {}
            _ => {
                walk.lowest_assumed = None;
                self.store_capabilities(id, found);
                debug!(
                    shape = %entry.name,
                    encodable = found.encodable,
                    decodable = found.decodable,
                    "shape capabilities computed"
                );
            }
        }
        found
    }

    fn kind_encodable(&self, kind: &FieldKind, walk: &mut Walk) -> bool {
        match kind {
            FieldKind::Nullable(inner) | FieldKind::List(inner) => self.kind_encodable(inner, walk),
            FieldKind::Embedded(shape) => shape.probe(self, walk).encodable,
            _ => true,
        }
    }

    fn kind_decodable(&self, kind: &FieldKind, top_level: bool, walk: &mut Walk) -> bool {
        match kind {
            FieldKind::Nullable(inner) | FieldKind::List(inner) => {
                self.kind_decodable(inner, false, walk)
            }
            FieldKind::Embedded(shape) => shape.probe(self, walk).decodable,
            leaf => !(top_level && leaf.is_value_type()),
        }
    }

    fn cached_capabilities(&self, id: TypeId) -> Option<Capabilities> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    fn store_capabilities(&self, id: TypeId, found: Capabilities) {
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert(found);
    }

    fn entry<T: Shape>(&self) -> Arc<ShapeEntry<T>> {
        let id = TypeId::of::<T>();
        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        if let Some(entry) = cached.and_then(|erased| erased.downcast::<ShapeEntry<T>>().ok()) {
            return entry;
        }

        let built = Arc::new(self.build_entry::<T>());
        let erased: ErasedEntry = built.clone();
        let stored = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert(erased)
            .clone();
        stored.downcast::<ShapeEntry<T>>().unwrap_or(built)
    }

    fn build_entry<T: Shape>(&self) -> ShapeEntry<T> {
        let mut schema = Schema::<T>::new();
        T::describe(&mut schema);

        let mut fields: Vec<BoundField<T>> = Vec::with_capacity(schema.fields.len());
        let mut by_key = HashMap::with_capacity(schema.fields.len());
        for descriptor in schema.fields {
            let wire_key = if descriptor.is_id {
                ID_KEY.to_string()
            } else {
                self.resolver
                    .wire_key(&schema.name, &descriptor.name)
                    .unwrap_or_else(|| descriptor.name.clone())
            };
            if let Some(previous) = by_key.insert(wire_key.to_lowercase(), fields.len()) {
                warn!(
                    shape = %schema.name,
                    field = %descriptor.name,
                    shadowed = %fields[previous].descriptor.name,
                    key = %wire_key,
                    "wire keys differ only by case, the later field wins"
                );
            }
            fields.push(BoundField {
                wire_key,
                descriptor,
            });
        }

        ShapeEntry {
            name: schema.name,
            constructor: schema.constructor,
            fields,
            by_key,
        }
    }
}

/// State handed to field setters while a document is bound.
pub(crate) struct BindContext<'a> {
    registry: &'a TypeRegistry,
    unmapped: &'a mut Document,
    path: String,
    shape: &'a str,
}

impl BindContext<'_> {
    pub(crate) fn bind_nested<U: Shape>(
        &mut self,
        doc: Document,
        index: Option<usize>,
    ) -> Result<U, BsonError> {
        let path = match index {
            Some(index) => format!("{}.{}", self.path, index),
            None => self.path.clone(),
        };
        self.registry.bind_fields::<U>(doc, &mut *self.unmapped, &path)
    }

    pub(crate) fn mismatch(&self, field: &str, expected: &FieldKind, found: &Value) -> BsonError {
        BsonError::FieldTypeMismatch {
            shape: self.shape.to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.element_type(),
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}
