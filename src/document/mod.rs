pub mod bson;
pub mod object_id;
pub mod types;
pub mod validator;

pub use object_id::{ObjectId, ObjectIdGenerator};
pub use types::{Binary, BinarySubtype, DbPointer, JavaScriptWithScope, Regex, Timestamp, Value};

// Ordered key/value document. Insertion order is the order written to the
// wire. Keys are not required to be unique; lookups see the last entry.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

/// Build a `Document` from `key => value` pairs, values converted with `Into<Value>`.
#[macro_export]
macro_rules! doc {
    () => {
        $crate::document::Document::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::document::Document::new();
        $(
            document.push($key, $value);
        )+
        document
    }};
}

impl Document {
    pub fn new() -> Self {
        Document {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Document {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(input)?;
        Ok(map
            .into_iter()
            .map(|(k, v)| (k, Value::from_json_value(v)))
            .collect())
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            map.insert(key.clone(), value.to_json_value());
        }
        serde_json::Value::Object(map)
    }

    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Last value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Replace the value of an existing key in place, or append a new entry.
    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Append an entry without looking for an existing key.
    pub fn push<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.entries.push((key.into(), value.into()));
    }

    /// Remove every entry stored under `key`, returning the last one.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let mut removed = None;
        let mut kept = Vec::with_capacity(self.entries.len());
        for (k, v) in self.entries.drain(..) {
            if k == key {
                removed = Some(v);
            } else {
                kept.push((k, v));
            }
        }
        self.entries = kept;
        removed
    }

    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut iter = path.split('.');
        let mut cur = self.get(iter.next()?);

        for key in iter {
            cur = match cur {
                Some(Value::Document(doc)) => doc.get(key),
                Some(Value::Array(items)) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => return None,
            };
        }

        cur
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(Value::as_i32)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    pub fn get_object_id(&self, key: &str) -> Option<ObjectId> {
        self.get(key).and_then(Value::as_object_id)
    }

    pub fn id(&self) -> Option<&Value> {
        self.get("_id")
    }

    /// Make sure the document carries an `_id`, inserting a fresh ObjectId as
    /// the first entry when it is missing.
    pub fn ensure_id(&mut self) -> &Value {
        let position = match self.entries.iter().rposition(|(k, _)| k == "_id") {
            Some(position) => position,
            None => {
                self.entries
                    .insert(0, ("_id".to_string(), Value::ObjectId(ObjectId::new())));
                0
            }
        };
        &self.entries[position].1
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Exact number of bytes `BsonEncoder::encode_document` produces for this document.
    pub fn encoded_len(&self) -> usize {
        let mut size = 4 + 1; // length prefix and terminator
        for (key, value) in &self.entries {
            size += 1 + key.len() + 1;
            size += encoded_value_len(value);
        }
        size
    }
}

fn encoded_string_len(s: &str) -> usize {
    4 + s.len() + 1
}

fn encoded_value_len(value: &Value) -> usize {
    use crate::document::types::BinarySubtype;

    match value {
        Value::Null | Value::Undefined | Value::MinKey | Value::MaxKey => 0,
        Value::Bool(_) => 1,
        Value::I32(_) => 4,
        Value::I64(_) | Value::F64(_) | Value::DateTime(_) | Value::Timestamp(_) => 8,
        Value::String(s) | Value::JavaScript(s) | Value::Symbol(s) => encoded_string_len(s),
        Value::ObjectId(_) => 12,
        Value::Regex(re) => re.pattern.len() + 1 + re.options.len() + 1,
        Value::Binary(bin) => {
            let inner = if bin.subtype == BinarySubtype::ByteArray { 4 } else { 0 };
            4 + 1 + inner + bin.bytes.len()
        }
        Value::Document(doc) => doc.encoded_len(),
        Value::Array(items) => {
            let mut size = 4 + 1;
            for (i, item) in items.iter().enumerate() {
                size += 1 + i.to_string().len() + 1 + encoded_value_len(item);
            }
            size
        }
        Value::DbPointer(ptr) => encoded_string_len(&ptr.namespace) + 12,
        Value::JavaScriptWithScope(js) => 4 + encoded_string_len(&js.code) + js.scope.encoded_len(),
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(String, Value)> for Document {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, Value)>,
        fn(&'a (String, Value)) -> (&'a String, &'a Value),
    >;

    fn into_iter(self) -> Self::IntoIter {
        let refs: fn(&'a (String, Value)) -> (&'a String, &'a Value) = |(k, v)| (k, v);
        self.entries.iter().map(refs)
    }
}
