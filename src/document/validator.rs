// Document validator

use crate::document::{Document, Value};

pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Keys of a DB reference sub-document, allowed below the top level.
const DB_REF_KEYS: [&str; 3] = ["$ref", "$id", "$db"];

// Validation error reporting with field paths
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field name contains null bytes: {0:?}")]
    FieldNameContainsNullBytes(String),
    #[error("Empty field name at {0:?}")]
    EmptyFieldName(String),
    #[error("Field name may not start with '$': {0}")]
    DollarPrefixedFieldName(String),
    #[error("Field name may not contain '.': {0}")]
    DottedFieldName(String),
    #[error("Nesting depth limit exceeded: {0} levels (max: {1})")]
    NestingDepthExceeded(usize, usize),
}

#[derive(Debug, Clone)]
pub struct DocumentValidator {
    max_depth: usize, // default to 100 levels
}

impl Default for DocumentValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentValidator {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// A key is written as a C string, so it must not contain NUL.
    pub fn validate_key(&self, key: &str) -> Result<(), ValidationError> {
        if key.contains('\0') {
            return Err(ValidationError::FieldNameContainsNullBytes(key.to_string()));
        }
        Ok(())
    }

    pub fn validate_depth(&self, depth: usize) -> Result<(), ValidationError> {
        if depth > self.max_depth {
            return Err(ValidationError::NestingDepthExceeded(depth, self.max_depth));
        }
        Ok(())
    }

    /// Rules for documents that are stored as-is by an insert: no empty keys,
    /// no `$` prefix, no dots. Nested documents may use the DB reference keys
    /// `$ref`, `$id` and `$db`. Query and update documents are exempt since
    /// they use operators.
    pub fn validate_storage_keys(&self, doc: &Document) -> Result<(), ValidationError> {
        self.validate_fields_recursive(doc, "")
    }

    // Recursive field validation with path tracking
    fn validate_fields_recursive(&self, doc: &Document, path: &str) -> Result<(), ValidationError> {
        for (field_name, value) in doc {
            let field_path = if path.is_empty() {
                field_name.clone()
            } else {
                format!("{}.{}", path, field_name)
            };

            if field_name.is_empty() {
                return Err(ValidationError::EmptyFieldName(field_path));
            }
            let db_ref_key = !path.is_empty() && DB_REF_KEYS.contains(&field_name.as_str());
            if field_name.starts_with('$') && !db_ref_key {
                return Err(ValidationError::DollarPrefixedFieldName(field_path));
            }
            if field_name.contains('.') {
                return Err(ValidationError::DottedFieldName(field_path));
            }
            self.validate_key(field_name)?;
            self.validate_value_recursive(value, &field_path)?;
        }
        Ok(())
    }

    fn validate_value_recursive(&self, value: &Value, path: &str) -> Result<(), ValidationError> {
        match value {
            Value::Document(doc) => self.validate_fields_recursive(doc, path),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    self.validate_value_recursive(item, &item_path)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
