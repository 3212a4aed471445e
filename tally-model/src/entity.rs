use crate::error::{ModelError, ModelResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tally_types::EntityKey;

/// Any entity shape the sync layer can hold.
///
/// Blanket-implemented: a generated binding only needs `Clone`, `Serialize`
/// and `Deserialize`. Identity is read through an [`IdField`], never through
/// a trait method, so the same type can be keyed differently per container.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Names the field that carries a record's identity.
///
/// A plain name (`"id"`, `"accountId"`) reads a top-level field. A name
/// starting with `/` is a JSON pointer (`"/meta/id"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdField(String);

impl IdField {
    /// Creates an identity field from a name or JSON pointer.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the configured name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Reads the identity of a record.
    ///
    /// Fails fast when the field is absent or holds anything other than a
    /// string or an integer.
    pub fn key_of<T: Record>(&self, record: &T) -> ModelResult<EntityKey> {
        let value = serde_json::to_value(record)?;
        self.key_of_value(&value)
    }

    /// Reads the identity of an already-serialized record.
    pub fn key_of_value(&self, value: &Value) -> ModelResult<EntityKey> {
        let field = if self.0.starts_with('/') {
            value.pointer(&self.0)
        } else {
            value.get(&self.0)
        };

        match field {
            Some(v) => EntityKey::from_json(v).ok_or_else(|| ModelError::InvalidIdentity {
                field: self.0.clone(),
                found: describe(v),
            }),
            None => Err(ModelError::InvalidIdentity {
                field: self.0.clone(),
                found: "nothing".into(),
            }),
        }
    }

    /// Returns true if the record's identity equals `key`.
    pub fn matches<T: Record>(&self, record: &T, key: &EntityKey) -> ModelResult<bool> {
        Ok(&self.key_of(record)? == key)
    }
}

impl Default for IdField {
    fn default() -> Self {
        Self("id".to_string())
    }
}

impl fmt::Display for IdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdField {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("non-integer number {n}"),
        Value::String(_) => "string".into(),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}
