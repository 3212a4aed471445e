use crate::entity::Record;
use crate::error::{ModelError, ModelResult};
use serde_json::Value;

/// Applies a partial change to a record.
///
/// Top-level fields of `patch` replace the record's fields; nested objects
/// are replaced whole, not merged. The result is deserialized back into `T`,
/// so a patch that breaks the record's shape is an error rather than a
/// silently corrupted value.
pub fn merge_patch<T: Record>(record: &T, patch: &Value) -> ModelResult<T> {
    let Value::Object(changes) = patch else {
        return Err(ModelError::InvalidPatch(format!(
            "expected an object, got {patch}"
        )));
    };

    let mut value = serde_json::to_value(record)?;
    let Value::Object(fields) = &mut value else {
        return Err(ModelError::InvalidPatch(
            "record does not serialize to an object".into(),
        ));
    };

    for (name, change) in changes {
        fields.insert(name.clone(), change.clone());
    }

    Ok(serde_json::from_value(value)?)
}
