//! Request builder - canonical desired state to remote update payloads

use serde_json::{Map, Value};

use crate::resource::{Encoding, ResourceSchema};
use crate::types::{DesiredState, FieldValue};

/// Build the update payload for a desired state
///
/// Every declared field present in `desired` is emitted under its remote
/// name and text encoding, and the mapping is wrapped in the schema's
/// envelope (outermost key first). The payload always carries the full
/// desired state, not just the changed fields.
pub fn build(desired: &DesiredState, schema: &ResourceSchema) -> Value {
    let encoding = schema.encoding();
    let fields: Map<String, Value> = schema
        .fields()
        .iter()
        .filter_map(|spec| {
            desired
                .get(&spec.name)
                .map(|value| (spec.remote_name().to_string(), encode(value, encoding)))
        })
        .collect();

    wrap(Value::Object(fields), schema.envelope())
}

/// Remote text encoding of one value
pub fn encode(value: &FieldValue, encoding: &Encoding) -> Value {
    let text = match value {
        FieldValue::Null => String::new(),
        FieldValue::Bool(true) => encoding.bool_true.clone(),
        FieldValue::Bool(false) => encoding.bool_false.clone(),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Str(s) => s.clone(),
        FieldValue::List(items) => items.join(encoding.list_delimiter.to_string().as_str()),
    };
    Value::String(text)
}

fn wrap(inner: Value, envelope: &[String]) -> Value {
    envelope.iter().rev().fold(inner, |acc, key| {
        let mut outer = Map::new();
        outer.insert(key.clone(), acc);
        Value::Object(outer)
    })
}
