//! Field codec - remote mappings to canonical typed state
//!
//! The appliance reports almost everything as text: booleans as `"1"`/`"0"`,
//! integers as decimal strings, lists as comma-separated strings or as
//! option maps where each choice carries a `selected` flag. This module is
//! the only place that knows about those encodings.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::resource::{Encoding, FieldSpec, ResourceSchema};
use crate::types::{ActualState, FieldType, FieldValue};

const TRUTHY: &[&str] = &["1", "on", "yes", "true", "enabled"];
const FALSY: &[&str] = &["0", "", "off", "no", "false", "disabled"];

/// Walk `path` into a response and return the mapping found there
pub fn unwrap_envelope<'v>(raw: &'v Value, path: &[String]) -> Result<&'v Map<String, Value>> {
    locate(raw, path)?
        .as_object()
        .ok_or_else(|| Error::MissingEnvelope {
            path: path.join("."),
        })
}

/// Walk `path` into a response and return whatever is there
pub fn locate<'v>(raw: &'v Value, path: &[String]) -> Result<&'v Value> {
    let mut node = raw;
    for key in path {
        node = node.get(key).ok_or_else(|| Error::MissingEnvelope {
            path: path.join("."),
        })?;
    }
    Ok(node)
}

/// Normalize a raw remote mapping into canonical state
///
/// Only declared fields are kept. A field missing from the response is
/// omitted rather than defaulted.
pub fn normalize(raw: &Map<String, Value>, schema: &ResourceSchema) -> Result<ActualState> {
    schema
        .fields()
        .iter()
        .filter_map(|spec| {
            raw.get(spec.remote_name())
                .or_else(|| raw.get(&spec.name))
                .map(|value| (spec, value))
        })
        .map(|(spec, value)| {
            cast(spec, value, schema.encoding())
                .map(|typed| (spec.name.clone(), typed))
                .map_err(|_| Error::Normalization {
                    field: spec.name.clone(),
                    value: value.to_string(),
                    expected: spec.kind,
                })
        })
        .collect()
}

/// Cast one JSON value into the field's declared type
///
/// Shared by remote normalization and desired-state parsing; the caller
/// decides which kind of error a failure becomes.
pub(crate) fn cast(
    spec: &FieldSpec,
    value: &Value,
    encoding: &Encoding,
) -> std::result::Result<FieldValue, String> {
    match spec.kind {
        FieldType::Bool => cast_bool(value, encoding),
        FieldType::Int => cast_int(value),
        FieldType::Str => cast_str(value, encoding),
        FieldType::List => cast_list(value, encoding),
    }
}

fn cast_bool(value: &Value, encoding: &Encoding) -> std::result::Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Bool(b) => Ok(FieldValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(FieldValue::Bool(true)),
            Some(0) => Ok(FieldValue::Bool(false)),
            _ => Err(format!("unexpected number {n}")),
        },
        Value::String(s) => {
            let text = s.trim();
            if text == encoding.bool_true {
                return Ok(FieldValue::Bool(true));
            }
            if text == encoding.bool_false {
                return Ok(FieldValue::Bool(false));
            }
            let lower = text.to_ascii_lowercase();
            if TRUTHY.contains(&lower.as_str()) {
                Ok(FieldValue::Bool(true))
            } else if FALSY.contains(&lower.as_str()) {
                Ok(FieldValue::Bool(false))
            } else {
                Err(format!("unrecognized boolean text '{s}'"))
            }
        }
        Value::Array(_) | Value::Object(_) => Err("expected a scalar".to_string()),
    }
}

fn cast_int(value: &Value) -> std::result::Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Number(n) => n
            .as_i64()
            .map(FieldValue::Int)
            .ok_or_else(|| format!("'{n}' is not a whole number")),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return Ok(FieldValue::Null);
            }
            text.parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| format!("'{s}' is not a decimal number"))
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            Err("expected a number".to_string())
        }
    }
}

fn cast_str(value: &Value, encoding: &Encoding) -> std::result::Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::String(s) => Ok(FieldValue::Str(s.clone())),
        Value::Number(n) => Ok(FieldValue::Str(n.to_string())),
        Value::Bool(b) => Ok(FieldValue::Str(b.to_string())),
        Value::Object(map) => {
            let selected = selected_options(map).ok_or("unexpected mapping")?;
            match selected.as_slice() {
                [] => Ok(FieldValue::Str(String::new())),
                [single] => Ok(FieldValue::Str(single.clone())),
                _ => Err(format!("{} options selected", selected.len())),
            }
        }
        Value::Array(items) => scalars(items).map(|parts| {
            FieldValue::Str(parts.join(encoding.list_delimiter.to_string().as_str()))
        }),
    }
}

fn cast_list(value: &Value, encoding: &Encoding) -> std::result::Result<FieldValue, String> {
    match value {
        Value::Null => Ok(FieldValue::List(Vec::new())),
        Value::String(s) => Ok(FieldValue::List(split_list(s, encoding.list_delimiter))),
        Value::Array(items) => scalars(items).map(FieldValue::List),
        Value::Object(map) => selected_options(map)
            .map(FieldValue::List)
            .ok_or_else(|| "unexpected mapping".to_string()),
        Value::Bool(_) | Value::Number(_) => Err("expected a list".to_string()),
    }
}

/// Split delimited text, dropping empty pieces
pub(crate) fn split_list(text: &str, delimiter: char) -> Vec<String> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

fn scalars(items: &[Value]) -> std::result::Result<Vec<String>, String> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err("list items must be strings".to_string()),
        })
        .collect()
}

/// Keys of an option map whose `selected` flag is set
///
/// Returns `None` when the mapping is not an option map.
fn selected_options(map: &Map<String, Value>) -> Option<Vec<String>> {
    let mut selected = Vec::new();
    for (key, option) in map {
        let flag = option.as_object()?.get("selected")?;
        let is_selected = match flag {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => s == "1",
            _ => false,
        };
        if is_selected {
            selected.push(key.clone());
        }
    }
    Some(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::builder("parent", "proxy", "settings")
            .field(FieldSpec::bool("enabled"))
            .field(FieldSpec::bool("auth").remote("enableauth"))
            .field(FieldSpec::str("host"))
            .field(FieldSpec::int("port"))
            .field(FieldSpec::list("local_domains").remote("localdomains"))
            .field(FieldSpec::list("local_ips").remote("localips"))
            .envelope(&["proxy", "general", "parentproxy"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_normalize_renames_and_casts() {
        let raw = json!({
            "enabled": "1",
            "enableauth": "0",
            "host": "203.0.113.5",
            "port": "8080",
            "localdomains": "a.example,b.example",
            "localips": "",
            "unrelated": "ignored"
        });
        let actual = normalize(raw.as_object().unwrap(), &schema()).unwrap();

        assert_eq!(actual.get("enabled"), Some(&FieldValue::Bool(true)));
        assert_eq!(actual.get("auth"), Some(&FieldValue::Bool(false)));
        assert_eq!(actual.get("host"), Some(&FieldValue::from("203.0.113.5")));
        assert_eq!(actual.get("port"), Some(&FieldValue::Int(8080)));
        assert_eq!(
            actual.get("local_domains"),
            Some(&FieldValue::from(&["a.example", "b.example"][..]))
        );
        assert_eq!(actual.get("local_ips"), Some(&FieldValue::List(vec![])));
        assert!(!actual.contains_key("unrelated"));
    }

    #[test]
    fn test_normalize_omits_absent_fields() {
        let raw = json!({"enabled": "0"});
        let actual = normalize(raw.as_object().unwrap(), &schema()).unwrap();
        assert_eq!(actual.len(), 1);
        assert!(!actual.contains_key("port"));
    }

    #[test]
    fn test_normalize_falls_back_to_canonical_name() {
        let raw = json!({"auth": "1"});
        let actual = normalize(raw.as_object().unwrap(), &schema()).unwrap();
        assert_eq!(actual.get("auth"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_malformed_integer_is_normalization_error() {
        let raw = json!({"port": "eighty"});
        let err = normalize(raw.as_object().unwrap(), &schema()).unwrap_err();
        match err {
            Error::Normalization {
                field, expected, ..
            } => {
                assert_eq!(field, "port");
                assert_eq!(expected, FieldType::Int);
            }
            other => panic!("expected normalization error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_integer_is_null() {
        let raw = json!({"port": ""});
        let actual = normalize(raw.as_object().unwrap(), &schema()).unwrap();
        assert_eq!(actual.get("port"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_unknown_boolean_text_is_error() {
        let raw = json!({"enabled": "maybe"});
        assert!(normalize(raw.as_object().unwrap(), &schema()).is_err());
    }

    #[test]
    fn test_custom_boolean_encoding() {
        let encoding = Encoding {
            bool_true: "Y".to_string(),
            bool_false: "N".to_string(),
            list_delimiter: ',',
        };
        let spec = FieldSpec::bool("flag");
        assert_eq!(
            cast(&spec, &json!("Y"), &encoding),
            Ok(FieldValue::Bool(true))
        );
        assert_eq!(
            cast(&spec, &json!("N"), &encoding),
            Ok(FieldValue::Bool(false))
        );
    }

    #[test]
    fn test_option_map_list() {
        let value = json!({
            "a.example": {"value": "a.example", "selected": 1},
            "b.example": {"value": "b.example", "selected": 0},
            "c.example": {"value": "c.example", "selected": "1"}
        });
        let typed = cast(&FieldSpec::list("x"), &value, &Encoding::default()).unwrap();
        assert_eq!(typed, FieldValue::from(&["a.example", "c.example"][..]));
    }

    #[test]
    fn test_option_map_string_single_selection() {
        let value = json!({
            "rsa": {"value": "RSA", "selected": 1},
            "ecdsa": {"value": "ECDSA", "selected": 0}
        });
        let typed = cast(&FieldSpec::str("type"), &value, &Encoding::default()).unwrap();
        assert_eq!(typed, FieldValue::from("rsa"));
    }

    #[test]
    fn test_plain_mapping_is_not_an_option_map() {
        let value = json!({"nested": "value"});
        assert!(cast(&FieldSpec::list("x"), &value, &Encoding::default()).is_err());
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" a , ,b,", ','), vec!["a", "b"]);
        assert!(split_list("", ',').is_empty());
    }

    #[test]
    fn test_unwrap_envelope() {
        let raw = json!({"proxy": {"general": {"parentproxy": {"host": "x"}}}});
        let path = vec![
            "proxy".to_string(),
            "general".to_string(),
            "parentproxy".to_string(),
        ];
        let inner = unwrap_envelope(&raw, &path).unwrap();
        assert_eq!(inner.get("host"), Some(&json!("x")));

        let missing = json!({"proxy": {}});
        let err = unwrap_envelope(&missing, &path).unwrap_err();
        assert!(matches!(err, Error::MissingEnvelope { path } if path == "proxy.general.parentproxy"));
    }
}
