//! Projection of typed action parameters to and from a [`ParameterBag`].
//!
//! Parameter types are plain serde structs. Each field is stored under its
//! serialized name with a textual value; reading back coerces that text into
//! the kind of value the field holds in `P::default()`.

use crate::{Error, ParameterBag, PermissionRecord, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::Deref;

/// Flatten a typed parameter object into a parameter bag.
///
/// Strings are stored verbatim, numbers and booleans by their textual form,
/// arrays and nested objects as compact JSON.
pub fn project<P: Serialize>(params: &P) -> Result<ParameterBag> {
    let fields = match to_json(params)? {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::InvalidParameters(format!(
                "expected a struct or map, got {}",
                kind_name(&other)
            )));
        }
    };

    fields
        .into_iter()
        .map(|(field, value)| {
            let text = match value {
                Value::Null => return Err(Error::NullField { field }),
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                nested => nested.to_string(),
            };
            Ok((field, text))
        })
        .collect()
}

/// Build a `P` from a parameter bag.
///
/// Keys that are not fields of `P` are ignored; fields with no stored value
/// keep their default. A stored value the field cannot hold fails with
/// [`Error::ParameterTypeMismatch`].
pub fn materialize<P>(bag: &ParameterBag) -> Result<P>
where
    P: Serialize + DeserializeOwned + Default,
{
    let defaults = match to_json(&P::default())? {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::InvalidParameters(format!(
                "expected a struct or map, got {}",
                kind_name(&other)
            )));
        }
    };

    let mut fields = defaults.clone();
    for (field, text) in bag {
        let Some(template) = defaults.get(field) else {
            continue;
        };
        let value = candidates(field, text, template)?
            .into_iter()
            .find(|candidate| fits::<P>(&defaults, field, candidate))
            .ok_or_else(|| Error::ParameterTypeMismatch {
                field: field.clone(),
                value: text.clone(),
                expected: expected_kind(template),
            })?;
        fields.insert(field.clone(), value);
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| Error::InvalidParameters(e.to_string()))
}

/// Values the stored text may stand for, most literal first.
///
/// Optional fields default to null, so their kind is unknown: the text is
/// tried verbatim, then as JSON (`5`, `true`, `["a"]`).
fn candidates(field: &str, text: &str, template: &Value) -> Result<Vec<Value>> {
    if template.is_null() {
        let mut values = vec![Value::String(text.to_string())];
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            values.push(parsed);
        }
        return Ok(values);
    }
    Ok(vec![coerce(field, text, template)?])
}

/// Whether `P` accepts `value` for `field` with every other field at its default.
fn fits<P: DeserializeOwned>(defaults: &Map<String, Value>, field: &str, value: &Value) -> bool {
    let mut trial = defaults.clone();
    trial.insert(field.to_string(), value.clone());
    serde_json::from_value::<P>(Value::Object(trial)).is_ok()
}

fn to_json<P: Serialize>(params: &P) -> Result<Value> {
    serde_json::to_value(params).map_err(|e| Error::InvalidParameters(e.to_string()))
}

/// Convert stored text into the same JSON kind as `template`.
fn coerce(field: &str, text: &str, template: &Value) -> Result<Value> {
    let mismatch = || Error::ParameterTypeMismatch {
        field: field.to_string(),
        value: text.to_string(),
        expected: expected_kind(template),
    };

    match template {
        Value::Null | Value::String(_) => Ok(Value::String(text.to_string())),
        Value::Bool(_) => text.parse::<bool>().map(Value::Bool).map_err(|_| mismatch()),
        Value::Number(_) => {
            let parsed: Option<Value> = if let Ok(n) = text.parse::<i64>() {
                Some(n.into())
            } else if let Ok(n) = text.parse::<u64>() {
                Some(n.into())
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            };
            parsed.ok_or_else(mismatch)
        }
        Value::Array(_) => match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Array(_)) => Ok(value),
            _ => Err(mismatch()),
        },
        Value::Object(_) => match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => Ok(value),
            _ => Err(mismatch()),
        },
    }
}

fn expected_kind(template: &Value) -> &'static str {
    match template {
        Value::Null => "optional value",
        other => kind_name(other),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A permission record together with its parameters as a typed value.
///
/// Derefs to the underlying [`PermissionRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedPermission<P> {
    pub record: PermissionRecord,
    pub parameters: P,
}

impl<P> TypedPermission<P>
where
    P: Serialize + DeserializeOwned + Default,
{
    pub fn from_record(record: PermissionRecord) -> Result<Self> {
        let parameters = materialize(&record.parameters)?;
        Ok(Self { record, parameters })
    }
}

impl<P> Deref for TypedPermission<P> {
    type Target = PermissionRecord;

    fn deref(&self) -> &PermissionRecord {
        &self.record
    }
}
