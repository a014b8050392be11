//! # Keyword Overrides
//!
//! Helpers for overlaying a JSON object of keyword overrides onto the
//! serialized defaults of a [`burn::config::Config`], rejecting any key
//! which is not part of the declared option set.

use crate::error::{ResNetV1bError, Result};
use serde_json::{Map, Value};

/// Coerce `kwargs` to a JSON object.
///
/// `null` is treated as an empty object.
pub fn expect_object(kwargs: Value) -> Result<Map<String, Value>> {
    match kwargs {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(<serde_json::Error as serde::de::Error>::custom(format!(
            "expected a keyword object, found {other}"
        ))
        .into()),
    }
}

/// Overlay `kwargs` onto `defaults`.
///
/// # Arguments
///
/// - `scope`: a label for error reporting.
/// - `allowed`: the recognized keys.
/// - `defaults`: the serialized default config; must be an object.
/// - `kwargs`: the overrides.
///
/// # Returns
///
/// The merged object, or [`ResNetV1bError::UnknownOption`] on the first
/// unrecognized key.
pub fn overlay_kwargs(
    scope: &'static str,
    allowed: &[&str],
    defaults: Value,
    kwargs: Map<String, Value>,
) -> Result<Value> {
    let mut merged = expect_object(defaults)?;
    for (key, value) in kwargs {
        if !allowed.contains(&key.as_str()) {
            return Err(ResNetV1bError::UnknownOption { scope, key });
        }
        merged.insert(key, value);
    }
    Ok(Value::Object(merged))
}
