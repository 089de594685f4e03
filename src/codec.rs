//! Conversion between on-disk JSON documents and [`ConfigMap`]s.
//!
//! Documents are flat JSON objects whose values are strings, integers, floats
//! or booleans. Anything else (arrays, nested objects, null) is rejected here,
//! which makes this the only place type coercion failures originate.

use crate::error::{ConfigError, ConfigResult};
use crate::value::{ConfigMap, ValueCell};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::path::Path;

/// Decodes document text read from `path`.
pub fn decode_document(path: &Path, text: &str) -> ConfigResult<ConfigMap> {
    let malformed = |reason: String| ConfigError::MalformedDocument {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(malformed(format!(
                "top level must be an object, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut config = ConfigMap::new();
    for (key, value) in object {
        let cell = match value {
            Value::String(s) => ValueCell::Str(s),
            Value::Bool(b) => ValueCell::Bool(b),
            Value::Number(n) => number_to_cell(&n)
                .ok_or_else(|| malformed(format!("integer value of '{}' is out of range", key)))?,
            other => {
                return Err(malformed(format!(
                    "value of '{}' must be a string, integer, float or boolean, found {}",
                    key,
                    json_kind(&other)
                )))
            }
        };
        config.insert(key, cell);
    }
    Ok(config)
}

/// Encodes a document as pretty-printed JSON with 4-space indentation.
pub fn encode_document(config: &ConfigMap) -> Result<String, serde_json::Error> {
    let object: Map<String, Value> = config
        .iter()
        .map(|(key, cell)| (key.clone(), cell_to_json(cell)))
        .collect();

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    Value::Object(object).serialize(&mut serializer)?;
    buf.push(b'\n');
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Reads and decodes the document at `path`.
pub fn read_document(path: &Path) -> ConfigResult<ConfigMap> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(ConfigError::io(path, e)),
    };
    let text = String::from_utf8(bytes).map_err(|e| ConfigError::MalformedDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    decode_document(path, &text)
}

/// Encodes `config` and writes it to `path`, creating parent directories.
pub fn write_document(path: &Path, config: &ConfigMap) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
    }
    let content =
        encode_document(config).map_err(|e| ConfigError::io(path, std::io::Error::other(e)))?;
    std::fs::write(path, content).map_err(|e| ConfigError::io(path, e))
}

fn cell_to_json(cell: &ValueCell) -> Value {
    match cell {
        ValueCell::Str(v) => Value::String(v.clone()),
        ValueCell::Int(v) => Value::Number(Number::from(*v)),
        ValueCell::Float(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        ValueCell::Bool(v) => Value::Bool(*v),
    }
}

fn number_to_cell(n: &Number) -> Option<ValueCell> {
    if let Some(i) = n.as_i64() {
        Some(ValueCell::Int(i))
    } else if n.is_u64() {
        None
    } else {
        n.as_f64().map(ValueCell::Float)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
