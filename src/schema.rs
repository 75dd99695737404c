//! Structured-output schema derivation and decoding.
//!
//! The typed path (`SchemaFor<T>`) leans on `schemars`, the crate the wider
//! pack (`qntx-machi`) already uses for deriving JSON Schema from Rust
//! types. The dynamic path reuses `tools::convert_schema_to_openai`-style
//! normalization for callers building a schema from a `serde_json::Value`
//! at runtime rather than from a type.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Maximum nesting depth accepted when validating a caller-supplied schema.
/// Guards against accidental or adversarial recursive `$ref` cycles.
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// A type that can describe its own structured-output schema and decode a
/// JSON value produced against it.
pub trait SchemaFor: DeserializeOwned + JsonSchema {
    /// The JSON Schema sent to the model in `response_format`.
    ///
    /// Rejects at schema-build time, rather than silently accepting, a
    /// derived schema whose `$ref` nesting exceeds [`MAX_SCHEMA_DEPTH`].
    fn json_schema() -> Result<Value> {
        let schema = schemars::schema_for!(Self);
        let value = serde_json::to_value(schema).expect("schemars schema always serializes");
        validate_schema_depth(&value)?;
        Ok(value)
    }

    /// Decode a complete JSON document into `Self`.
    fn decode(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(Error::from)
    }
}

impl<T: DeserializeOwned + JsonSchema> SchemaFor for T {}

/// Depth-check a caller-supplied schema before sending it to a provider.
/// Schemas deeper than [`MAX_SCHEMA_DEPTH`] are rejected as a
/// `Configuration` error rather than risking a pathological `$ref` cycle.
pub fn validate_schema_depth(schema: &Value) -> Result<()> {
    fn depth(value: &Value, current: usize, limit: usize) -> Result<usize> {
        if current > limit {
            return Err(Error::configuration(format!(
                "schema nesting exceeds the maximum depth of {limit}"
            )));
        }
        let max_child = match value {
            Value::Object(map) => {
                let mut max = current;
                for v in map.values() {
                    max = max.max(depth(v, current + 1, limit)?);
                }
                max
            }
            Value::Array(items) => {
                let mut max = current;
                for v in items {
                    max = max.max(depth(v, current + 1, limit)?);
                }
                max
            }
            _ => current,
        };
        Ok(max_child)
    }
    depth(schema, 0, MAX_SCHEMA_DEPTH)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct Weather {
        city: String,
        temperature_c: f64,
    }

    #[test]
    fn test_json_schema_has_expected_shape() {
        let schema = Weather::json_schema().unwrap();
        assert!(schema["properties"]["city"].is_object());
        assert!(schema["properties"]["temperature_c"].is_object());
    }

    #[test]
    fn test_decode_roundtrip() {
        let value = serde_json::json!({ "city": "Lyon", "temperature_c": 18.5 });
        let parsed: Weather = Weather::decode(&value).unwrap();
        assert_eq!(parsed, Weather { city: "Lyon".to_string(), temperature_c: 18.5 });
    }

    #[test]
    fn test_decode_rejects_mismatched_shape() {
        let value = serde_json::json!({ "city": "Lyon" });
        assert!(Weather::decode(&value).is_err());
    }

    #[test]
    fn test_validate_schema_depth_accepts_shallow() {
        let schema = serde_json::json!({"type": "object", "properties": {"a": {"type": "string"}}});
        assert!(validate_schema_depth(&schema).is_ok());
    }

    #[test]
    fn test_validate_schema_depth_rejects_deep_nesting() {
        let mut value = serde_json::json!("leaf");
        for _ in 0..(MAX_SCHEMA_DEPTH + 5) {
            value = serde_json::json!({ "nested": value });
        }
        assert!(validate_schema_depth(&value).is_err());
    }
}
