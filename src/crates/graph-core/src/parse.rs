//! Parsing contract consumed by the executor to turn the output node's raw
//! result into the graph's declared output type `T` (spec.md §6).
//!
//! LLM-text JSON repair and schema-aware coercion are out of scope
//! (spec.md §1); the default implementation is a direct `serde_json`
//! deserialization, with an escape hatch for raw string output so nodes
//! that hand back a JSON-encoded string (the common LLM-text shape) still
//! parse without every caller pre-parsing it themselves.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// `ParseStringAs[T]` from spec.md §6: converts an output node's raw
/// [`serde_json::Value`] into `T`. When the value is already structurally
/// `T`, no parsing occurs beyond a direct deserialize.
pub trait OutputParser<T>: Send + Sync {
    fn parse(&self, raw: &Value) -> Result<T, serde_json::Error>;
}

/// Default parser: deserializes `raw` directly, except when `raw` is a JSON
/// string, in which case the string's contents are parsed as JSON first —
/// this is the common shape of an LLM node that returns its answer as
/// `Output = Value::String(json_text)`.
pub struct JsonOutputParser<T>(PhantomData<fn() -> T>);

impl<T> Default for JsonOutputParser<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: DeserializeOwned> OutputParser<T> for JsonOutputParser<T> {
    fn parse(&self, raw: &Value) -> Result<T, serde_json::Error> {
        if let Value::String(text) = raw {
            if let Ok(parsed) = serde_json::from_str::<T>(text) {
                return Ok(parsed);
            }
        }
        serde_json::from_value(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_plain_value() {
        let parser = JsonOutputParser::<String>::default();
        let parsed = parser.parse(&Value::String("hello world".into())).unwrap();
        assert_eq!(parsed, "hello world");
    }

    #[test]
    fn falls_back_to_parsing_a_json_encoded_string() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Out {
            quality: f64,
        }
        let parser = JsonOutputParser::<Out>::default();
        let raw = Value::String(r#"{"quality": 0.9}"#.to_string());
        assert_eq!(parser.parse(&raw).unwrap(), Out { quality: 0.9 });
    }
}
