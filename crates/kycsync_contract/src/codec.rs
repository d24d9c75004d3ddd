use rmp_serde::encode::Error as EncodeError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize value to JSON: {0}")]
    JsonSerialize(#[source] serde_json::Error),
    #[error("failed to parse stored JSON: {0}")]
    JsonDeserialize(#[source] serde_json::Error),
    #[error("failed to encode submission as messagepack: {0}")]
    MessagePackEncode(#[source] EncodeError),
}

/// Stable JSON text for persisted collections: object keys are sorted at every level.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_value(value).map_err(CodecError::JsonSerialize)?;
    serde_json::to_string(&sort_keys(json)).map_err(CodecError::JsonSerialize)
}

pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    serde_json::from_str(raw).map_err(CodecError::JsonDeserialize)
}

/// Wire form handed to delivery backends.
pub fn encode_submission<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_value(value).map_err(CodecError::JsonSerialize)?;
    rmp_serde::to_vec_named(&sort_keys(json)).map_err(CodecError::MessagePackEncode)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut fields: Vec<(String, Value)> = obj.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, item) in fields {
                sorted.insert(key, sort_keys(item));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        primitive => primitive,
    }
}
