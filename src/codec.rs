//! Conversion between the store's generic JSON objects and the typed model
//!
//! The store speaks schema-less JSON (`serde_json::Value`); routing logic only
//! ever sees [`HttpProxy`]. This module is the single boundary between them.

use crate::error::{Result, RouterError};
use crate::model::HttpProxy;
use serde::Deserialize;
use serde_json::Value;

/// Decode a generic object into an [`HttpProxy`]
pub fn decode(object: &Value) -> Result<HttpProxy> {
    if !object.is_object() {
        return Err(RouterError::Decode(format!(
            "HTTPProxy must be a JSON object, got {}",
            json_type(object)
        )));
    }
    HttpProxy::deserialize(object)
        .map_err(|e| RouterError::Decode(format!("HTTPProxy does not match schema: {}", e)))
}

/// Encode an [`HttpProxy`] back into a generic object
pub fn encode(proxy: &HttpProxy) -> Result<Value> {
    Ok(serde_json::to_value(proxy)?)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
