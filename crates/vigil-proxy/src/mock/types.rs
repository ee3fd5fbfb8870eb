//! Mock definition types.
//!
//! A definition pairs a request selector with a response template. Selector
//! fields are all optional except the method; an absent field matches any
//! value of that dimension.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single static mock: when the selector matches an incoming request, the
/// response template is synthesized locally and the upstream is never called.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockDefinition {
    pub request: MockRequest,
    pub response: MockResponse,
}

/// Request selector. Header and query values may be a single string or an
/// array of strings; bodies may be a string (byte-exact match) or a JSON
/// object/array (subset match).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRequest {
    /// Hostname, compared case-insensitively. Empty or absent matches any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// HTTP verb. Canonicalized to uppercase at load time.
    pub method: String,
    /// Exact path, compared case-insensitively. Empty or absent matches any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Response template for a matched definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockResponse {
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

fn default_status_code() -> u16 {
    200
}
