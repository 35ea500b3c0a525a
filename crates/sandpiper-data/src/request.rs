//! The request object exposed to pre-request scripts.

use serde::{Deserialize, Serialize};

/// An ordered key/value entry (headers, query params).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    /// Entry name.
    pub key: String,
    /// Entry value.
    pub value: String,
}

impl KeyValuePair {
    /// Construct a pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The mutable request a pre-request script can inspect and rewrite.
///
/// Reduced to the fields scripts actually touch. `body` and `auth` are
/// kept as raw JSON so the engine never has to understand every content
/// type or auth scheme a caller might use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    /// Full request URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Query parameters, in order.
    pub params: Vec<KeyValuePair>,
    /// Request headers, in order.
    pub headers: Vec<KeyValuePair>,
    /// Request body, caller-defined shape.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Auth configuration, caller-defined shape.
    #[serde(default)]
    pub auth: serde_json::Value,
}

impl RequestData {
    /// First header value matching `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}
