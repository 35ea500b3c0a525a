//! The response object exposed to post-request scripts.

use serde::{Deserialize, Serialize};

use crate::request::KeyValuePair;

/// The completed HTTP exchange a post-request script asserts against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// HTTP status code.
    pub status: u16,
    /// Status reason phrase ("OK", "Not Found").
    #[serde(default)]
    pub status_text: String,
    /// Response headers, in order.
    pub headers: Vec<KeyValuePair>,
    /// Response body as text. Binary bodies arrive lossily decoded; the
    /// byte view scripts see is derived from this text.
    pub body: String,
    /// Wall-clock time of the exchange in milliseconds.
    #[serde(default)]
    pub response_time_ms: u64,
}

impl ResponseData {
    /// All header values matching `name`, case-insensitive, in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_repeated_headers() {
        let resp = ResponseData {
            status: 200,
            headers: vec![
                KeyValuePair::new("Set-Cookie", "a=1"),
                KeyValuePair::new("set-cookie", "b=2"),
                KeyValuePair::new("Content-Type", "text/plain"),
            ],
            ..Default::default()
        };
        let cookies: Vec<_> = resp.header_values("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }
}
