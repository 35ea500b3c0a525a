//! `Set-Cookie` header parsing for the compat cookie assertions.

use crate::response::ResponseData;

/// A cookie parsed from a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Trailing attributes (`Path=/`, `HttpOnly`, ...), lowercased names.
    pub attributes: Vec<(String, Option<String>)>,
}

/// Parse a single `Set-Cookie` header value.
///
/// Returns `None` when the header has no `name=value` leading pair.
/// Attribute names are lowercased; flag attributes carry `None`.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let mut parts = header.split(';');

    let pair = parts.next()?.trim();
    let eq = pair.find('=')?;
    let name = pair[..eq].trim();
    if name.is_empty() {
        return None;
    }
    let value = pair[eq + 1..].trim();

    let attributes = parts
        .map(|attr| {
            let attr = attr.trim();
            match attr.find('=') {
                Some(i) => (
                    attr[..i].trim().to_ascii_lowercase(),
                    Some(attr[i + 1..].trim().to_string()),
                ),
                None => (attr.to_ascii_lowercase(), None),
            }
        })
        .filter(|(name, _)| !name.is_empty())
        .collect();

    Some(Cookie {
        name: name.to_string(),
        value: value.to_string(),
        attributes,
    })
}

/// Collect every cookie a response sets, in header order.
pub fn cookies_from_headers(response: &ResponseData) -> Vec<Cookie> {
    response
        .header_values("Set-Cookie")
        .filter_map(parse_set_cookie)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::KeyValuePair;

    #[test]
    fn parses_name_value_and_attributes() {
        let cookie = parse_set_cookie("session=abc123; Path=/; HttpOnly; Max-Age=3600").unwrap();
        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(
            cookie.attributes,
            vec![
                ("path".into(), Some("/".into())),
                ("httponly".into(), None),
                ("max-age".into(), Some("3600".into())),
            ]
        );
    }

    #[test]
    fn value_may_contain_equals() {
        let cookie = parse_set_cookie("token=a=b=c").unwrap();
        assert_eq!(cookie.value, "a=b=c");
    }

    #[test]
    fn rejects_headers_without_a_pair() {
        assert!(parse_set_cookie("").is_none());
        assert!(parse_set_cookie("no-equals-here").is_none());
        assert!(parse_set_cookie("=value-only").is_none());
    }

    #[test]
    fn collects_from_response_in_order() {
        let resp = ResponseData {
            status: 200,
            headers: vec![
                KeyValuePair::new("Set-Cookie", "a=1"),
                KeyValuePair::new("Content-Type", "text/html"),
                KeyValuePair::new("set-cookie", "b=2; Secure"),
            ],
            ..Default::default()
        };
        let cookies = cookies_from_headers(&resp);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "a");
        assert_eq!(cookies[1].name, "b");
        assert_eq!(cookies[1].attributes, vec![("secure".into(), None)]);
    }
}
