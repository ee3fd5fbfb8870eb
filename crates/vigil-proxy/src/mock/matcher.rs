//! Selector evaluation for static mock definitions.
//!
//! Every present selector must hold; absent selectors match any value.

use hyper::header::CONTENT_TYPE;
use serde_json::Value;
use std::fmt;

use super::subset::{is_subset, string_compare};
use super::types::MockRequest;
use crate::proxy::context::CapturedRequest;

/// Errors raised while evaluating a selector. These are not misses: the
/// handler turns them into a synthesized 500 instead of forwarding.
#[derive(Debug)]
pub enum MatchError {
    /// A definition carries a JSON body selector and the incoming request
    /// claimed `application/json` but did not parse.
    InvalidJson(serde_json::Error),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::InvalidJson(source) => {
                write!(f, "error decoding JSON of incoming request: {source}")
            }
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MatchError::InvalidJson(source) => Some(source),
        }
    }
}

/// Returns true iff every present selector of `mock` holds for `incoming`.
pub fn request_matches(
    mock: &MockRequest,
    incoming: &CapturedRequest,
) -> Result<bool, MatchError> {
    if let Some(host) = mock.host.as_deref() {
        if !host.is_empty() && !string_compare(host, incoming.host()) {
            return Ok(false);
        }
    }

    if incoming.method.as_str() != mock.method {
        return Ok(false);
    }

    if let Some(path) = mock.url_path.as_deref() {
        if !path.is_empty() && !string_compare(path, incoming.uri.path()) {
            return Ok(false);
        }
    }

    if let Some(header) = &mock.header {
        for (name, selector) in header {
            if !values_match(selector, &incoming.header_values(name)) {
                return Ok(false);
            }
        }
    }

    if let Some(query) = &mock.query_params {
        let params = incoming.query_params();
        for (name, selector) in query {
            let observed = params.get(name).cloned().unwrap_or_default();
            if !values_match(selector, &observed) {
                return Ok(false);
            }
        }
    }

    if let Some(body) = &mock.body {
        if !body_matches(body, incoming)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Header/query selector: a string means "this value must be among the
/// observed values", an array means every listed value must be observed.
/// Any other selector type never matches.
fn values_match(selector: &Value, observed: &[String]) -> bool {
    let observed = Value::Array(
        observed
            .iter()
            .map(|v| Value::String(v.clone()))
            .collect(),
    );
    match selector {
        Value::String(single) => is_subset(
            &Value::Array(vec![Value::String(single.clone())]),
            &observed,
        ),
        Value::Array(_) => is_subset(selector, &observed),
        _ => false,
    }
}

fn body_matches(selector: &Value, incoming: &CapturedRequest) -> Result<bool, MatchError> {
    match selector {
        Value::String(expected) => Ok(expected.as_bytes() == incoming.body.as_ref()),
        Value::Object(_) | Value::Array(_) => {
            let content_type = incoming
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if content_type != "application/json" {
                return Ok(false);
            }
            if incoming.body.is_empty() {
                return Ok(false);
            }
            let parsed: Value =
                serde_json::from_slice(&incoming.body).map_err(MatchError::InvalidJson)?;
            Ok(is_subset(selector, &parsed))
        }
        // Numbers, booleans and null are not supported body selectors; the
        // definition is inert.
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method};
    use serde_json::json;

    fn mock(method: &str) -> MockRequest {
        MockRequest {
            host: None,
            method: method.to_string(),
            url_path: None,
            header: None,
            query_params: None,
            body: None,
        }
    }

    fn incoming(method: Method, uri: &str, headers: &[(&str, &str)], body: &[u8]) -> CapturedRequest {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.append(
                hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        CapturedRequest::from_parts(
            method,
            uri.parse().unwrap(),
            header_map,
            Bytes::copy_from_slice(body),
        )
    }

    #[test]
    fn test_method_must_match_exactly() {
        let m = mock("POST");
        let hit = incoming(Method::POST, "/a", &[], b"");
        let miss = incoming(Method::GET, "/a", &[], b"");
        assert!(request_matches(&m, &hit).unwrap());
        assert!(!request_matches(&m, &miss).unwrap());
    }

    #[test]
    fn test_path_is_case_insensitive() {
        let mut m = mock("GET");
        m.url_path = Some("/API/Pets".to_string());
        let req = incoming(Method::GET, "/api/pets", &[], b"");
        assert!(request_matches(&m, &req).unwrap());
    }

    #[test]
    fn test_host_selector() {
        let mut m = mock("GET");
        m.host = Some("API.example.com".to_string());
        let hit = incoming(Method::GET, "/a", &[("host", "api.example.com")], b"");
        let miss = incoming(Method::GET, "/a", &[("host", "other.example.com")], b"");
        assert!(request_matches(&m, &hit).unwrap());
        assert!(!request_matches(&m, &miss).unwrap());
    }

    #[test]
    fn test_empty_host_selector_matches_any() {
        let mut m = mock("GET");
        m.host = Some(String::new());
        let req = incoming(Method::GET, "/a", &[("host", "whatever")], b"");
        assert!(request_matches(&m, &req).unwrap());
    }

    #[test]
    fn test_header_string_selector_is_membership() {
        let mut m = mock("GET");
        m.header = Some(
            [("Accept".to_string(), json!("application/json"))]
                .into_iter()
                .collect(),
        );
        let hit = incoming(
            Method::GET,
            "/a",
            &[("accept", "text/html"), ("accept", "application/json")],
            b"",
        );
        let miss = incoming(Method::GET, "/a", &[("accept", "text/html")], b"");
        assert!(request_matches(&m, &hit).unwrap());
        assert!(!request_matches(&m, &miss).unwrap());
    }

    #[test]
    fn test_header_array_selector() {
        let mut m = mock("GET");
        m.header = Some(
            [("Accept".to_string(), json!(["application/json"]))]
                .into_iter()
                .collect(),
        );
        let hit = incoming(
            Method::GET,
            "/a",
            &[("accept", "text/html"), ("accept", "application/json")],
            b"",
        );
        assert!(request_matches(&m, &hit).unwrap());
    }

    #[test]
    fn test_header_unsupported_selector_type_never_matches() {
        let mut m = mock("GET");
        m.header = Some([("X-Count".to_string(), json!(3))].into_iter().collect());
        let req = incoming(Method::GET, "/a", &[("x-count", "3")], b"");
        assert!(!request_matches(&m, &req).unwrap());
    }

    #[test]
    fn test_query_selector() {
        let mut m = mock("GET");
        m.query_params = Some([("tag".to_string(), json!(["a", "b"]))].into_iter().collect());
        let hit = incoming(Method::GET, "/a?tag=b&tag=a&page=1", &[], b"");
        let miss = incoming(Method::GET, "/a?tag=a", &[], b"");
        assert!(request_matches(&m, &hit).unwrap());
        assert!(!request_matches(&m, &miss).unwrap());
    }

    #[test]
    fn test_string_body_requires_byte_equality() {
        let mut m = mock("POST");
        m.body = Some(json!("exact payload"));
        let hit = incoming(Method::POST, "/a", &[], b"exact payload");
        let miss = incoming(Method::POST, "/a", &[], b"exact payload!");
        assert!(request_matches(&m, &hit).unwrap());
        assert!(!request_matches(&m, &miss).unwrap());
    }

    #[test]
    fn test_json_body_subset_match() {
        let mut m = mock("POST");
        m.body = Some(json!({"x": 1}));
        let hit = incoming(
            Method::POST,
            "/a",
            &[("content-type", "application/json")],
            br#"{"x":1,"y":2}"#,
        );
        assert!(request_matches(&m, &hit).unwrap());
    }

    #[test]
    fn test_json_body_requires_json_content_type() {
        let mut m = mock("POST");
        m.body = Some(json!({"x": 1}));
        let miss = incoming(
            Method::POST,
            "/a",
            &[("content-type", "text/plain")],
            br#"{"x":1}"#,
        );
        assert!(!request_matches(&m, &miss).unwrap());

        // Parameterized content types are compared exactly and therefore miss.
        let charset = incoming(
            Method::POST,
            "/a",
            &[("content-type", "application/json; charset=utf-8")],
            br#"{"x":1}"#,
        );
        assert!(!request_matches(&m, &charset).unwrap());
    }

    #[test]
    fn test_json_body_empty_request_body_is_a_miss() {
        let mut m = mock("POST");
        m.body = Some(json!({"x": 1}));
        let req = incoming(
            Method::POST,
            "/a",
            &[("content-type", "application/json")],
            b"",
        );
        assert!(!request_matches(&m, &req).unwrap());
    }

    #[test]
    fn test_json_body_malformed_is_an_error() {
        let mut m = mock("POST");
        m.body = Some(json!({"x": 1}));
        let req = incoming(
            Method::POST,
            "/a",
            &[("content-type", "application/json")],
            b"{not json",
        );
        assert!(matches!(
            request_matches(&m, &req),
            Err(MatchError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_unsupported_body_selector_is_inert() {
        let mut m = mock("POST");
        m.body = Some(json!(42));
        let req = incoming(
            Method::POST,
            "/a",
            &[("content-type", "application/json")],
            b"42",
        );
        assert!(!request_matches(&m, &req).unwrap());
    }

    #[test]
    fn test_removing_selectors_preserves_match() {
        // Monotonicity: dropping a selector never turns a hit into a miss.
        let mut m = mock("POST");
        m.url_path = Some("/a".to_string());
        m.header = Some(
            [("Accept".to_string(), json!("application/json"))]
                .into_iter()
                .collect(),
        );
        let req = incoming(
            Method::POST,
            "/a",
            &[("accept", "application/json")],
            b"",
        );
        assert!(request_matches(&m, &req).unwrap());

        m.header = None;
        assert!(request_matches(&m, &req).unwrap());
        m.url_path = None;
        assert!(request_matches(&m, &req).unwrap());
    }
}
