//! Mock lookup orchestration: match, synthesize, and shape failures.
//!
//! The lookup runs behind a recovery boundary. A match error or a panic
//! becomes a synthesized 500 with a structured error body; the pipeline
//! keeps serving.

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

use super::store::MockStore;
use super::types::MockResponse;
use crate::proxy::context::{CapturedRequest, CapturedResponse};

/// Structured body of a synthesized error response.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerError {
    pub message: String,
    pub code: u16,
    #[serde(rename = "type")]
    pub error_type: String,
    pub detail: String,
    pub cause: String,
}

/// Result of a mock lookup for an in-flight request.
pub enum MockOutcome {
    /// A definition matched (or the lookup failed); the pipeline returns
    /// this response and skips forwarding and response validation.
    Mocked(CapturedResponse),
    /// No definition matched; the pipeline forwards upstream.
    Passthrough,
}

/// Evaluate the store against the request. Never panics outward.
pub fn handle_mock_request(store: &MockStore, incoming: &CapturedRequest) -> MockOutcome {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| lookup(store, incoming)));
    match attempt {
        Ok(Ok(None)) => MockOutcome::Passthrough,
        Ok(Ok(Some(response))) => {
            debug!(
                id = %incoming.id,
                status = response.status.as_u16(),
                "request satisfied by static mock"
            );
            MockOutcome::Mocked(response)
        }
        Ok(Err(match_error)) => {
            error!(id = %incoming.id, "mock match failed: {}", match_error);
            MockOutcome::Mocked(internal_error_response(
                match_error.to_string(),
                format!("{match_error:?}"),
            ))
        }
        Err(payload) => {
            let message = panic_text(payload.as_ref());
            error!(id = %incoming.id, "recovered from panic in mock handler: {}", message);
            MockOutcome::Mocked(internal_error_response(message.clone(), message))
        }
    }
}

fn lookup(
    store: &MockStore,
    incoming: &CapturedRequest,
) -> Result<Option<CapturedResponse>, super::matcher::MatchError> {
    Ok(store
        .first_match(incoming)?
        .map(|definition| synthesize_response(&definition.response)))
}

/// Build a response from a mock template. Structured bodies are serialized
/// as JSON with `Content-Type: application/json` defaulted; string bodies
/// pass through as raw bytes.
pub fn synthesize_response(template: &MockResponse) -> CapturedResponse {
    // The store validated the status range at load time.
    let status =
        StatusCode::from_u16(template.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut headers = HeaderMap::new();
    if let Some(template_headers) = &template.headers {
        for (name, value) in template_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("skipping invalid mock response header '{}'", name),
            }
        }
    }

    let body = match &template.body {
        None => Bytes::new(),
        Some(Value::String(text)) => Bytes::from(text.clone()),
        Some(structured) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Bytes::from(serde_json::to_vec(structured).unwrap_or_default())
        }
    };

    CapturedResponse::new(status, headers, body)
}

/// 500 response carrying the structured error object.
pub fn internal_error_response(message: String, cause: String) -> CapturedResponse {
    let error = HandlerError {
        message,
        code: 500,
        error_type: "Internal server error".to_string(),
        detail: String::new(),
        cause,
    };
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    CapturedResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        headers,
        Bytes::from(serde_json::to_vec(&error).unwrap_or_default()),
    )
}

fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "error in static mock handler".to_string()
    }
}
