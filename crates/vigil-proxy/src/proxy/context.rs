//! Buffered request/response types carried through the pipeline.
//!
//! Incoming bodies are collected once at pipeline entry so the mock matcher,
//! the rewriter, and the validator can all read them without consuming a
//! streaming body out from under each other.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use std::collections::HashMap;
use uuid::Uuid;

use crate::transaction::{RequestRecord, ResponseRecord};

/// A fully buffered incoming request plus its transaction identity.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub received_at: DateTime<Utc>,
}

impl CapturedRequest {
    /// Collect the body and freeze the request for the rest of the pipeline.
    pub async fn capture(req: Request<Incoming>) -> Result<Self, hyper::Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            received_at: Utc::now(),
        })
    }

    /// Build a captured request from parts, used by tests and by callers that
    /// already hold a buffered body.
    pub fn from_parts(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    /// Host as presented by the client: the `Host` header, falling back to
    /// the URI authority for absolute-form requests.
    pub fn host(&self) -> &str {
        self.headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// All values of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Parsed multi-valued query parameters.
    pub fn query_params(&self) -> HashMap<String, Vec<String>> {
        parse_query_multimap(self.uri.query())
    }

    pub fn record(&self) -> RequestRecord {
        RequestRecord {
            method: self.method.to_string(),
            url: self.uri.to_string(),
            host: self.host().to_string(),
            headers: header_multimap(&self.headers),
            body: body_text(&self.body),
        }
    }
}

/// A fully buffered response, either synthesized from a mock or collected
/// from the upstream.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Collect a response body and freeze the message.
    pub async fn capture<B>(resp: Response<B>) -> Result<Self, B::Error>
    where
        B: hyper::body::Body<Data = Bytes>,
    {
        let (parts, body) = resp.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(Self::new(parts.status, parts.headers, body))
    }

    pub fn record(&self, mocked: bool) -> ResponseRecord {
        ResponseRecord {
            status: self.status.as_u16(),
            headers: header_multimap(&self.headers),
            body: body_text(&self.body),
            mocked,
        }
    }

    /// Rebuild a hyper response for delivery to the client.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Snapshot of a rewritten outbound request, recorded on the transaction
/// before dispatch.
pub fn record_outbound(request: &Request<Full<Bytes>>, body: &Bytes) -> RequestRecord {
    RequestRecord {
        method: request.method().to_string(),
        url: request.uri().to_string(),
        host: request
            .uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default(),
        headers: header_multimap(request.headers()),
        body: body_text(body),
    }
}

/// Parse a query string into a map of parameter name to ordered values.
/// Values are percent-decoded; a bare key yields one empty value.
pub fn parse_query_multimap(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params
                    .entry(key.to_string())
                    .or_default()
                    .push(urlencoding::decode(value).unwrap_or_default().to_string());
            } else if !pair.is_empty() {
                params.entry(pair.to_string()).or_default().push(String::new());
            }
        }
    }
    params
}

fn header_multimap(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(text) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(text.to_string());
        }
    }
    map
}

fn body_text(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(body).into_owned())
    }
}
