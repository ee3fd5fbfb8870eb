//! Request cloning with protocol/host/port redirection.
//!
//! The clone is independent of the original: the buffered body is shared as
//! cheap `Bytes`, headers are copied, and the original stays readable for
//! validation.

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, HOST, REFERER};
use hyper::{Request, Uri};

use super::context::CapturedRequest;
use crate::config::RedirectTarget;

/// Header that preserves the client's `Referer` across the rewrite.
pub static X_ORIGINAL_REFERER: HeaderName = HeaderName::from_static("x-original-referer");

/// Clone the incoming request onto the redirect target. Scheme, host and
/// port are replaced; method, path, query, headers and body pass through.
/// The `Host` header is dropped so the client derives it from the new URI.
pub fn rewrite_request(
    incoming: &CapturedRequest,
    target: &RedirectTarget,
) -> Result<Request<Full<Bytes>>, anyhow::Error> {
    let path_and_query = incoming
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = format!("{}{}", target.base_url(), path_and_query)
        .parse()
        .with_context(|| format!("cannot rebuild URI against {}", target.base_url()))?;

    let mut request = Request::builder()
        .method(incoming.method.clone())
        .uri(uri)
        .body(Full::new(incoming.body.clone()))
        .context("cannot clone request for forwarding")?;

    let headers = request.headers_mut();
    for (name, value) in incoming.headers.iter() {
        if name != HOST {
            headers.append(name.clone(), value.clone());
        }
    }

    if let Some(referer) = incoming.headers.get(REFERER) {
        if !referer.is_empty() {
            headers.insert(X_ORIGINAL_REFERER.clone(), referer.clone());
            let rewritten = rewrite_referer(referer.to_str().ok(), incoming, target);
            if let Ok(value) = HeaderValue::from_str(&rewritten) {
                headers.insert(REFERER, value);
            }
        }
    }

    Ok(request)
}

/// Substitute protocol/host/port over the Referer's own path and query,
/// falling back to the request's path and query when the Referer does not
/// parse as a URL.
fn rewrite_referer(
    referer: Option<&str>,
    incoming: &CapturedRequest,
    target: &RedirectTarget,
) -> String {
    let mut path_and_query = referer
        .and_then(|raw| raw.parse::<Uri>().ok())
        .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
        .unwrap_or_else(|| {
            incoming
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string())
        });
    if !path_and_query.starts_with('/') {
        path_and_query.insert(0, '/');
    }
    format!("{}{}", target.base_url(), path_and_query)
}
