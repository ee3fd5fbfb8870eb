//! Upstream dispatch with redirect following and `Set-Cookie` capture.
//!
//! hyper's client does not follow redirects, so the chain is walked here:
//! `301/302/303` re-issue as GET without body, `307/308` preserve method and
//! body. Each hop's first `Set-Cookie` value is captured; if the final
//! response carries none, the first captured cookie is promoted onto it.
//! Many upstream stacks set the session cookie on a 302 and drop it on the
//! final 200; clients need it.

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, SET_COOKIE};
use hyper::{Method, Request, StatusCode, Uri};
use tracing::debug;

use super::client::HttpClient;
use super::context::CapturedResponse;

const MAX_REDIRECT_HOPS: usize = 10;

/// Send a rewritten request upstream and return the buffered final response.
///
/// `body` must be the same bytes the request was built with; it is re-sent
/// on method-preserving redirects.
pub async fn dispatch_upstream(
    client: &HttpClient,
    request: Request<Full<Bytes>>,
    body: Bytes,
) -> Result<CapturedResponse, anyhow::Error> {
    let (parts, _) = request.into_parts();
    let mut method = parts.method;
    let mut uri = parts.uri;
    let mut headers = parts.headers;
    let mut send_body = true;
    let mut captured_cookies: Vec<HeaderValue> = Vec::new();

    for hop in 0..=MAX_REDIRECT_HOPS {
        let hop_body = if send_body {
            Full::new(body.clone())
        } else {
            Full::new(Bytes::new())
        };
        let mut hop_request = Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(hop_body)
            .context("cannot build upstream request")?;
        *hop_request.headers_mut() = headers.clone();

        let response = client
            .request(hop_request)
            .await
            .with_context(|| format!("upstream call to {uri} failed"))?;

        if let Some(cookie) = response.headers().get(SET_COOKIE) {
            captured_cookies.push(cookie.clone());
        }

        let redirect_target = if response.status().is_redirection() && hop < MAX_REDIRECT_HOPS {
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| resolve_location(&uri, location).ok())
        } else {
            None
        };

        if let Some(next_uri) = redirect_target {
            debug!("following {} redirect to {}", response.status(), next_uri);
            if downgrades_to_get(response.status()) && method != Method::GET && method != Method::HEAD
            {
                method = Method::GET;
                send_body = false;
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
            headers.remove(HOST);
            uri = next_uri;
            continue;
        }

        let mut captured = CapturedResponse::capture(response)
            .await
            .context("cannot read upstream response body")?;
        if !captured.headers.contains_key(SET_COOKIE) {
            if let Some(first) = captured_cookies.first() {
                captured.headers.insert(SET_COOKIE, first.clone());
            }
        }
        return Ok(captured);
    }

    anyhow::bail!("redirect chain exceeded {MAX_REDIRECT_HOPS} hops")
}

fn downgrades_to_get(status: StatusCode) -> bool {
    status == StatusCode::MOVED_PERMANENTLY
        || status == StatusCode::FOUND
        || status == StatusCode::SEE_OTHER
}

/// Resolve a `Location` value against the URI it was served from.
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, anyhow::Error> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return location.parse().context("invalid absolute Location");
    }

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base
        .authority()
        .map(|a| a.as_str())
        .context("redirect base URI has no authority")?;

    if location.starts_with('/') {
        return format!("{scheme}://{authority}{location}")
            .parse()
            .context("invalid origin-relative Location");
    }

    let parent = base.path().rsplit_once('/').map(|(head, _)| head).unwrap_or("");
    format!("{scheme}://{authority}{parent}/{location}")
        .parse()
        .context("invalid relative Location")
}
