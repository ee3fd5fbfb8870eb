//! Pipeline root: mock lookup, forwarding, and validation for every
//! incoming request.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

use super::client::HttpClient;
use super::context::{record_outbound, CapturedRequest};
use super::rewrite::rewrite_request;
use super::transport::dispatch_upstream;
use crate::config::RedirectTarget;
use crate::mock::{handle_mock_request, MockOutcome, MockStore};
use crate::transaction::Transaction;
use crate::validation::ValidationService;

/// Per-process pipeline state shared across connections.
pub struct ProxyService {
    redirect: RedirectTarget,
    client: HttpClient,
    mocks: Arc<MockStore>,
    validation: Arc<ValidationService>,
}

impl ProxyService {
    pub fn new(
        redirect: RedirectTarget,
        client: HttpClient,
        mocks: Arc<MockStore>,
        validation: Arc<ValidationService>,
    ) -> Self {
        Self {
            redirect,
            client,
            mocks,
            validation,
        }
    }

    pub fn validation(&self) -> &Arc<ValidationService> {
        &self.validation
    }

    /// Hyper entry point: buffer the request and run the pipeline.
    pub async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let captured = match CapturedRequest::capture(req).await {
            Ok(captured) => captured,
            Err(err) => {
                error!("cannot read request body: {err}");
                return Ok(error_response(400, "cannot read request body"));
            }
        };
        Ok(self.process(captured).await)
    }

    /// Run one buffered request through mock lookup, forwarding, and
    /// validation. Request validation runs concurrently with the rest of
    /// the pipeline and is joined before any response event is emitted.
    pub async fn process(&self, captured: CapturedRequest) -> Response<Full<Bytes>> {
        debug!(id = %captured.id, "{} {}", captured.method, captured.uri);
        let transaction =
            Transaction::begin(captured.id.clone(), captured.record(), captured.received_at);

        let request_validation = {
            let validation = Arc::clone(&self.validation);
            let transaction = transaction.clone();
            let request = captured.clone();
            tokio::spawn(async move { validation.validate_request(transaction, &request) })
        };

        match handle_mock_request(&self.mocks, &captured) {
            MockOutcome::Mocked(response) => {
                let _ = request_validation.await;
                self.validation
                    .record_mock_response(transaction, &response);
                response.into_response()
            }
            MockOutcome::Passthrough => {
                let outbound = match rewrite_request(&captured, &self.redirect) {
                    Ok(outbound) => outbound,
                    Err(err) => {
                        error!(id = %captured.id, "cannot rewrite request: {err:#}");
                        let _ = request_validation.await;
                        return error_response(502, "cannot rewrite request for upstream");
                    }
                };

                let mut transaction = transaction;
                transaction.forwarded = Some(record_outbound(&outbound, &captured.body));

                let dispatched =
                    dispatch_upstream(&self.client, outbound, captured.body.clone()).await;
                let _ = request_validation.await;

                match dispatched {
                    Ok(upstream) => {
                        let delivered = upstream.clone();
                        self.validation
                            .validate_response(transaction, &captured, &upstream);
                        delivered.into_response()
                    }
                    Err(err) => {
                        // No transaction response is recorded and no
                        // response validation runs on a transport failure.
                        error!(id = %captured.id, "upstream dispatch failed: {err:#}");
                        error_response(502, "Bad Gateway")
                    }
                }
            }
        }
    }
}

/// Plain JSON error response for pipeline-level failures.
pub fn error_response(status: u16, message: &str) -> Response<Full<Bytes>> {
    let body = format!(r#"{{"error": "{message}"}}"#);
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() =
        hyper::StatusCode::from_u16(status).unwrap_or(hyper::StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let response = error_response(502, "Bad Gateway");
        assert_eq!(response.status(), 502);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_error_response_invalid_status_falls_back() {
        let response = error_response(42, "odd");
        assert_eq!(response.status(), 500);
    }
}
