//! Bridges the contract validator into the transaction store, the broadcast
//! sink, and the report streamer.
//!
//! Both operations isolate validator panics: a panic becomes a single
//! synthetic error returned to the caller, and nothing is persisted for the
//! failed phase.

use chrono::Utc;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::{ContractValidator, ValidationError};
use crate::proxy::context::{CapturedRequest, CapturedResponse};
use crate::report::ViolationSink;
use crate::transaction::{BroadcastEvent, BroadcastSink, Transaction, TransactionStore};

pub struct ValidationService {
    validator: Arc<dyn ContractValidator>,
    transactions: Arc<TransactionStore>,
    broadcast: BroadcastSink,
    violations: Option<ViolationSink>,
}

impl ValidationService {
    pub fn new(
        validator: Arc<dyn ContractValidator>,
        transactions: Arc<TransactionStore>,
        broadcast: BroadcastSink,
        violations: Option<ViolationSink>,
    ) -> Self {
        Self {
            validator,
            transactions,
            broadcast,
            violations,
        }
    }

    pub fn transactions(&self) -> &Arc<TransactionStore> {
        &self.transactions
    }

    pub fn broadcast(&self) -> &BroadcastSink {
        &self.broadcast
    }

    /// Validate the original request, persist the transaction, and emit the
    /// request event. Returns the validator's errors verbatim.
    pub fn validate_request(
        &self,
        mut transaction: Transaction,
        request: &CapturedRequest,
    ) -> Vec<ValidationError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.validator.validate_request(request)));
        let errors = match outcome {
            Ok(errors) => errors,
            Err(payload) => return vec![panic_error("request", payload.as_ref())],
        };

        transaction.request_validation = errors.clone();
        self.transactions.put(transaction.clone());

        if errors.is_empty() {
            self.broadcast.publish(BroadcastEvent::Request { transaction });
        } else {
            self.stream(errors.clone());
            self.broadcast.publish(BroadcastEvent::RequestValidationErrors {
                transaction,
                errors: errors.clone(),
            });
        }
        errors
    }

    /// Validate the upstream response, persist the completed transaction,
    /// and emit the response event. Path-missing errors are a request
    /// concern and are filtered from the report and the broadcast, but the
    /// full list is returned to the caller.
    pub fn validate_response(
        &self,
        mut transaction: Transaction,
        request: &CapturedRequest,
        response: &CapturedResponse,
    ) -> Vec<ValidationError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.validator.validate_response(request, response)
        }));
        let full = match outcome {
            Ok(errors) => errors,
            Err(payload) => return vec![panic_error("response", payload.as_ref())],
        };

        let cleaned: Vec<ValidationError> = full
            .iter()
            .filter(|error| !error.is_path_missing())
            .cloned()
            .collect();

        transaction.response = Some(response.record(false));
        transaction.response_validation = cleaned.clone();
        transaction.completed_at = Some(Utc::now());
        self.transactions.put(transaction.clone());

        if cleaned.is_empty() {
            self.broadcast.publish(BroadcastEvent::Response { transaction });
        } else {
            self.stream(cleaned.clone());
            self.broadcast.publish(BroadcastEvent::ResponseValidationErrors {
                transaction,
                errors: cleaned,
            });
        }
        full
    }

    /// Record a locally synthesized response. Response validation is
    /// skipped for mocked traffic.
    pub fn record_mock_response(&self, mut transaction: Transaction, response: &CapturedResponse) {
        transaction.response = Some(response.record(true));
        transaction.completed_at = Some(Utc::now());
        self.transactions.put(transaction.clone());
        self.broadcast
            .publish(BroadcastEvent::MockResponse { transaction });
    }

    fn stream(&self, batch: Vec<ValidationError>) {
        if let Some(sink) = &self.violations {
            sink.submit(batch);
        }
    }
}

fn panic_error(scope: &str, payload: &(dyn Any + Send)) -> ValidationError {
    let text = if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown validator failure".to_string()
    };
    ValidationError::new(format!("Error validating {scope}: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::VALIDATION_TYPE_PATH;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method, StatusCode};

    struct ScriptedValidator {
        request_errors: Vec<ValidationError>,
        response_errors: Vec<ValidationError>,
    }

    impl ContractValidator for ScriptedValidator {
        fn validate_request(&self, _request: &CapturedRequest) -> Vec<ValidationError> {
            self.request_errors.clone()
        }

        fn validate_response(
            &self,
            _request: &CapturedRequest,
            _response: &CapturedResponse,
        ) -> Vec<ValidationError> {
            self.response_errors.clone()
        }
    }

    struct PanickingValidator;

    impl ContractValidator for PanickingValidator {
        fn validate_request(&self, _request: &CapturedRequest) -> Vec<ValidationError> {
            panic!("request validator blew up");
        }

        fn validate_response(
            &self,
            _request: &CapturedRequest,
            _response: &CapturedResponse,
        ) -> Vec<ValidationError> {
            panic!("response validator blew up");
        }
    }

    fn service(validator: Arc<dyn ContractValidator>) -> (ValidationService, BroadcastSink) {
        let broadcast = BroadcastSink::new(16);
        let service = ValidationService::new(
            validator,
            Arc::new(TransactionStore::new()),
            broadcast.clone(),
            None,
        );
        (service, broadcast)
    }

    fn request() -> CapturedRequest {
        CapturedRequest::from_parts(
            Method::GET,
            "/pets".parse().unwrap(),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    fn response() -> CapturedResponse {
        CapturedResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new())
    }

    fn transaction_for(req: &CapturedRequest) -> Transaction {
        Transaction::begin(req.id.clone(), req.record(), req.received_at)
    }

    fn path_error() -> ValidationError {
        ValidationError {
            message: "path /pets not found".to_string(),
            reason: String::new(),
            validation_type: VALIDATION_TYPE_PATH.to_string(),
            spec_line: None,
            how_to_fix: None,
        }
    }

    #[tokio::test]
    async fn test_clean_request_broadcasts_request_event() {
        let (service, broadcast) = service(Arc::new(ScriptedValidator {
            request_errors: vec![],
            response_errors: vec![],
        }));
        let mut rx = broadcast.subscribe();

        let req = request();
        let errors = service.validate_request(transaction_for(&req), &req);
        assert!(errors.is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Request { .. }
        ));
        assert!(service.transactions().get(&req.id).is_some());
    }

    #[tokio::test]
    async fn test_request_errors_are_persisted_and_broadcast() {
        let (service, broadcast) = service(Arc::new(ScriptedValidator {
            request_errors: vec![ValidationError::new("missing header")],
            response_errors: vec![],
        }));
        let mut rx = broadcast.subscribe();

        let req = request();
        let errors = service.validate_request(transaction_for(&req), &req);
        assert_eq!(errors.len(), 1);

        match rx.recv().await.unwrap() {
            BroadcastEvent::RequestValidationErrors { transaction, errors } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(transaction.request_validation.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let stored = service.transactions().get(&req.id).unwrap();
        assert_eq!(stored.request_validation[0].message, "missing header");
    }

    #[tokio::test]
    async fn test_path_missing_filtered_from_report_but_returned() {
        let (service, broadcast) = service(Arc::new(ScriptedValidator {
            request_errors: vec![],
            response_errors: vec![path_error(), ValidationError::new("schema mismatch")],
        }));
        let mut rx = broadcast.subscribe();

        let req = request();
        let full = service.validate_response(transaction_for(&req), &req, &response());
        // The caller sees everything.
        assert_eq!(full.len(), 2);

        // Observers only see the cleaned batch.
        match rx.recv().await.unwrap() {
            BroadcastEvent::ResponseValidationErrors { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].message, "schema mismatch");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let stored = service.transactions().get(&req.id).unwrap();
        assert_eq!(stored.response_validation.len(), 1);
    }

    #[tokio::test]
    async fn test_only_path_missing_errors_count_as_clean() {
        let (service, broadcast) = service(Arc::new(ScriptedValidator {
            request_errors: vec![],
            response_errors: vec![path_error()],
        }));
        let mut rx = broadcast.subscribe();

        let req = request();
        let full = service.validate_response(transaction_for(&req), &req, &response());
        assert_eq!(full.len(), 1);
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Response { .. }
        ));
    }

    #[test]
    fn test_request_panic_becomes_single_error() {
        let (service, _broadcast) = service(Arc::new(PanickingValidator));
        let req = request();
        let errors = service.validate_request(transaction_for(&req), &req);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "Error validating request: request validator blew up"
        );
        // Nothing persisted for the failed phase.
        assert!(service.transactions().get(&req.id).is_none());
    }

    #[test]
    fn test_response_panic_becomes_single_error() {
        let (service, _broadcast) = service(Arc::new(PanickingValidator));
        let req = request();
        let errors = service.validate_response(transaction_for(&req), &req, &response());
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .message
            .starts_with("Error validating response: "));
    }

    #[tokio::test]
    async fn test_violations_reach_the_report_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let streamer = crate::report::ReportStreamer::start(path.to_str().unwrap()).unwrap();

        let broadcast = BroadcastSink::new(16);
        let service = ValidationService::new(
            Arc::new(ScriptedValidator {
                request_errors: vec![ValidationError::new("bad request shape")],
                response_errors: vec![],
            }),
            Arc::new(TransactionStore::new()),
            broadcast,
            Some(streamer.sink()),
        );

        let req = request();
        service.validate_request(transaction_for(&req), &req);

        for _ in 0..100 {
            if !streamer.snapshot().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(streamer.snapshot().len(), 1);
        drop(service);
        streamer.shutdown().await;
    }

    #[tokio::test]
    async fn test_mock_response_recorded_and_broadcast() {
        let (service, broadcast) = service(Arc::new(ScriptedValidator {
            request_errors: vec![],
            response_errors: vec![],
        }));
        let mut rx = broadcast.subscribe();

        let req = request();
        service.record_mock_response(transaction_for(&req), &response());

        match rx.recv().await.unwrap() {
            BroadcastEvent::MockResponse { transaction } => {
                assert!(transaction.response.unwrap().mocked);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(service.transactions().get(&req.id).is_some());
    }
}
