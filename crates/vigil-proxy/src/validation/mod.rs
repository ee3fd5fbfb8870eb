//! Contract validation: the error record, the validator seam, and the
//! adapter that wires validation results into the store, the broadcast sink,
//! and the report streamer.

mod adapter;

pub use adapter::ValidationService;

use serde::{Deserialize, Serialize};

use crate::proxy::context::{CapturedRequest, CapturedResponse};

/// Validation type assigned to errors raised because the request path could
/// not be resolved in the contract.
pub const VALIDATION_TYPE_PATH: &str = "path";

/// A single contract violation as produced by the validator. The pipeline
/// treats the contents as opaque apart from [`ValidationError::is_path_missing`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub validation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_to_fix: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reason: String::new(),
            validation_type: String::new(),
            spec_line: None,
            how_to_fix: None,
        }
    }

    /// True when this error reports that the request path is absent from the
    /// contract. Response validation cannot meaningfully report a missing
    /// path, so these are filtered there.
    pub fn is_path_missing(&self) -> bool {
        self.validation_type == VALIDATION_TYPE_PATH
    }
}

/// The external OpenAPI validator seam: given an HTTP message, yield the
/// list of contract violations. Implementations must be panic-tolerant
/// callees only in the sense that the adapter isolates their panics.
pub trait ContractValidator: Send + Sync {
    fn validate_request(&self, request: &CapturedRequest) -> Vec<ValidationError>;

    fn validate_response(
        &self,
        request: &CapturedRequest,
        response: &CapturedResponse,
    ) -> Vec<ValidationError>;
}

/// Validator used when no contract document is loaded: every message is
/// considered clean, mirroring a proxy started without a specification.
pub struct DisabledValidator;

impl ContractValidator for DisabledValidator {
    fn validate_request(&self, _request: &CapturedRequest) -> Vec<ValidationError> {
        Vec::new()
    }

    fn validate_response(
        &self,
        _request: &CapturedRequest,
        _response: &CapturedResponse,
    ) -> Vec<ValidationError> {
        Vec::new()
    }
}
