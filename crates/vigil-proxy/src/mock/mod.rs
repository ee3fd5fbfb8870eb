//! Static mock matching: declarative request selectors with structural
//! subset semantics and locally synthesized responses.

mod handler;
mod matcher;
mod store;
mod subset;
mod types;

pub use handler::{handle_mock_request, internal_error_response, HandlerError, MockOutcome};
pub use matcher::{request_matches, MatchError};
pub use store::MockStore;
pub use subset::{is_subset, string_compare};
pub use types::{MockDefinition, MockRequest, MockResponse};
