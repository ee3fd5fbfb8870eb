//! vigil, an OpenAPI compliance HTTP proxy.
//!
//! The proxy sits between a client and an upstream service: traffic is
//! matched against static mock definitions first, otherwise cloned onto a
//! redirect target and forwarded. Requests and responses are validated
//! against a contract through the [`validation::ContractValidator`] seam,
//! and violations are streamed to a rotating JSON-array report file.

pub mod config;
pub mod mock;
pub mod proxy;
pub mod report;
pub mod transaction;
pub mod validation;
