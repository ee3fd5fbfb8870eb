//! Holds the parsed mock definitions and offers first-match lookup.
//!
//! The store is immutable after load, so readers need no lock.

use anyhow::Context;
use std::path::Path;

use super::matcher::{request_matches, MatchError};
use super::types::MockDefinition;
use crate::proxy::context::CapturedRequest;

pub struct MockStore {
    definitions: Vec<MockDefinition>,
}

impl MockStore {
    /// Build a store from parsed definitions, canonicalizing methods to
    /// uppercase and rejecting templates a response cannot be built from.
    pub fn new(mut definitions: Vec<MockDefinition>) -> Result<Self, anyhow::Error> {
        for (index, definition) in definitions.iter_mut().enumerate() {
            if definition.request.method.trim().is_empty() {
                anyhow::bail!("mock definition {index}: request method must not be empty");
            }
            definition.request.method = definition.request.method.to_uppercase();

            let status = definition.response.status_code;
            if !(100..=599).contains(&status) {
                anyhow::bail!(
                    "mock definition {index}: invalid response status code {status}"
                );
            }
        }
        Ok(Self { definitions })
    }

    pub fn empty() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Load a definition document (JSON or YAML sequence of definitions).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read mock definitions from {}", path.display()))?;
        let definitions: Vec<MockDefinition> = serde_yaml::from_str(&contents)
            .with_context(|| format!("cannot parse mock definitions in {}", path.display()))?;
        Self::new(definitions)
    }

    /// First-match lookup in declared order. A match error from any
    /// definition aborts the scan so the handler can shape it.
    pub fn first_match(
        &self,
        incoming: &CapturedRequest,
    ) -> Result<Option<&MockDefinition>, MatchError> {
        for definition in &self.definitions {
            if request_matches(&definition.request, incoming)? {
                return Ok(Some(definition));
            }
        }
        Ok(None)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
