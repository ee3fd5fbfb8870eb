//! Per-request transaction records, the keyed transaction store, and the
//! broadcast sink observers subscribe to.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::validation::ValidationError;

/// Serializable snapshot of an HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub host: String,
    pub headers: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Serializable snapshot of an HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub mocked: bool,
}

/// The aggregated record of one request, its (possibly mocked) response, and
/// any validation errors on either side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub request: RequestRecord,
    /// The rewritten request actually sent upstream, when forwarding happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<RequestRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_validation: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_validation: Vec<ValidationError>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn begin(id: String, request: RequestRecord, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            request,
            forwarded: None,
            response: None,
            request_validation: Vec::new(),
            response_validation: Vec::new(),
            started_at,
            completed_at: None,
        }
    }
}

/// Keyed transaction store with last-write-wins semantics per request ID.
#[derive(Default)]
pub struct TransactionStore {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, transaction: Transaction) {
        self.inner
            .write()
            .insert(transaction.id.clone(), transaction);
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        self.inner.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Events delivered to out-of-band consumers (e.g. a UI) in per-request
/// order: a request event always precedes the matching response event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BroadcastEvent {
    Request {
        transaction: Transaction,
    },
    RequestValidationErrors {
        transaction: Transaction,
        errors: Vec<ValidationError>,
    },
    Response {
        transaction: Transaction,
    },
    MockResponse {
        transaction: Transaction,
    },
    ResponseValidationErrors {
        transaction: Transaction,
        errors: Vec<ValidationError>,
    },
}

/// Fan-out channel for transactions and validation-error batches. Publishing
/// never fails: with no subscribers the event is simply dropped.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: BroadcastEvent) {
        if self.tx.send(event).is_err() {
            debug!("no broadcast subscribers, event dropped");
        }
    }
}
