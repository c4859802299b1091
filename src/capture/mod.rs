//! Capture pipeline: exchange log, request interception, response correlation

mod correlator;
mod exchange;
mod interceptor;
mod store;

pub use correlator::{PendingBody, ResponseCorrelator};
pub use exchange::{CapturedExchange, CapturedResponse, ExchangeId, ResponseBody};
pub use interceptor::RequestInterceptor;
pub use store::{CaptureStore, StoreEvent};

use std::sync::Arc;

use dashmap::DashMap;

use crate::browser::RequestId;

/// Buffered store notifications per subscriber before it starts lagging
pub const STORE_EVENT_CAPACITY: usize = 256;

/// Side map from browser request identity to captured exchange
///
/// Filled by the interceptor and consumed by the correlator, so responses the
/// engine links to a request never fall back to URL matching.
#[derive(Clone, Default)]
pub struct CorrelationIndex {
    entries: Arc<DashMap<RequestId, ExchangeId>>,
}

impl CorrelationIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember which exchange a request produced
    pub fn insert(&self, request_id: RequestId, exchange_id: ExchangeId) {
        self.entries.insert(request_id, exchange_id);
    }

    /// Look up the exchange for a request
    #[must_use]
    pub fn get(&self, request_id: &RequestId) -> Option<ExchangeId> {
        self.entries.get(request_id).map(|entry| *entry)
    }

    /// Forget a request
    pub fn remove(&self, request_id: &RequestId) {
        self.entries.remove(request_id);
    }

    /// Number of tracked requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no requests are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
