//! Matching responses to captured requests

use tracing::{debug, trace, warn};

use crate::browser::{BodySource, Headers, ResponseEvent};

use super::exchange::{CapturedResponse, ExchangeId, ResponseBody};
use super::store::CaptureStore;
use super::CorrelationIndex;

/// Links inbound responses to the exchanges that caused them
///
/// A response carrying a request identity goes to exactly that request's
/// exchange. A response without one falls back to the earliest exchange with
/// the same URL that is still waiting for a response.
pub struct ResponseCorrelator {
    store: CaptureStore,
    index: CorrelationIndex,
    max_body_bytes: usize,
}

impl ResponseCorrelator {
    /// Create a correlator updating `store`
    pub fn new(store: CaptureStore, index: CorrelationIndex, max_body_bytes: usize) -> Self {
        Self {
            store,
            index,
            max_body_bytes,
        }
    }

    /// Claim the matching exchange for a response
    ///
    /// Returns the body read that completes the match, or `None` when the
    /// response belongs to no waiting exchange. The claim happens before any
    /// await, so concurrent responses never pick the same exchange.
    pub fn correlate(&self, event: ResponseEvent) -> Option<PendingBody> {
        let ResponseEvent {
            request_id,
            url,
            status,
            headers,
            body,
        } = event;

        let target = match request_id {
            Some(request_id) => {
                let id = self.index.get(&request_id)?;
                self.index.remove(&request_id);
                self.store.claim(id).then_some(id)
            }
            None => self.store.claim_by_url(&url).map(|(id, request_id)| {
                if let Some(request_id) = request_id {
                    self.index.remove(&request_id);
                }
                id
            }),
        };

        let Some(id) = target else {
            trace!("No waiting exchange for response {} {}", status, url);
            return None;
        };

        debug!("Matched response {} {} to exchange {}", status, url, id);

        Some(PendingBody {
            id,
            url,
            status,
            headers,
            body,
            store: self.store.clone(),
            max_body_bytes: self.max_body_bytes,
        })
    }
}

/// A claimed exchange waiting for its response body
pub struct PendingBody {
    id: ExchangeId,
    url: String,
    status: u16,
    headers: Headers,
    body: Box<dyn BodySource>,
    store: CaptureStore,
    max_body_bytes: usize,
}

impl PendingBody {
    /// Exchange that will receive the response
    #[must_use]
    pub fn exchange_id(&self) -> ExchangeId {
        self.id
    }

    /// Read the body and store the response
    ///
    /// Read failures are logged and recorded as [`ResponseBody::Unreadable`].
    /// Returns whether the store accepted the response; it refuses when the
    /// exchange was deleted or the store cleared in the meantime.
    pub async fn read(self) -> bool {
        let Self {
            id,
            url,
            status,
            headers,
            body,
            store,
            max_body_bytes,
        } = self;

        let body = match body.text().await {
            Ok(text) if text.len() > max_body_bytes => {
                warn!(
                    "Response body for {} is {} bytes, over the {} byte limit",
                    url,
                    text.len(),
                    max_body_bytes
                );
                ResponseBody::Unreadable {
                    reason: format!("body exceeds {max_body_bytes} bytes"),
                }
            }
            Ok(text) => ResponseBody::Text(text),
            Err(e) => {
                warn!("Error capturing response for {}: {}", url, e);
                ResponseBody::Unreadable {
                    reason: e.to_string(),
                }
            }
        };

        let accepted = store.update(
            id,
            CapturedResponse {
                status,
                headers,
                body,
            },
        );

        if !accepted {
            debug!("Discarded late response for exchange {}", id);
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::browser::RequestId;
    use crate::capture::CapturedExchange;
    use crate::{ApiscribeError, Result};

    const URL: &str = "https://api.example.com/users";

    struct StaticBody(std::result::Result<String, String>);

    #[async_trait]
    impl BodySource for StaticBody {
        async fn text(self: Box<Self>) -> Result<String> {
            let Self(text) = *self;
            text.map_err(ApiscribeError::Browser)
        }
    }

    fn response(request_id: Option<&str>, url: &str, status: u16, body: &str) -> ResponseEvent {
        ResponseEvent {
            request_id: request_id.map(RequestId::new),
            url: url.to_string(),
            status,
            headers: Headers::new(),
            body: Box::new(StaticBody(Ok(body.to_string()))),
        }
    }

    fn capture(store: &CaptureStore, index: &CorrelationIndex, request_id: &str, url: &str) -> ExchangeId {
        let exchange = CapturedExchange::new("GET", url, Headers::new(), None)
            .with_request_id(RequestId::new(request_id));
        let id = store.append(exchange);
        index.insert(RequestId::new(request_id), id);
        id
    }

    fn setup() -> (ResponseCorrelator, CaptureStore, CorrelationIndex) {
        let store = CaptureStore::new();
        let index = CorrelationIndex::new();
        let correlator = ResponseCorrelator::new(store.clone(), index.clone(), 1024);
        (correlator, store, index)
    }

    #[tokio::test]
    async fn test_url_fallback_updates_earliest_waiting() {
        let (correlator, store, index) = setup();
        let first = capture(&store, &index, "r1", URL);
        let second = capture(&store, &index, "r2", URL);

        let pending = correlator.correlate(response(None, URL, 200, "{\"id\":1}")).unwrap();
        assert_eq!(pending.exchange_id(), first);
        assert!(pending.read().await);

        assert_eq!(store.get(first).unwrap().response().unwrap().status, 200);
        assert!(store.get(second).unwrap().response().is_none());
    }

    #[tokio::test]
    async fn test_request_identity_beats_url_order() {
        let (correlator, store, index) = setup();
        let first = capture(&store, &index, "r1", URL);
        let second = capture(&store, &index, "r2", URL);

        let pending = correlator
            .correlate(response(Some("r2"), URL, 201, "{}"))
            .unwrap();
        assert_eq!(pending.exchange_id(), second);
        assert!(pending.read().await);

        assert!(store.get(first).unwrap().response().is_none());
        assert_eq!(store.get(second).unwrap().response().unwrap().status, 201);
    }

    #[tokio::test]
    async fn test_unknown_request_identity_is_ignored() {
        let (correlator, store, index) = setup();
        let first = capture(&store, &index, "r1", URL);

        assert!(correlator
            .correlate(response(Some("document-7"), URL, 200, ""))
            .is_none());
        assert!(store.get(first).unwrap().response().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_responses_claim_distinct_exchanges() {
        let (correlator, store, index) = setup();
        let first = capture(&store, &index, "r1", URL);
        let second = capture(&store, &index, "r2", URL);

        let a = correlator.correlate(response(None, URL, 200, "\"a\"")).unwrap();
        let b = correlator.correlate(response(None, URL, 200, "\"b\"")).unwrap();
        assert!(correlator.correlate(response(None, URL, 200, "\"c\"")).is_none());

        // Second read finishes first
        assert!(b.read().await);
        assert!(a.read().await);

        let text = |id| {
            store
                .get(id)
                .and_then(|e| e.response().and_then(|r| r.body.as_text().map(str::to_string)))
        };
        assert_eq!(text(first).as_deref(), Some("\"a\""));
        assert_eq!(text(second).as_deref(), Some("\"b\""));
    }

    #[tokio::test]
    async fn test_body_failure_marks_unreadable() {
        let (correlator, store, index) = setup();
        let id = capture(&store, &index, "r1", URL);

        let event = ResponseEvent {
            request_id: Some(RequestId::new("r1")),
            url: URL.to_string(),
            status: 200,
            headers: Headers::new(),
            body: Box::new(StaticBody(Err("body already consumed".to_string()))),
        };

        assert!(correlator.correlate(event).unwrap().read().await);

        let response = store.get(id).unwrap().response().cloned().unwrap();
        assert_eq!(response.status, 200);
        assert!(matches!(response.body, ResponseBody::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_oversized_body_marks_unreadable() {
        let (correlator, store, index) = setup();
        let id = capture(&store, &index, "r1", URL);

        let big = "x".repeat(2048);
        let pending = correlator.correlate(response(Some("r1"), URL, 200, &big)).unwrap();
        assert!(pending.read().await);

        let response = store.get(id).unwrap().response().cloned().unwrap();
        assert!(response.body.as_text().is_none());
    }

    #[tokio::test]
    async fn test_second_response_does_not_overwrite() {
        let (correlator, store, index) = setup();
        let id = capture(&store, &index, "r1", URL);

        assert!(correlator
            .correlate(response(None, URL, 200, "first"))
            .unwrap()
            .read()
            .await);
        assert!(correlator.correlate(response(None, URL, 500, "second")).is_none());
        assert!(correlator.correlate(response(Some("r1"), URL, 500, "second")).is_none());

        assert_eq!(store.get(id).unwrap().response().unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_late_read_after_clear_is_discarded() {
        let (correlator, store, index) = setup();
        capture(&store, &index, "r1", URL);

        let pending = correlator.correlate(response(None, URL, 200, "{}")).unwrap();
        store.clear();

        assert!(!pending.read().await);
        assert!(store.is_empty());
    }
}
