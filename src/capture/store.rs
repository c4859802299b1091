//! Ordered log of exchanges for the active session

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

use crate::browser::RequestId;

use super::exchange::{CapturedExchange, CapturedResponse, ExchangeId};
use super::STORE_EVENT_CAPACITY;

/// Change notification emitted by a [`CaptureStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// An exchange was appended
    Added(ExchangeId),
    /// An exchange received its response
    Updated(ExchangeId),
    /// An exchange was deleted
    Removed(ExchangeId),
    /// The store was emptied
    Cleared,
}

struct Slot {
    exchange: CapturedExchange,
    // A body read for this exchange is in flight
    claimed: bool,
}

/// Shared, ordered, mutable exchange log
///
/// Clones share the same log. Observers subscribe to [`StoreEvent`]s instead
/// of polling.
#[derive(Clone)]
pub struct CaptureStore {
    slots: Arc<RwLock<Vec<Slot>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl CaptureStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Self {
            slots: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    /// Subscribe to change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Append an exchange at the tail
    pub fn append(&self, exchange: CapturedExchange) -> ExchangeId {
        let id = exchange.id();
        self.slots.write().push(Slot {
            exchange,
            claimed: false,
        });
        self.notify(StoreEvent::Added(id));
        id
    }

    /// Set the response of an exchange
    ///
    /// Returns `false` if the exchange is gone or already has a response.
    pub fn update(&self, id: ExchangeId, response: CapturedResponse) -> bool {
        let updated = {
            let mut slots = self.slots.write();
            slots
                .iter_mut()
                .find(|slot| slot.exchange.id() == id)
                .is_some_and(|slot| {
                    slot.claimed = false;
                    slot.exchange.set_response(response)
                })
        };

        if updated {
            self.notify(StoreEvent::Updated(id));
        }
        updated
    }

    /// Delete an exchange
    ///
    /// Returns `false` if the exchange was not present.
    pub fn remove(&self, id: ExchangeId) -> bool {
        let removed = {
            let mut slots = self.slots.write();
            let before = slots.len();
            slots.retain(|slot| slot.exchange.id() != id);
            slots.len() != before
        };

        if removed {
            self.notify(StoreEvent::Removed(id));
        }
        removed
    }

    /// Empty the store
    pub fn clear(&self) {
        self.slots.write().clear();
        self.notify(StoreEvent::Cleared);
    }

    /// Snapshot of every exchange, in capture order
    #[must_use]
    pub fn list(&self) -> Vec<CapturedExchange> {
        self.slots
            .read()
            .iter()
            .map(|slot| slot.exchange.clone())
            .collect()
    }

    /// Snapshot of one exchange
    #[must_use]
    pub fn get(&self, id: ExchangeId) -> Option<CapturedExchange> {
        self.slots
            .read()
            .iter()
            .find(|slot| slot.exchange.id() == id)
            .map(|slot| slot.exchange.clone())
    }

    /// 1-based position of an exchange in capture order
    #[must_use]
    pub fn sequence_of(&self, id: ExchangeId) -> Option<usize> {
        self.slots
            .read()
            .iter()
            .position(|slot| slot.exchange.id() == id)
            .map(|index| index + 1)
    }

    /// Number of exchanges
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Reserve a specific exchange for a pending body read
    pub(crate) fn claim(&self, id: ExchangeId) -> bool {
        let mut slots = self.slots.write();
        slots
            .iter_mut()
            .find(|slot| slot.exchange.id() == id)
            .is_some_and(|slot| {
                if slot.claimed || slot.exchange.response().is_some() {
                    return false;
                }
                slot.claimed = true;
                true
            })
    }

    /// Reserve the earliest unanswered, unclaimed exchange for `url`
    pub(crate) fn claim_by_url(&self, url: &str) -> Option<(ExchangeId, Option<RequestId>)> {
        let mut slots = self.slots.write();
        let slot = slots.iter_mut().find(|slot| {
            !slot.claimed && slot.exchange.response().is_none() && slot.exchange.url() == url
        })?;
        slot.claimed = true;
        Some((slot.exchange.id(), slot.exchange.request_id().cloned()))
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine
        if self.events.send(event).is_err() {
            trace!("Store event {:?} had no subscribers", event);
        }
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Headers;
    use crate::capture::ResponseBody;

    fn exchange(method: &str, url: &str) -> CapturedExchange {
        CapturedExchange::new(method, url, Headers::new(), None)
    }

    fn response(status: u16) -> CapturedResponse {
        CapturedResponse {
            status,
            headers: Headers::new(),
            body: ResponseBody::Text(String::new()),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        let b = store.append(exchange("POST", "https://api.example.com/b"));
        let c = store.append(exchange("GET", "https://api.example.com/a"));

        let ids: Vec<_> = store.list().iter().map(CapturedExchange::id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(store.sequence_of(c), Some(3));
    }

    #[test]
    fn test_remove_keeps_relative_order() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        let b = store.append(exchange("GET", "https://api.example.com/b"));
        let c = store.append(exchange("GET", "https://api.example.com/c"));

        assert!(store.remove(b));
        assert_eq!(store.len(), 2);

        let ids: Vec<_> = store.list().iter().map(CapturedExchange::id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(store.sequence_of(c), Some(2));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        assert!(store.remove(a));
        assert!(!store.remove(a));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_first_write_wins() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));

        assert!(store.update(a, response(200)));
        assert!(!store.update(a, response(500)));
        assert_eq!(store.get(a).unwrap().response().unwrap().status, 200);
    }

    #[test]
    fn test_update_after_clear_is_noop() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        store.clear();

        assert!(!store.update(a, response(200)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_claim_by_url_picks_earliest_unclaimed() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        let b = store.append(exchange("GET", "https://api.example.com/a"));

        assert_eq!(store.claim_by_url("https://api.example.com/a").map(|c| c.0), Some(a));
        assert_eq!(store.claim_by_url("https://api.example.com/a").map(|c| c.0), Some(b));
        assert!(store.claim_by_url("https://api.example.com/a").is_none());
    }

    #[test]
    fn test_claim_skips_answered() {
        let store = CaptureStore::new();
        let a = store.append(exchange("GET", "https://api.example.com/a"));
        store.update(a, response(200));

        assert!(!store.claim(a));
        assert!(store.claim_by_url("https://api.example.com/a").is_none());
    }

    #[tokio::test]
    async fn test_notifications() {
        let store = CaptureStore::new();
        let mut events = store.subscribe();

        let a = store.append(exchange("GET", "https://api.example.com/a"));
        store.update(a, response(204));
        store.remove(a);
        store.remove(a);
        store.clear();

        assert_eq!(events.recv().await.unwrap(), StoreEvent::Added(a));
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Updated(a));
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Removed(a));
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Cleared);
        assert!(events.try_recv().is_err());
    }
}
