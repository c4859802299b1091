//! Request interception and capture eligibility

use tracing::{debug, warn};

use crate::browser::{InterceptedRequest, ResourceType};

use super::exchange::{CapturedExchange, ExchangeId};
use super::store::CaptureStore;
use super::CorrelationIndex;

/// Records XHR/fetch requests under the API base URL
pub struct RequestInterceptor {
    api_base_url: String,
    store: CaptureStore,
    index: CorrelationIndex,
}

impl RequestInterceptor {
    /// Create an interceptor feeding `store`
    pub fn new(api_base_url: impl Into<String>, store: CaptureStore, index: CorrelationIndex) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            store,
            index,
        }
    }

    /// Configured API base URL prefix
    #[must_use]
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Whether a request qualifies for capture
    ///
    /// Case-sensitive prefix match on the URL.
    #[must_use]
    pub fn is_eligible(&self, resource_type: &ResourceType, url: &str) -> bool {
        resource_type.is_api_call() && url.starts_with(&self.api_base_url)
    }

    /// Capture the request if eligible, then resume it
    ///
    /// Every request is resumed exactly once, captured or not. The exchange is
    /// appended before the resume so its response cannot arrive first.
    pub async fn handle(&self, request: InterceptedRequest) -> Option<ExchangeId> {
        let captured = if self.is_eligible(&request.resource_type, &request.url) {
            let exchange = CapturedExchange::new(
                &request.method,
                request.url.clone(),
                request.headers.clone(),
                request.post_data.clone(),
            )
            .with_request_id(request.request_id.clone());

            let id = self.store.append(exchange);
            self.index.insert(request.request_id.clone(), id);

            debug!(
                "Captured {} {} as exchange {} (request {})",
                request.method, request.url, id, request.request_id
            );
            Some(id)
        } else {
            None
        };

        let request_id = request.request_id.clone();
        if let Err(e) = request.resume().await {
            warn!("Failed to resume request {}: {}", request_id, e);
        }

        captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::browser::{Continuation, RequestId};
    use crate::{ApiscribeError, Result};

    const BASE: &str = "https://api.example.com";

    struct CountingContinuation {
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Continuation for CountingContinuation {
        async fn resume(self: Box<Self>) -> Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiscribeError::browser("request already handled"));
            }
            Ok(())
        }
    }

    fn request(
        id: &str,
        resource_type: ResourceType,
        url: &str,
        count: &Arc<AtomicUsize>,
    ) -> InterceptedRequest {
        InterceptedRequest::new(
            RequestId::new(id),
            "get",
            url,
            resource_type,
            Box::new(CountingContinuation {
                count: Arc::clone(count),
                fail: false,
            }),
        )
    }

    fn interceptor() -> (RequestInterceptor, CaptureStore, CorrelationIndex) {
        let store = CaptureStore::new();
        let index = CorrelationIndex::new();
        let interceptor = RequestInterceptor::new(BASE, store.clone(), index.clone());
        (interceptor, store, index)
    }

    #[test]
    fn test_eligibility() {
        let (interceptor, _, _) = interceptor();

        assert!(interceptor.is_eligible(&ResourceType::Xhr, "https://api.example.com/users"));
        assert!(interceptor.is_eligible(&ResourceType::Fetch, "https://api.example.com"));
        assert!(!interceptor.is_eligible(&ResourceType::Document, "https://api.example.com/users"));
        assert!(!interceptor.is_eligible(&ResourceType::Xhr, "https://cdn.example.com/app.js"));
        // Prefix match is case-sensitive
        assert!(!interceptor.is_eligible(&ResourceType::Xhr, "https://API.example.com/users"));
    }

    #[tokio::test]
    async fn test_eligible_request_is_captured_and_resumed() {
        let (interceptor, store, index) = interceptor();
        let count = Arc::new(AtomicUsize::new(0));

        let id = interceptor
            .handle(request("r1", ResourceType::Xhr, "https://api.example.com/users", &count))
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(index.get(&RequestId::new("r1")), Some(id));

        let exchange = store.get(id).unwrap();
        assert_eq!(exchange.method(), "GET");
        assert!(exchange.response().is_none());
    }

    #[tokio::test]
    async fn test_ineligible_request_is_only_resumed() {
        let (interceptor, store, index) = interceptor();
        let count = Arc::new(AtomicUsize::new(0));

        let captured = interceptor
            .handle(request("r1", ResourceType::Image, "https://api.example.com/logo.png", &count))
            .await;
        let captured_other = interceptor
            .handle(request("r2", ResourceType::Fetch, "https://other.example.com/x", &count))
            .await;

        assert!(captured.is_none());
        assert!(captured_other.is_none());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_resume_failure_keeps_capture() {
        let (interceptor, store, _) = interceptor();
        let count = Arc::new(AtomicUsize::new(0));

        let failing = InterceptedRequest::new(
            RequestId::new("r1"),
            "POST",
            "https://api.example.com/orders",
            ResourceType::Fetch,
            Box::new(CountingContinuation {
                count: Arc::clone(&count),
                fail: true,
            }),
        )
        .with_post_data(Some("{\"qty\":2}".to_string()));

        let id = interceptor.handle(failing).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(id).unwrap().request_body(), Some("{\"qty\":2}"));
    }
}
