//! In-memory browser driven by explicit events
//!
//! Lets hosts and tests push request/response/close events into a capture
//! session and observe how the session treats the browser.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::events::{
    BodySource, Continuation, Headers, InterceptedRequest, PageEvent, RequestId, ResourceType,
    ResponseEvent,
};
use super::{Browser, BrowserLauncher, LaunchOptions, Page};
use crate::{ApiscribeError, Result};

/// How long [`ScriptedBrowser::emit_request`] waits for the resume
const RESUME_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Shared {
    launches: AtomicUsize,
    closes: AtomicUsize,
    fail_launch: AtomicBool,
    fail_navigation: AtomicBool,
    interception: AtomicBool,
    next_request: AtomicU64,
    last_launch: Mutex<Option<LaunchOptions>>,
    navigations: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::Sender<PageEvent>>>,
    resumes: DashMap<RequestId, usize>,
    passed_through: AtomicUsize,
}

/// Browser capability backed by events pushed from code
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    shared: Arc<Shared>,
}

impl ScriptedBrowser {
    /// Create a scripted browser
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `launch` fail
    pub fn fail_next_launch(&self) {
        self.shared.fail_launch.store(true, Ordering::SeqCst);
    }

    /// Make every `goto` fail while set
    pub fn fail_navigation(&self, fail: bool) {
        self.shared.fail_navigation.store(fail, Ordering::SeqCst);
    }

    /// Deliver a request and wait until the page resumes it
    ///
    /// With interception off the request goes straight to the network: no
    /// event is delivered and nothing has to resume it.
    ///
    /// # Errors
    ///
    /// Returns error if no page is subscribed, or if the request is dropped
    /// or not resumed within five seconds
    pub async fn emit_request(&self, request: ScriptedRequest) -> Result<RequestId> {
        let sender = self.sender()?;
        let request_id = request.request_id.unwrap_or_else(|| {
            let n = self.shared.next_request.fetch_add(1, Ordering::Relaxed);
            RequestId::new(format!("scripted-{n}"))
        });

        if !self.shared.interception.load(Ordering::SeqCst) {
            self.shared.passed_through.fetch_add(1, Ordering::SeqCst);
            return Ok(request_id);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let continuation = ScriptedContinuation {
            request_id: request_id.clone(),
            shared: Arc::clone(&self.shared),
            done: done_tx,
        };

        let event = InterceptedRequest::new(
            request_id.clone(),
            request.method,
            request.url,
            request.resource_type,
            Box::new(continuation),
        )
        .with_headers(request.headers)
        .with_post_data(request.post_data);

        sender
            .send(PageEvent::Request(event))
            .await
            .map_err(|_| ApiscribeError::browser("page event channel closed"))?;

        match tokio::time::timeout(RESUME_TIMEOUT, done_rx).await {
            Ok(Ok(())) => Ok(request_id),
            Ok(Err(_)) => Err(ApiscribeError::browser(format!(
                "request {request_id} dropped without resume"
            ))),
            Err(_) => Err(ApiscribeError::browser(format!(
                "request {request_id} was never resumed"
            ))),
        }
    }

    /// Deliver a response
    ///
    /// # Errors
    ///
    /// Returns error if no page is subscribed
    pub async fn emit_response(&self, response: ScriptedResponse) -> Result<()> {
        let sender = self.sender()?;
        let event = ResponseEvent {
            request_id: response.request_id,
            url: response.url,
            status: response.status,
            headers: response.headers,
            body: Box::new(ScriptedBody {
                text: response.body,
                delay: response.delay,
            }),
        };

        sender
            .send(PageEvent::Response(event))
            .await
            .map_err(|_| ApiscribeError::browser("page event channel closed"))
    }

    /// Simulate the user closing the page window
    ///
    /// # Errors
    ///
    /// Returns error if no page is subscribed
    pub async fn close_page(&self) -> Result<()> {
        self.sender()?
            .send(PageEvent::Closed)
            .await
            .map_err(|_| ApiscribeError::browser("page event channel closed"))
    }

    /// Number of successful launches
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    /// Number of browser closes
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent launch
    #[must_use]
    pub fn last_launch_options(&self) -> Option<LaunchOptions> {
        self.shared.last_launch.lock().clone()
    }

    /// URLs passed to `goto`, in order
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.shared.navigations.lock().clone()
    }

    /// Whether request interception is currently enabled
    #[must_use]
    pub fn interception_enabled(&self) -> bool {
        self.shared.interception.load(Ordering::SeqCst)
    }

    /// Requests sent while interception was off
    #[must_use]
    pub fn passed_through_count(&self) -> usize {
        self.shared.passed_through.load(Ordering::SeqCst)
    }

    /// How many times the request was resumed
    #[must_use]
    pub fn resume_count(&self, request_id: &RequestId) -> usize {
        self.shared
            .resumes
            .get(request_id)
            .map_or(0, |count| *count)
    }

    fn sender(&self) -> Result<mpsc::Sender<PageEvent>> {
        self.shared
            .events
            .lock()
            .clone()
            .ok_or_else(|| ApiscribeError::browser("no page is subscribed to events"))
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>> {
        if self.shared.fail_launch.swap(false, Ordering::SeqCst) {
            return Err(ApiscribeError::browser("failed to launch scripted browser"));
        }

        self.shared.launches.fetch_add(1, Ordering::SeqCst);
        *self.shared.last_launch.lock() = Some(options.clone());

        Ok(Box::new(ScriptedInstance {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedInstance {
    shared: Arc<Shared>,
}

#[async_trait]
impl Browser for ScriptedInstance {
    async fn new_page(&mut self) -> Result<Box<dyn Page>> {
        Ok(Box::new(ScriptedPage {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.interception.store(false, Ordering::SeqCst);
        self.shared.events.lock().take();
        Ok(())
    }
}

struct ScriptedPage {
    shared: Arc<Shared>,
}

#[async_trait]
impl Page for ScriptedPage {
    async fn set_request_interception(&mut self, enabled: bool) -> Result<()> {
        self.shared.interception.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&mut self, buffer: usize) -> Result<mpsc::Receiver<PageEvent>> {
        let mut events = self.shared.events.lock();
        if events.is_some() {
            return Err(ApiscribeError::browser("page already has a subscriber"));
        }

        let (tx, rx) = mpsc::channel(buffer);
        *events = Some(tx);
        Ok(rx)
    }

    async fn goto(&mut self, url: &str) -> Result<()> {
        if self.shared.fail_navigation.load(Ordering::SeqCst) {
            return Err(ApiscribeError::browser(format!(
                "navigation to {url} failed"
            )));
        }

        self.shared.navigations.lock().push(url.to_string());
        Ok(())
    }
}

struct ScriptedContinuation {
    request_id: RequestId,
    shared: Arc<Shared>,
    done: oneshot::Sender<()>,
}

#[async_trait]
impl Continuation for ScriptedContinuation {
    async fn resume(self: Box<Self>) -> Result<()> {
        let Self {
            request_id,
            shared,
            done,
        } = *self;
        *shared.resumes.entry(request_id).or_insert(0) += 1;
        done.send(()).ok();
        Ok(())
    }
}

struct ScriptedBody {
    text: std::result::Result<String, String>,
    delay: Option<Duration>,
}

#[async_trait]
impl BodySource for ScriptedBody {
    async fn text(self: Box<Self>) -> Result<String> {
        let Self { text, delay } = *self;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        text.map_err(ApiscribeError::Browser)
    }
}

/// Request to deliver through [`ScriptedBrowser::emit_request`]
#[derive(Debug, Clone)]
pub struct ScriptedRequest {
    request_id: Option<RequestId>,
    method: String,
    url: String,
    resource_type: ResourceType,
    headers: Headers,
    post_data: Option<String>,
}

impl ScriptedRequest {
    /// An XHR request with no headers or body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            request_id: None,
            method: method.into(),
            url: url.into(),
            resource_type: ResourceType::Xhr,
            headers: Headers::new(),
            post_data: None,
        }
    }

    /// Use a fixed request identity
    #[must_use]
    pub fn id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Set the resource classification
    #[must_use]
    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the payload
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.post_data = Some(body.into());
        self
    }
}

/// Response to deliver through [`ScriptedBrowser::emit_response`]
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    request_id: Option<RequestId>,
    url: String,
    status: u16,
    headers: Headers,
    body: std::result::Result<String, String>,
    delay: Option<Duration>,
}

impl ScriptedResponse {
    /// A response with an empty body and no request identity
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            request_id: None,
            url: url.into(),
            status,
            headers: Headers::new(),
            body: Ok(String::new()),
            delay: None,
        }
    }

    /// Link the response to a request identity
    #[must_use]
    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the payload text
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Ok(body.into());
        self
    }

    /// Make the payload read fail
    #[must_use]
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.body = Err(reason.into());
        self
    }

    /// Delay the payload read
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_failure_is_one_shot() {
        let browser = ScriptedBrowser::new();
        browser.fail_next_launch();

        assert!(browser.launch(&LaunchOptions::default()).await.is_err());
        assert!(browser.launch(&LaunchOptions::default()).await.is_ok());
        assert_eq!(browser.launch_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_without_subscriber_fails() {
        let browser = ScriptedBrowser::new();
        let result = browser
            .emit_request(ScriptedRequest::new("GET", "https://api.example.com/a"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_emit_request_waits_for_resume() {
        let browser = ScriptedBrowser::new();
        let mut instance = browser.launch(&LaunchOptions::default()).await.unwrap();
        let mut page = instance.new_page().await.unwrap();
        page.set_request_interception(true).await.unwrap();
        let mut events = page.subscribe(8).unwrap();

        let resumer = tokio::spawn(async move {
            if let Some(PageEvent::Request(request)) = events.recv().await {
                request.resume().await.unwrap();
            }
        });

        let id = browser
            .emit_request(ScriptedRequest::new("GET", "https://api.example.com/a"))
            .await
            .unwrap();
        resumer.await.unwrap();

        assert_eq!(browser.resume_count(&id), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_is_reported() {
        let browser = ScriptedBrowser::new();
        let mut instance = browser.launch(&LaunchOptions::default()).await.unwrap();
        let mut page = instance.new_page().await.unwrap();
        page.set_request_interception(true).await.unwrap();
        let mut events = page.subscribe(8).unwrap();

        let dropper = tokio::spawn(async move {
            let _ = events.recv().await;
        });

        let result = browser
            .emit_request(ScriptedRequest::new("GET", "https://api.example.com/a"))
            .await;
        dropper.await.unwrap();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_close_detaches_events() {
        let browser = ScriptedBrowser::new();
        let mut instance = browser.launch(&LaunchOptions::default()).await.unwrap();
        let mut page = instance.new_page().await.unwrap();
        let mut events = page.subscribe(8).unwrap();

        instance.close().await.unwrap();

        assert_eq!(browser.close_count(), 1);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_request_without_interception_passes_through() {
        let browser = ScriptedBrowser::new();
        let mut instance = browser.launch(&LaunchOptions::default()).await.unwrap();
        let mut page = instance.new_page().await.unwrap();
        let mut events = page.subscribe(8).unwrap();

        let id = browser
            .emit_request(ScriptedRequest::new("GET", "https://cdn.example.com/x.js"))
            .await
            .unwrap();

        assert_eq!(browser.passed_through_count(), 1);
        assert_eq!(browser.resume_count(&id), 0);
        assert!(events.try_recv().is_err());
    }
}
