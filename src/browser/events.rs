//! Network and lifecycle events delivered by a page

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::Result;

/// HTTP header map with deterministic iteration order
pub type Headers = BTreeMap<String, String>;

/// Native identity of a request inside the browser engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap an engine request identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource classification reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// `XMLHttpRequest`
    Xhr,
    /// `fetch()` call
    Fetch,
    /// Top-level or frame document
    Document,
    /// CSS
    Stylesheet,
    /// Image
    Image,
    /// JavaScript
    Script,
    /// Web font
    Font,
    /// Audio or video
    Media,
    /// WebSocket handshake
    WebSocket,
    /// Anything else, with the engine's name for it
    Other(String),
}

impl ResourceType {
    /// Parse the engine's lower-case resource type name
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "xhr" => Self::Xhr,
            "fetch" => Self::Fetch,
            "document" => Self::Document,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "script" => Self::Script,
            "font" => Self::Font,
            "media" => Self::Media,
            "websocket" => Self::WebSocket,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Whether this is a programmatic API call (XHR or fetch)
    #[must_use]
    pub fn is_api_call(&self) -> bool {
        matches!(self, Self::Xhr | Self::Fetch)
    }
}

/// Releases a held request back to the network
#[async_trait]
pub trait Continuation: Send {
    /// Let the request proceed
    ///
    /// # Errors
    ///
    /// Returns error if the engine no longer knows the request
    async fn resume(self: Box<Self>) -> Result<()>;
}

/// Reads a response payload
#[async_trait]
pub trait BodySource: Send {
    /// Read the whole payload as text
    ///
    /// # Errors
    ///
    /// Returns error for streamed, binary, or already-consumed bodies
    async fn text(self: Box<Self>) -> Result<String>;
}

/// A request held by interception
///
/// The request stays paused until [`resume`](Self::resume) consumes it.
pub struct InterceptedRequest {
    /// Engine request identity
    pub request_id: RequestId,
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request payload, if any
    pub post_data: Option<String>,
    /// Resource classification
    pub resource_type: ResourceType,
    continuation: Box<dyn Continuation>,
}

impl InterceptedRequest {
    /// Create a held request
    #[must_use]
    pub fn new(
        request_id: RequestId,
        method: impl Into<String>,
        url: impl Into<String>,
        resource_type: ResourceType,
        continuation: Box<dyn Continuation>,
    ) -> Self {
        Self {
            request_id,
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            post_data: None,
            resource_type,
            continuation,
        }
    }

    /// Attach request headers
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a request payload
    #[must_use]
    pub fn with_post_data(mut self, post_data: Option<String>) -> Self {
        self.post_data = post_data;
        self
    }

    /// Release the request
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to continue the request
    pub async fn resume(self) -> Result<()> {
        self.continuation.resume().await
    }
}

impl fmt::Debug for InterceptedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedRequest")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("resource_type", &self.resource_type)
            .finish_non_exhaustive()
    }
}

/// A response observed on the page
pub struct ResponseEvent {
    /// Identity of the originating request, when the engine links them
    pub request_id: Option<RequestId>,
    /// Response URL
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Payload reader
    pub body: Box<dyn BodySource>,
}

impl fmt::Debug for ResponseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseEvent")
            .field("request_id", &self.request_id)
            .field("url", &self.url)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Event emitted by a page
#[derive(Debug)]
pub enum PageEvent {
    /// A request is held and waiting to be resumed
    Request(InterceptedRequest),
    /// A response arrived
    Response(ResponseEvent),
    /// The page was closed outside the session's control
    Closed,
}
