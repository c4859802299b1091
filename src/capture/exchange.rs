//! Captured request/response exchanges

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::browser::{Headers, RequestId};

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a captured exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl ExchangeId {
    fn next() -> Self {
        Self(NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, stable for the life of the process
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Payload of a captured response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Body read as text
    Text(String),
    /// Body could not be read (streamed, binary, already consumed)
    Unreadable {
        /// Why the read failed
        reason: String,
    },
}

impl ResponseBody {
    /// Text of the body, if it was readable
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Unreadable { .. } => None,
        }
    }
}

/// Response matched to a captured request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response payload
    pub body: ResponseBody,
}

/// One observed API call
///
/// Everything but the response is fixed at creation. The response moves from
/// absent to present at most once.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    id: ExchangeId,
    request_id: Option<RequestId>,
    method: String,
    url: String,
    request_headers: Headers,
    request_body: Option<String>,
    response: Option<CapturedResponse>,
    captured_at: SystemTime,
}

impl CapturedExchange {
    /// Record a new request with no response yet
    pub fn new(
        method: &str,
        url: impl Into<String>,
        request_headers: Headers,
        request_body: Option<String>,
    ) -> Self {
        Self {
            id: ExchangeId::next(),
            request_id: None,
            method: method.to_ascii_uppercase(),
            url: url.into(),
            request_headers,
            request_body,
            response: None,
            captured_at: SystemTime::now(),
        }
    }

    /// Remember the browser's identity for the request
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach a response at construction time
    #[must_use]
    pub fn with_response(mut self, response: CapturedResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// Exchange identity
    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Browser identity of the originating request
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Uppercase HTTP method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Absolute request URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers
    #[must_use]
    pub fn request_headers(&self) -> &Headers {
        &self.request_headers
    }

    /// Request payload
    #[must_use]
    pub fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }

    /// Matched response, if one arrived
    #[must_use]
    pub fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    /// When the request was intercepted
    #[must_use]
    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Short label for host displays, e.g. `GET https://api.example.com/users`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Set the response unless one is already present
    pub(crate) fn set_response(&mut self, response: CapturedResponse) -> bool {
        if self.response.is_some() {
            return false;
        }
        self.response = Some(response);
        true
    }
}
