//! Browser automation capability consumed by capture sessions
//!
//! The capture pipeline never drives a browser engine directly. Hosts inject
//! an implementation of [`BrowserLauncher`]; [`ScriptedBrowser`] is an
//! in-memory implementation for tests and demos.

mod events;
mod scripted;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

pub use events::{
    BodySource, Continuation, Headers, InterceptedRequest, PageEvent, RequestId, ResourceType,
    ResponseEvent,
};
pub use scripted::{ScriptedBrowser, ScriptedRequest, ScriptedResponse};

/// Browser launch settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Run without a visible window
    pub headless: bool,
    /// Extra command-line arguments for the browser process
    pub args: Vec<String>,
}

/// Starts browser instances
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a new browser
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be started
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>>;
}

/// A running browser instance
#[async_trait]
pub trait Browser: Send {
    /// Open a new page
    ///
    /// # Errors
    ///
    /// Returns error if the page cannot be created
    async fn new_page(&mut self) -> Result<Box<dyn Page>>;

    /// Close the browser and every page it owns
    ///
    /// # Errors
    ///
    /// Returns error if the browser fails to shut down
    async fn close(&mut self) -> Result<()>;
}

/// A single browser tab
#[async_trait]
pub trait Page: Send {
    /// Enable or disable request interception
    ///
    /// While enabled, every request is held until its
    /// [`InterceptedRequest::resume`] is called.
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects the setting
    async fn set_request_interception(&mut self, enabled: bool) -> Result<()>;

    /// Subscribe to the page's network and lifecycle events
    ///
    /// # Errors
    ///
    /// Returns error if the page already has a subscriber
    fn subscribe(&mut self, buffer: usize) -> Result<mpsc::Receiver<PageEvent>>;

    /// Navigate to `url`
    ///
    /// # Errors
    ///
    /// Returns error if navigation fails
    async fn goto(&mut self, url: &str) -> Result<()>;
}
