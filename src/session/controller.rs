//! Capture session lifecycle

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::browser::{Browser, BrowserLauncher, Page};
use crate::capture::{
    CaptureStore, CapturedExchange, CorrelationIndex, ExchangeId, RequestInterceptor,
    ResponseCorrelator, StoreEvent,
};
use crate::config::Config;
use crate::script::ScriptGenerator;
use crate::{ApiscribeError, Result};

use super::event_loop::{drain_body_reads, EventLoop, Finished, LoopExit};
use super::prompt::{persist, DestinationPrompt};

/// Lifecycle state of a [`SessionController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session is running
    Idle,
    /// A browser is open and traffic is being captured
    Capturing,
}

/// Outcome of [`SessionController::stop`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Whether a session was actually running
    pub was_capturing: bool,
    /// Exchanges in the log when the session ended
    pub exchanges: usize,
    /// Whether a script was generated
    pub generated: bool,
    /// Where the script was written, if the user picked a destination
    pub saved_to: Option<PathBuf>,
}

struct ActiveSession {
    epoch: u64,
    browser: Box<dyn Browser>,
    page: Box<dyn Page>,
    shutdown_tx: broadcast::Sender<()>,
    event_loop: JoinHandle<Finished>,
}

enum State {
    Idle,
    Capturing(ActiveSession),
}

#[derive(Default)]
struct SavedTargets {
    site_url: Option<String>,
    api_base_url: Option<String>,
}

struct Inner {
    launcher: Arc<dyn BrowserLauncher>,
    prompt: Arc<dyn DestinationPrompt>,
    config: Config,
    generator: ScriptGenerator,
    store: CaptureStore,
    targets: parking_lot::Mutex<SavedTargets>,
    state: Mutex<State>,
    epoch: AtomicU64,
}

/// Owns the browser and the exchange log for one capture at a time
///
/// Clones share the same controller.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Create an idle controller
    pub fn new(
        config: Config,
        launcher: Arc<dyn BrowserLauncher>,
        prompt: Arc<dyn DestinationPrompt>,
    ) -> Self {
        let targets = SavedTargets {
            site_url: config.site_url.clone(),
            api_base_url: config.api_base_url.clone(),
        };
        let generator = ScriptGenerator::with_options(config.output.generator_options());

        Self {
            inner: Arc::new(Inner {
                launcher,
                prompt,
                config,
                generator,
                store: CaptureStore::new(),
                targets: parking_lot::Mutex::new(targets),
                state: Mutex::new(State::Idle),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        match *self.inner.state.lock().await {
            State::Idle => SessionState::Idle,
            State::Capturing(_) => SessionState::Capturing,
        }
    }

    /// Saved application URL
    #[must_use]
    pub fn site_url(&self) -> Option<String> {
        self.inner.targets.lock().site_url.clone()
    }

    /// Saved API base URL
    #[must_use]
    pub fn api_base_url(&self) -> Option<String> {
        self.inner.targets.lock().api_base_url.clone()
    }

    /// Save the application URL for later sessions
    pub fn set_site_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!("Application URL set to: {}", url);
        self.inner.targets.lock().site_url = Some(url);
    }

    /// Save the API base URL for later sessions
    pub fn set_api_base_url(&self, url: impl Into<String>) {
        let url = url.into();
        info!("API Base URL set to: {}", url);
        self.inner.targets.lock().api_base_url = Some(url);
    }

    /// Subscribe to exchange log changes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.store.subscribe()
    }

    /// Snapshot of the exchange log
    #[must_use]
    pub fn exchanges(&self) -> Vec<CapturedExchange> {
        self.inner.store.list()
    }

    /// Delete one exchange from the log
    ///
    /// Returns `false` if it was already gone.
    pub fn delete(&self, id: ExchangeId) -> bool {
        let removed = self.inner.store.remove(id);
        if removed {
            debug!("Deleted exchange {}", id);
        }
        removed
    }

    /// Start capturing with the saved targets
    ///
    /// # Errors
    ///
    /// Returns `MissingConfig` if either target was never set, otherwise the
    /// same errors as [`start`](Self::start)
    pub async fn start_with_saved(&self) -> Result<()> {
        let (site_url, api_base_url) = {
            let targets = self.inner.targets.lock();
            (targets.site_url.clone(), targets.api_base_url.clone())
        };

        let site_url = site_url.ok_or(ApiscribeError::MissingConfig("application URL"))?;
        let api_base_url = api_base_url.ok_or(ApiscribeError::MissingConfig("API Base URL"))?;

        self.start(&site_url, &api_base_url).await
    }

    /// Launch a browser, open `site_url`, and capture API calls under
    /// `api_base_url`
    ///
    /// Starting while a session is running is rejected; stop it first.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfig` for blank inputs, `SessionActive` if a session is
    /// running, or the browser error if launch, page setup, or navigation
    /// fails. On error the controller stays idle and no browser is left open.
    pub async fn start(&self, site_url: &str, api_base_url: &str) -> Result<()> {
        if site_url.trim().is_empty() {
            return Err(ApiscribeError::MissingConfig("application URL"));
        }
        if api_base_url.trim().is_empty() {
            return Err(ApiscribeError::MissingConfig("API Base URL"));
        }

        let mut state = self.inner.state.lock().await;
        if matches!(*state, State::Capturing(_)) {
            return Err(ApiscribeError::SessionActive);
        }

        {
            let mut targets = self.inner.targets.lock();
            targets.site_url = Some(site_url.to_string());
            targets.api_base_url = Some(api_base_url.to_string());
        }

        info!("Launching browser to capture API requests and responses...");
        let mut browser = self
            .inner
            .launcher
            .launch(&self.inner.config.browser.launch_options())
            .await?;

        match self.open_session(&mut *browser, site_url, api_base_url).await {
            Ok((epoch, page, shutdown_tx, event_loop)) => {
                *state = State::Capturing(ActiveSession {
                    epoch,
                    browser,
                    page,
                    shutdown_tx,
                    event_loop,
                });
                info!(
                    "Capturing {} (session {}, opened {})",
                    api_base_url, epoch, site_url
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to start capture session: {}", e);
                if let Err(close_err) = browser.close().await {
                    warn!("Failed to close browser: {}", close_err);
                }
                self.inner.store.clear();
                Err(e)
            }
        }
    }

    /// Wire a fresh page to the store and navigate it
    async fn open_session(
        &self,
        browser: &mut dyn Browser,
        site_url: &str,
        api_base_url: &str,
    ) -> Result<(u64, Box<dyn Page>, broadcast::Sender<()>, JoinHandle<Finished>)> {
        let mut page = browser.new_page().await?;
        page.set_request_interception(true).await?;
        let events = page.subscribe(self.inner.config.limits.event_buffer)?;

        self.inner.store.clear();
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let index = CorrelationIndex::new();
        let interceptor =
            RequestInterceptor::new(api_base_url, self.inner.store.clone(), index.clone());
        let correlator = ResponseCorrelator::new(
            self.inner.store.clone(),
            index,
            self.inner.config.limits.max_body_bytes,
        );

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (closed_tx, closed_rx) = oneshot::channel();

        let event_loop = tokio::spawn(
            EventLoop::new(events, interceptor, correlator, shutdown_rx, closed_tx).run(),
        );
        self.watch_for_close(epoch, closed_rx);

        if let Err(e) = page.goto(site_url).await {
            shutdown_tx.send(()).ok();
            if let Ok(mut finished) = event_loop.await {
                finished.body_reads.abort_all();
            }
            return Err(e);
        }

        Ok((epoch, page, shutdown_tx, event_loop))
    }

    /// Stop the session with `epoch` when its page closes
    fn watch_for_close(&self, epoch: u64, closed_rx: oneshot::Receiver<()>) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            // Sender dropped without sending: the session ended another way
            if closed_rx.await.is_err() {
                return;
            }
            let Some(inner) = inner.upgrade() else {
                return;
            };

            let controller = SessionController { inner };
            if let Err(e) = controller.stop_session(Some(epoch)).await {
                error!("Failed to stop session {} after page close: {}", epoch, e);
            }
        });
    }

    /// End the session: generate and save a script if anything was captured,
    /// close the browser, and clear the log
    ///
    /// Does nothing when idle. Cancelling the destination prompt skips saving.
    ///
    /// # Errors
    ///
    /// Returns error if the script cannot be written. The session is torn down
    /// either way.
    pub async fn stop(&self) -> Result<StopReport> {
        self.stop_session(None).await
    }

    async fn stop_session(&self, expected_epoch: Option<u64>) -> Result<StopReport> {
        let mut state = self.inner.state.lock().await;

        let session = match std::mem::replace(&mut *state, State::Idle) {
            State::Idle => return Ok(StopReport::default()),
            State::Capturing(session)
                if expected_epoch.is_some_and(|epoch| epoch != session.epoch) =>
            {
                *state = State::Capturing(session);
                return Ok(StopReport::default());
            }
            State::Capturing(session) => session,
        };

        let ActiveSession {
            epoch,
            mut browser,
            mut page,
            shutdown_tx,
            event_loop,
        } = session;

        info!("Stopping capture session {}", epoch);
        // Requests made after the loop stops must reach the network on their own
        if let Err(e) = page.set_request_interception(false).await {
            warn!("Failed to disable request interception: {}", e);
        }
        shutdown_tx.send(()).ok();

        let mut body_reads = match event_loop.await {
            Ok(finished) => {
                if finished.exit == LoopExit::PageClosed {
                    debug!("Session {} page was closed externally", epoch);
                }
                finished.body_reads
            }
            Err(e) => {
                warn!("Event loop for session {} failed: {}", epoch, e);
                JoinSet::new()
            }
        };
        drain_body_reads(
            &mut body_reads,
            Duration::from_millis(self.inner.config.limits.drain_timeout_ms),
        )
        .await;

        let exchanges = self.inner.store.list();
        let mut report = StopReport {
            was_capturing: true,
            exchanges: exchanges.len(),
            generated: false,
            saved_to: None,
        };

        let persisted = if exchanges.is_empty() {
            info!("No API calls captured, skipping script generation");
            Ok(())
        } else {
            let script = self.inner.generator.generate(&exchanges);
            report.generated = true;

            let suggested = PathBuf::from(&self.inner.config.output.default_file_name);
            match self.inner.prompt.choose_destination(&suggested).await {
                Some(path) => {
                    let result = persist(&path, &script).await;
                    if result.is_ok() {
                        report.saved_to = Some(path);
                    }
                    result
                }
                None => {
                    info!("Save cancelled, discarding generated script");
                    Ok(())
                }
            }
        };

        drop(page);
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
        self.inner.store.clear();

        info!(
            "Capture session {} stopped ({} exchanges)",
            epoch, report.exchanges
        );

        persisted.map(|()| report)
    }
}
