//! Per-session page event dispatch

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::browser::PageEvent;
use crate::capture::{RequestInterceptor, ResponseCorrelator};

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// The controller asked it to stop
    Shutdown,
    /// The page closed or its event stream ended
    PageClosed,
}

/// What the loop hands back when it stops
pub(crate) struct Finished {
    pub exit: LoopExit,
    pub body_reads: JoinSet<bool>,
}

/// Dispatches page events to the interceptor and correlator
///
/// Requests are handled inline, so the store sees them in interception order.
/// Body reads run as tasks so a slow payload never holds up other requests.
pub(crate) struct EventLoop {
    events: mpsc::Receiver<PageEvent>,
    interceptor: RequestInterceptor,
    correlator: ResponseCorrelator,
    shutdown_rx: broadcast::Receiver<()>,
    closed_tx: Option<oneshot::Sender<()>>,
    body_reads: JoinSet<bool>,
}

impl EventLoop {
    pub fn new(
        events: mpsc::Receiver<PageEvent>,
        interceptor: RequestInterceptor,
        correlator: ResponseCorrelator,
        shutdown_rx: broadcast::Receiver<()>,
        closed_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            interceptor,
            correlator,
            shutdown_rx,
            closed_tx: Some(closed_tx),
            body_reads: JoinSet::new(),
        }
    }

    pub async fn run(mut self) -> Finished {
        let exit = loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    debug!("Event loop received shutdown signal");
                    break LoopExit::Shutdown;
                }
                event = self.events.recv() => {
                    match event {
                        Some(PageEvent::Request(request)) => {
                            self.interceptor.handle(request).await;
                        }
                        Some(PageEvent::Response(response)) => {
                            if let Some(pending) = self.correlator.correlate(response) {
                                self.body_reads.spawn(pending.read());
                            }
                        }
                        Some(PageEvent::Closed) | None => {
                            info!("Page closed, ending capture session");
                            break LoopExit::PageClosed;
                        }
                    }
                }
                Some(result) = self.body_reads.join_next(), if !self.body_reads.is_empty() => {
                    if let Err(e) = result {
                        warn!("Response body task failed: {}", e);
                    }
                }
            }
        };

        self.flush_queued().await;

        if exit == LoopExit::PageClosed {
            if let Some(closed_tx) = self.closed_tx.take() {
                closed_tx.send(()).ok();
            }
        }

        Finished {
            exit,
            body_reads: self.body_reads,
        }
    }

    /// Handle events delivered before the loop stopped
    ///
    /// Keeps the exactly-once resume guarantee for requests already queued.
    async fn flush_queued(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                PageEvent::Request(request) => {
                    self.interceptor.handle(request).await;
                }
                PageEvent::Response(response) => {
                    if let Some(pending) = self.correlator.correlate(response) {
                        self.body_reads.spawn(pending.read());
                    }
                }
                PageEvent::Closed => {
                    trace!("Ignoring close event queued behind loop exit");
                }
            }
        }
    }
}

/// Wait for in-flight body reads, then abort whatever is left
pub(crate) async fn drain_body_reads(body_reads: &mut JoinSet<bool>, timeout: Duration) {
    if body_reads.is_empty() {
        return;
    }

    let pending = body_reads.len();
    let drained = tokio::time::timeout(timeout, async {
        while let Some(result) = body_reads.join_next().await {
            if let Err(e) = result {
                warn!("Response body task failed: {}", e);
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            "Gave up on {} of {} response bodies after {:?}",
            body_reads.len(),
            pending,
            timeout
        );
        body_reads.abort_all();
    }
}
