//! Progress channel between a worker and the consumer loop
//!
//! Workers only ever talk to the outside through [`ProgressEvent`]s. The
//! channel is unbounded so a worker never waits on a slow consumer, and the
//! receiving side is drained with [`ProgressReceiver::drain`], which never blocks.
//! Events from one worker arrive in the order they were sent; there is no
//! ordering between two workers.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// One message from a running worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log { message: String },
    Progress { percent: u8, label: String },
    Error { message: String },
    /// Terminal: the run finished, successfully or not
    Completed { success: bool, message: String },
    /// Terminal: the run stopped at a cancellation check
    Cancelled { message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Cancelled { .. }
        )
    }
}

/// Create a connected sender/receiver pair
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressReceiver { rx })
}

/// Worker side of the channel. Every event is mirrored into the log.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    pub fn send(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Log { message } => info!("{}", message),
            ProgressEvent::Progress { percent, label } => debug!(percent, "{}", label),
            ProgressEvent::Error { message } => error!("{}", message),
            ProgressEvent::Completed { success: true, message } => info!("{}", message),
            ProgressEvent::Completed { success: false, message } => warn!("{}", message),
            ProgressEvent::Cancelled { message } => warn!("{}", message),
        }
        // A consumer that went away must not fail the run
        if self.tx.send(event).is_err() {
            debug!("Progress receiver dropped; event discarded");
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Log {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: u8, label: impl Into<String>) {
        self.send(ProgressEvent::Progress {
            percent: percent.min(100),
            label: label.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Error {
            message: message.into(),
        });
    }

    pub fn completed(&self, success: bool, message: impl Into<String>) {
        self.send(ProgressEvent::Completed {
            success,
            message: message.into(),
        });
    }

    pub fn cancelled(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Cancelled {
            message: message.into(),
        });
    }
}

/// Consumer side of the channel
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Take every event queued so far without waiting
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event; `None` once the worker is gone and the queue is empty
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Wait until the worker is gone and return everything it sent
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

/// `floor(done / total * 100)`, 100 when `total` is zero
pub fn floor_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}

/// `round(done / total * 100)`, 100 when `total` is zero
pub fn rounded_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = done.min(total) as f64 / total as f64;
    (ratio * 100.0).round() as u8
}
