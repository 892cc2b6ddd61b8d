//! Listener that records what it receives

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::listener::StatusListener;
use crate::types::{ChannelKind, StatusEvent};

/// Records every event, optionally sleeping in the callback to simulate a
/// slow sink.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<StatusEvent>>,
    notify: Notify,
    delay: Option<Duration>,
}

impl RecordingListener {
    /// Create a shared recording listener
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a listener that blocks for `delay` on every event
    #[must_use]
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    /// Events recorded for one channel
    #[must_use]
    pub fn events_for(&self, kind: ChannelKind) -> Vec<StatusEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.channel == kind)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` events have been recorded
    ///
    /// Returns the events seen, which may be fewer on timeout.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> Vec<StatusEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            {
                let events = self.events.lock();
                if events.len() >= count {
                    return events.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.events();
            }
        }
    }

    fn record(&self, event: &StatusEvent) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.events.lock().push(event.clone());
        self.notify.notify_waiters();
    }
}

impl StatusListener for RecordingListener {
    fn new_cast_status(&self, event: &StatusEvent) {
        self.record(event);
    }

    fn new_media_status(&self, event: &StatusEvent) {
        self.record(event);
    }
}
