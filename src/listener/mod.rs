//! Status listeners and per-session delivery
//!
//! Each session owns a [`ListenerRegistry`] with one slot per channel. The
//! dispatcher enqueues events onto a bounded queue per channel; a delivery
//! worker drains the queue and invokes whatever listener occupies the slot
//! at that moment. A full queue is waited on for at most `sink_timeout`,
//! after which the event is dropped with a warning.

mod logging;


pub use logging::LoggingListener;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;

use crate::error::{CastError, Result};
use crate::types::{ChannelKind, MonitorConfig, StatusEvent};

/// Receiver of status events
///
/// Methods are called from a delivery worker, one event at a time and in
/// receipt order per channel. They should return promptly.
pub trait StatusListener: Send + Sync {
    /// Called for every event on the device channel
    fn new_cast_status(&self, event: &StatusEvent) {
        let _ = event;
    }

    /// Called for every event on the media channel
    fn new_media_status(&self, event: &StatusEvent) {
        let _ = event;
    }
}

type SharedListener = Arc<dyn StatusListener>;
type ListenerSlot = Arc<RwLock<Option<SharedListener>>>;

struct Channel {
    kind: ChannelKind,
    listener: ListenerSlot,
    queue: Mutex<Option<mpsc::Sender<StatusEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    fn spawn(kind: ChannelKind, device_name: &str, depth: usize) -> Self {
        let listener: ListenerSlot = Arc::new(RwLock::new(None));
        let (tx, rx) = mpsc::channel(depth.max(1));
        let worker = tokio::spawn(deliver(
            rx,
            Arc::clone(&listener),
            kind,
            device_name.to_string(),
        ));
        Self {
            kind,
            listener,
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }
}

/// Listener slots and delivery queues of one session
pub struct ListenerRegistry {
    device_name: String,
    sink_timeout: Duration,
    closed: AtomicBool,
    device: Channel,
    media: Channel,
}

impl ListenerRegistry {
    /// Create a registry and spawn its delivery workers
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(device_name: &str, config: &MonitorConfig) -> Self {
        Self {
            device_name: device_name.to_string(),
            sink_timeout: config.sink_timeout,
            closed: AtomicBool::new(false),
            device: Channel::spawn(ChannelKind::Device, device_name, config.listener_queue_depth),
            media: Channel::spawn(ChannelKind::Media, device_name, config.listener_queue_depth),
        }
    }

    fn channel(&self, kind: ChannelKind) -> &Channel {
        match kind {
            ChannelKind::Device => &self.device,
            ChannelKind::Media => &self.media,
        }
    }

    /// Attach a listener to an empty slot
    ///
    /// # Errors
    ///
    /// Returns `ListenerAlreadyRegistered` if the slot is occupied and
    /// `InvalidState` once the registry has been shut down.
    pub fn attach(&self, kind: ChannelKind, listener: Arc<dyn StatusListener>) -> Result<()> {
        if self.is_closed() {
            return Err(CastError::InvalidState {
                message: format!("cannot register a {kind} listener on a finished session"),
                current_state: "terminal".to_string(),
            });
        }

        let mut slot = self.channel(kind).listener.write();
        if slot.is_some() {
            return Err(CastError::ListenerAlreadyRegistered {
                device_name: self.device_name.clone(),
                channel: kind,
            });
        }
        *slot = Some(listener);
        tracing::debug!(device = %self.device_name, channel = %kind, "listener attached");
        Ok(())
    }

    /// Remove and return the listener of a slot
    pub fn detach(&self, kind: ChannelKind) -> Option<Arc<dyn StatusListener>> {
        let removed = self.channel(kind).listener.write().take();
        if removed.is_some() {
            tracing::debug!(device = %self.device_name, channel = %kind, "listener detached");
        }
        removed
    }

    /// Whether a listener occupies the slot
    #[must_use]
    pub fn is_attached(&self, kind: ChannelKind) -> bool {
        self.channel(kind).listener.read().is_some()
    }

    /// Whether `shutdown` has started
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue an event for the listener of its channel
    ///
    /// Events for an empty slot are dropped.
    pub(crate) async fn notify(&self, event: StatusEvent) {
        let channel = self.channel(event.channel);
        if channel.listener.read().is_none() {
            return;
        }
        let Some(queue) = channel.queue.lock().clone() else {
            return;
        };

        match queue.send_timeout(event, self.sink_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(event)) => {
                tracing::warn!(
                    device = %self.device_name,
                    channel = %channel.kind,
                    timeout = ?self.sink_timeout,
                    "listener too slow, dropping event from {}",
                    event.timestamp
                );
            }
            Err(SendTimeoutError::Closed(_)) => {}
        }
    }

    /// Stop accepting events, deliver what is queued, and stop the workers
    ///
    /// Workers still busy after `drain_timeout` are aborted. Idempotent.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.closed.store(true, Ordering::Release);

        let mut workers = Vec::new();
        for channel in [&self.device, &self.media] {
            channel.queue.lock().take();
            if let Some(worker) = channel.worker.lock().take() {
                workers.push(worker);
            }
        }
        if workers.is_empty() {
            return;
        }

        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(drain_timeout, futures::future::join_all(workers))
            .await
            .is_err()
        {
            tracing::warn!(
                device = %self.device_name,
                "listener delivery did not drain within {drain_timeout:?}"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        for channel in [&self.device, &self.media] {
            if let Some(worker) = channel.worker.lock().take() {
                worker.abort();
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("device_name", &self.device_name)
            .field("device_attached", &self.is_attached(ChannelKind::Device))
            .field("media_attached", &self.is_attached(ChannelKind::Media))
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn deliver(
    mut queue: mpsc::Receiver<StatusEvent>,
    slot: ListenerSlot,
    kind: ChannelKind,
    device_name: String,
) {
    while let Some(event) = queue.recv().await {
        let listener = slot.read().clone();
        let Some(listener) = listener else {
            continue;
        };

        let result = catch_unwind(AssertUnwindSafe(|| match kind {
            ChannelKind::Device => listener.new_cast_status(&event),
            ChannelKind::Media => listener.new_media_status(&event),
        }));
        if result.is_err() {
            tracing::error!(device = %device_name, channel = %kind, "listener panicked");
        }
    }
}
