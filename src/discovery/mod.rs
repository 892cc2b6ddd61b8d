//! mDNS discovery of Cast devices
//!
//! A [`DiscoveryService`] runs one background task that feeds
//! advertisements into a shared registry of visible devices. Callers take
//! snapshots, subscribe to changes, or wait until a set of friendly names
//! has been seen.

mod browser;
pub mod parser;
mod registry;


pub use parser::parse_txt_records;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CastError, Result};
use crate::types::CastDevice;
use registry::DeviceRegistry;

/// Service type for Cast discovery
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Raw input to the registry, as produced by mDNS or a simulated source
#[derive(Debug, Clone, PartialEq)]
pub enum Advertisement {
    /// A service instance was resolved (or re-resolved)
    Announced {
        /// mDNS fullname of the service instance
        fullname: String,
        /// Parsed device descriptor
        device: CastDevice,
    },
    /// A service instance sent a goodbye or expired
    Departed {
        /// mDNS fullname of the service instance
        fullname: String,
    },
}

/// Registry change notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A new device was discovered
    Added(CastDevice),
    /// A known device was re-announced with different data
    Updated(CastDevice),
    /// A device went offline (friendly name)
    Removed(String),
}

/// Outcome of waiting for a set of names
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Resolved devices by friendly name
    pub resolved: BTreeMap<String, CastDevice>,
    /// Names not seen before the deadline
    pub unresolved: BTreeSet<String>,
}

impl Resolution {
    /// Whether every requested name resolved
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Browse for `timeout` and return every device seen
///
/// # Errors
///
/// Returns `DiscoveryFailed` if the mDNS daemon cannot be initialized.
pub async fn scan(timeout: Duration) -> Result<Vec<CastDevice>> {
    let discovery = DiscoveryService::start(Vec::<String>::new())?;
    tokio::time::sleep(timeout).await;
    let devices = discovery.current_devices();
    discovery.stop().await;
    Ok(devices)
}

/// Continuously running device discovery
///
/// # Example
///
/// ```rust,no_run
/// use chromecast_monitor::discovery::DiscoveryService;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), chromecast_monitor::CastError> {
/// let discovery = DiscoveryService::start(["Living Room"])?;
/// let resolution = discovery
///     .wait_for(["Living Room"], Duration::from_secs(5))
///     .await?;
/// println!("{:?}", resolution.resolved.keys());
/// discovery.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryService {
    registry: Arc<DeviceRegistry>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryService {
    /// Start mDNS browsing, accepting only `filter` names (empty accepts all)
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryFailed` if the mDNS daemon cannot be initialized.
    pub fn start<I, S>(filter: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let source = browser::browse()?;
        Ok(Self::start_with_source(source, filter))
    }

    /// Start discovery fed by an arbitrary advertisement stream
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start_with_source<St, I, S>(source: St, filter: I) -> Self
    where
        St: Stream<Item = Advertisement> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter: HashSet<String> = filter.into_iter().map(Into::into).collect();
        let registry = Arc::new(DeviceRegistry::new(filter));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(pump(source, Arc::clone(&registry), cancel.clone()));

        Self {
            registry,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Devices currently known, sorted by name
    #[must_use]
    pub fn current_devices(&self) -> Vec<CastDevice> {
        self.registry.snapshot()
    }

    /// Subscribe to add/update/remove notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.registry.subscribe()
    }

    /// Wait until every name is resolved or `timeout` elapses
    ///
    /// Returns early with what is known if discovery is stopped meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryTimeout` carrying the partial resolution if any name
    /// is still unresolved at the deadline.
    pub async fn wait_for<I, S>(&self, names: I, timeout: Duration) -> Result<Resolution>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut changes = self.registry.watch();

        loop {
            let resolution = self.registry.resolve(&names);
            if resolution.is_complete() {
                return Ok(resolution);
            }

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => break,
                () = self.cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let partial = self.registry.resolve(&names);
        if partial.is_complete() {
            Ok(partial)
        } else {
            tracing::debug!(unresolved = ?partial.unresolved, "discovery wait expired");
            Err(CastError::DiscoveryTimeout { partial })
        }
    }

    /// Whether `stop` has been called
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop browsing and release the mDNS daemon
    ///
    /// Idempotent; pending `wait_for` calls return immediately.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("discovery task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("devices", &self.registry.snapshot().len())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

async fn pump<St>(source: St, registry: Arc<DeviceRegistry>, cancel: CancellationToken)
where
    St: Stream<Item = Advertisement> + Send + 'static,
{
    let mut source = Box::pin(source);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            advertisement = source.next() => match advertisement {
                Some(advertisement) => {
                    registry.apply(advertisement);
                }
                None => {
                    tracing::debug!("advertisement source ended");
                    break;
                }
            }
        }
    }
    // Dropping the source releases the mDNS daemon
    drop(source);
    tracing::debug!("discovery stopped");
}
