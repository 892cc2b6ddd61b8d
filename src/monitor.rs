//! The monitoring run behind the binary
//!
//! A [`Monitor`] resolves the requested devices, attaches one listener to
//! both channels of every session and keeps discovery running so that
//! departures show up in the log. [`Monitor::shutdown`] tears everything
//! down.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::discovery::{DiscoveryEvent, DiscoveryService};
use crate::error::{CastError, Result};
use crate::listener::{LoggingListener, StatusListener};
use crate::selector::{FailedDevice, Selection, SessionSelector};
use crate::session::CastSession;
use crate::types::{ChannelKind, MonitorConfig};

/// Running discovery plus the sessions opened for the requested names
pub struct Monitor {
    discovery: DiscoveryService,
    sessions: Vec<CastSession>,
    unmatched: BTreeSet<String>,
    failed: Vec<FailedDevice>,
    departures: JoinHandle<()>,
}

impl Monitor {
    /// Browse mDNS for `requested` and log their events
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryFailed` if mDNS cannot start, and the errors of
    /// [`Monitor::with_discovery`].
    pub async fn start<I, S>(requested: I, config: MonitorConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: Vec<String> = requested.into_iter().map(Into::into).collect();
        let discovery = DiscoveryService::start(requested.iter().cloned())?;
        Self::with_discovery(discovery, requested, config, Arc::new(LoggingListener)).await
    }

    /// Select sessions through an existing discovery service
    ///
    /// `listener` is attached to both channels of every opened session.
    /// Discovery is stopped before an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `requested` is empty and
    /// `NoDevicesAvailable` if no session could be opened.
    pub async fn with_discovery<I, S>(
        discovery: DiscoveryService,
        requested: I,
        config: MonitorConfig,
        listener: Arc<dyn StatusListener>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selector = SessionSelector::new(&discovery, config).listener(listener);
        let selection = match selector.resolve(requested).await {
            Ok(selection) => selection,
            Err(e) => {
                discovery.stop().await;
                return Err(e);
            }
        };
        log_summary(&selection);

        if selection.is_empty() {
            discovery.stop().await;
            return Err(CastError::NoDevicesAvailable {
                unmatched: selection.unmatched,
                failed: selection.failed.len(),
            });
        }

        for session in &selection.sessions {
            if let Some(status) = session.last_status(ChannelKind::Device) {
                tracing::info!(
                    target: "chromecast_monitor::status",
                    device = %session.device().name,
                    timestamp = %session.opened_at().to_rfc3339(),
                    "initial status: {status}"
                );
            }
        }

        let watched = selection
            .sessions
            .iter()
            .map(|s| s.device().name.clone())
            .collect();
        let departures = tokio::spawn(watch_departures(discovery.subscribe(), watched));

        Ok(Self {
            discovery,
            sessions: selection.sessions,
            unmatched: selection.unmatched,
            failed: selection.failed,
            departures,
        })
    }

    /// Open sessions, in requested order
    #[must_use]
    pub fn sessions(&self) -> &[CastSession] {
        &self.sessions
    }

    /// Requested names that were never discovered
    #[must_use]
    pub fn unmatched(&self) -> &BTreeSet<String> {
        &self.unmatched
    }

    /// Devices that resolved but failed to open
    #[must_use]
    pub fn failed(&self) -> &[FailedDevice] {
        &self.failed
    }

    /// Wait for `shutdown` to be cancelled, then shut down
    pub async fn run_until(self, shutdown: CancellationToken) {
        shutdown.cancelled().await;
        tracing::info!("shutting down");
        self.shutdown().await;
    }

    /// Stop discovery and close every session concurrently
    pub async fn shutdown(self) {
        self.departures.abort();
        self.discovery.stop().await;
        join_all(self.sessions.iter().map(|session| session.close())).await;
        tracing::info!("shutdown complete");
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("sessions", &self.sessions)
            .field("unmatched", &self.unmatched)
            .field("failed", &self.failed.len())
            .finish_non_exhaustive()
    }
}

fn log_summary(selection: &Selection) {
    let connected: Vec<&str> = selection
        .sessions
        .iter()
        .map(|s| s.device().name.as_str())
        .collect();
    tracing::info!(
        connected = ?connected,
        unmatched = ?selection.unmatched,
        failed = selection.failed.len(),
        "startup complete"
    );
    for name in &selection.unmatched {
        tracing::warn!(device = %name, "device not found");
    }
    for failed in &selection.failed {
        tracing::warn!(device = %failed.name, "device unavailable: {}", failed.error);
    }
}

async fn watch_departures(
    mut events: broadcast::Receiver<DiscoveryEvent>,
    watched: BTreeSet<String>,
) {
    loop {
        match events.recv().await {
            Ok(DiscoveryEvent::Removed(name)) if watched.contains(&name) => {
                tracing::warn!(device = %name, "monitored device went offline");
            }
            Ok(DiscoveryEvent::Removed(name)) => {
                tracing::debug!(device = %name, "device went offline");
            }
            Ok(DiscoveryEvent::Added(device) | DiscoveryEvent::Updated(device)) => {
                tracing::debug!(device = %device.name, "device announced");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "discovery events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
