//! Turning requested friendly names into open sessions

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;

use crate::discovery::DiscoveryService;
use crate::error::{CastError, Result};
use crate::listener::StatusListener;
use crate::session::CastSession;
use crate::types::MonitorConfig;

/// A device that resolved but could not be opened
#[derive(Debug)]
pub struct FailedDevice {
    /// Friendly name
    pub name: String,
    /// Why the open failed
    pub error: CastError,
}

/// Outcome of a selection
#[derive(Debug, Default)]
pub struct Selection {
    /// Open sessions, in requested order
    pub sessions: Vec<CastSession>,
    /// Names discovery never saw
    pub unmatched: BTreeSet<String>,
    /// Resolved devices whose session failed to open
    pub failed: Vec<FailedDevice>,
}

impl Selection {
    /// Whether no session could be opened
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Resolves names through discovery and opens sessions concurrently
pub struct SessionSelector<'a> {
    discovery: &'a DiscoveryService,
    config: MonitorConfig,
    listener: Option<Arc<dyn StatusListener>>,
}

impl<'a> SessionSelector<'a> {
    /// Create a selector over a running discovery service
    #[must_use]
    pub fn new(discovery: &'a DiscoveryService, config: MonitorConfig) -> Self {
        Self {
            discovery,
            config,
            listener: None,
        }
    }

    /// Attach `listener` to both channels of every session as it opens
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Resolve `requested` names and open a session for each one found
    ///
    /// Waits at most `discovery_timeout` for the names to appear. Names that
    /// do not resolve end up in `unmatched`; devices that fail to open end up
    /// in `failed`. Duplicate names are opened once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `requested` is empty, and propagates
    /// discovery errors other than a timeout.
    pub async fn resolve<I, S>(&self, requested: I) -> Result<Selection>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        for name in requested {
            let name = name.into();
            if !order.contains(&name) {
                order.push(name);
            }
        }
        if order.is_empty() {
            return Err(CastError::InvalidParameter {
                name: "requested".to_string(),
                message: "at least one device name is required".to_string(),
            });
        }

        let resolution = match self
            .discovery
            .wait_for(order.iter().cloned(), self.config.discovery_timeout)
            .await
        {
            Ok(resolution) => resolution,
            Err(CastError::DiscoveryTimeout { partial }) => {
                tracing::warn!(unmatched = ?partial.unresolved, "some devices were not discovered");
                partial
            }
            Err(e) => return Err(e),
        };

        let mut resolved = resolution.resolved;
        let devices: Vec<_> = order
            .iter()
            .filter_map(|name| resolved.remove(name))
            .collect();

        let opens = devices.into_iter().map(|device| {
            let config = self.config.clone();
            let listener = self.listener.clone();
            async move {
                let name = device.name.clone();
                let opened = match listener {
                    Some(listener) => {
                        CastSession::open_with_listener(device, config, listener).await
                    }
                    None => CastSession::open(device, config).await,
                };
                (name, opened)
            }
        });

        let mut selection = Selection {
            unmatched: resolution.unresolved,
            ..Selection::default()
        };
        for (name, result) in join_all(opens).await {
            match result {
                Ok(session) => selection.sessions.push(session),
                Err(error) => {
                    tracing::warn!(device = %name, "failed to open session: {error}");
                    selection.failed.push(FailedDevice { name, error });
                }
            }
        }
        Ok(selection)
    }
}

impl std::fmt::Debug for SessionSelector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSelector")
            .field("discovery", &self.discovery)
            .field("config", &self.config)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
