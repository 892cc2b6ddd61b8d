//! Device sessions
//!
//! A [`CastSession`] owns one control connection. Opening performs the
//! handshake; afterwards a dispatcher task decodes frames, keeps the
//! heartbeat going and forwards status events to the session's listener
//! registry.

mod dispatcher;
mod state;

#[cfg(test)]
mod tests;

pub use state::SessionState;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CastError, Result};
use crate::listener::{ListenerRegistry, StatusListener};
use crate::net::{self, BoxedStream};
use crate::types::{CastDevice, ChannelKind, EventPayload, MonitorConfig};
use dispatcher::{Connection, Dispatcher};
use state::SessionShared;

/// A live connection to one Cast device
pub struct CastSession {
    device: CastDevice,
    config: MonitorConfig,
    shared: Arc<SessionShared>,
    registry: Arc<ListenerRegistry>,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl CastSession {
    /// Connect to a device and perform the handshake
    ///
    /// # Errors
    ///
    /// Returns `ConnectionTimeout` or `ConnectionFailed` if the control port
    /// cannot be reached, and `HandshakeTimeout` if the device does not
    /// report its status within `handshake_timeout`.
    pub async fn open(device: CastDevice, config: MonitorConfig) -> Result<Self> {
        let stream = net::connect(&device, config.transport, config.connection_timeout).await?;
        Self::establish(device, stream, config, None).await
    }

    /// Like [`CastSession::open`], with `listener` attached to both channels
    ///
    /// The listener is in place before the dispatcher starts, so it also
    /// receives the reply to the first media status request.
    ///
    /// # Errors
    ///
    /// Fails like [`CastSession::open`].
    pub async fn open_with_listener(
        device: CastDevice,
        config: MonitorConfig,
        listener: Arc<dyn StatusListener>,
    ) -> Result<Self> {
        let stream = net::connect(&device, config.transport, config.connection_timeout).await?;
        Self::establish(device, stream, config, Some(listener)).await
    }

    /// Perform the handshake over an already connected stream
    ///
    /// # Errors
    ///
    /// Returns `HandshakeTimeout` if the device does not report its status in
    /// time, or `ConnectionFailed` if the stream closes first.
    pub async fn open_with_stream<S>(
        device: CastDevice,
        stream: S,
        config: MonitorConfig,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::establish(device, stream, config, None).await
    }

    pub(crate) async fn establish<S>(
        device: CastDevice,
        stream: S,
        config: MonitorConfig,
        listener: Option<Arc<dyn StatusListener>>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(SessionShared::new(Utc::now()));
        let stream: BoxedStream = Box::new(stream);
        let mut connection = Connection::new(stream, &device.name, &config.sender_id);

        let initial = connection.handshake(config.handshake_timeout).await?;
        tracing::info!(device = %device.name, addr = %device.socket_addr(), "connected");

        shared.set_last_device(initial.clone());
        shared.transition(SessionState::Ready);

        let registry = Arc::new(ListenerRegistry::new(&device.name, &config));
        if let Some(listener) = listener {
            for kind in ChannelKind::ALL {
                registry.attach(kind, Arc::clone(&listener))?;
            }
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            connection,
            Arc::clone(&shared),
            Arc::clone(&registry),
            cancel.clone(),
            &config,
        );
        let handle = tokio::spawn(dispatcher.run(initial));

        Ok(Self {
            device,
            config,
            shared,
            registry,
            cancel,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Attach a listener to a channel
    ///
    /// # Errors
    ///
    /// Returns `ListenerAlreadyRegistered` if the channel already has a
    /// listener, and `InvalidState` if the session has ended.
    pub fn register(&self, kind: ChannelKind, listener: Arc<dyn StatusListener>) -> Result<()> {
        let state = self.state();
        if state.is_terminal() {
            return Err(CastError::InvalidState {
                message: format!("cannot register a {kind} listener on {}", self.device.name),
                current_state: state.to_string(),
            });
        }
        self.registry.attach(kind, listener)
    }

    /// Detach the listener of a channel
    pub fn unregister(&self, kind: ChannelKind) -> Option<Arc<dyn StatusListener>> {
        self.registry.detach(kind)
    }

    /// Close all virtual connections and stop the session
    ///
    /// Events already queued are delivered before this returns; nothing is
    /// delivered afterwards. Idempotent.
    pub async fn close(&self) {
        let mut dispatcher = self.dispatcher.lock().await;
        let transitioned = self.shared.transition(SessionState::Closed);
        self.cancel.cancel();

        if let Some(handle) = dispatcher.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(self.config.close_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(device = %self.device.name, "dispatcher ended abnormally: {e}");
                }
                Err(_) => {
                    tracing::warn!(device = %self.device.name, "dispatcher did not stop in time");
                    abort.abort();
                }
            }
        }
        self.registry.shutdown(self.config.close_timeout).await;

        if transitioned {
            tracing::info!(device = %self.device.name, "session closed");
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Descriptor the session was opened with
    #[must_use]
    pub fn device(&self) -> &CastDevice {
        &self.device
    }

    /// When the session was opened
    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.shared.opened_at()
    }

    /// Last status seen on a channel
    #[must_use]
    pub fn last_status(&self, kind: ChannelKind) -> Option<EventPayload> {
        match kind {
            ChannelKind::Device => self.shared.last_device().map(EventPayload::DeviceStatus),
            ChannelKind::Media => self.shared.last_media().map(EventPayload::MediaStatus),
        }
    }
}

impl Drop for CastSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for CastSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastSession")
            .field("device", &self.device.name)
            .field("state", &self.state())
            .field("opened_at", &self.opened_at())
            .finish_non_exhaustive()
    }
}
