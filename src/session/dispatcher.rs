//! Per-session receive loop

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::state::{SessionShared, SessionState};
use crate::error::{CastError, Result};
use crate::listener::ListenerRegistry;
use crate::net::BoxedStream;
use crate::protocol::cast::{
    CastCodec, CastMessage, CodecError, Inbound, InboundMessage, classify, namespace,
};
use crate::types::{
    ChannelKind, DisconnectReason, EventPayload, MIN_HEARTBEAT_INTERVAL, MediaStatus,
    MonitorConfig, ReceiverStatus, StatusEvent,
};

/// Framed control channel plus sender-side bookkeeping
pub(crate) struct Connection {
    framed: Framed<BoxedStream, CastCodec>,
    device_name: String,
    sender_id: String,
    next_request_id: u64,
}

impl Connection {
    pub(crate) fn new(stream: BoxedStream, device_name: &str, sender_id: &str) -> Self {
        Self {
            framed: Framed::new(stream, CastCodec::new()),
            device_name: device_name.to_string(),
            sender_id: sender_id.to_string(),
            next_request_id: 1,
        }
    }

    async fn send(
        &mut self,
        destination: &str,
        ns: &str,
        payload: &Value,
    ) -> std::result::Result<(), CodecError> {
        tracing::trace!(device = %self.device_name, destination, ns, %payload, "send");
        self.framed
            .send(CastMessage::json(
                self.sender_id.as_str(),
                destination,
                ns,
                payload,
            ))
            .await
    }

    async fn open_virtual_connection(
        &mut self,
        destination: &str,
    ) -> std::result::Result<(), CodecError> {
        self.send(destination, namespace::CONNECTION, &namespace::connect())
            .await
    }

    async fn request_status(
        &mut self,
        destination: &str,
        ns: &str,
    ) -> std::result::Result<(), CodecError> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.send(destination, ns, &namespace::get_status(request_id))
            .await
    }

    fn handshake_error(&self, message: &str, source: Option<CastError>) -> CastError {
        CastError::ConnectionFailed {
            device_name: self.device_name.clone(),
            message: message.to_string(),
            source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
        }
    }

    /// `CONNECT` + `GET_STATUS` on the platform receiver, then wait for the
    /// first receiver status
    ///
    /// # Errors
    ///
    /// Returns `HandshakeTimeout` if no status arrives within `timeout`, and
    /// `ConnectionFailed` if the device closes or the stream breaks first.
    pub(crate) async fn handshake(&mut self, timeout: Duration) -> Result<ReceiverStatus> {
        let device_name = self.device_name.clone();
        match tokio::time::timeout(timeout, self.exchange_status()).await {
            Ok(result) => result,
            Err(_) => Err(CastError::HandshakeTimeout {
                device_name,
                duration: timeout,
            }),
        }
    }

    async fn exchange_status(&mut self) -> Result<ReceiverStatus> {
        self.open_virtual_connection(namespace::PLATFORM_RECEIVER_ID)
            .await
            .map_err(|e| self.handshake_error("failed to send CONNECT", Some(e.into())))?;
        self.request_status(namespace::PLATFORM_RECEIVER_ID, namespace::RECEIVER)
            .await
            .map_err(|e| self.handshake_error("failed to send GET_STATUS", Some(e.into())))?;

        loop {
            let body = match self.framed.next().await {
                Some(Ok(body)) => body,
                Some(Err(e)) => {
                    let message = "stream failed during handshake";
                    return Err(self.handshake_error(message, Some(e.into())));
                }
                None => {
                    return Err(self.handshake_error("connection closed during handshake", None));
                }
            };

            let message = match classify(&body) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(device = %self.device_name, "dropping undecodable frame: {e}");
                    continue;
                }
            };

            match message.inbound {
                Inbound::ReceiverStatus(status) => return Ok(status),
                Inbound::Ping => {
                    self.send(&message.source_id, namespace::HEARTBEAT, &namespace::pong())
                        .await
                        .map_err(|e| self.handshake_error("failed to send PONG", Some(e.into())))?;
                }
                Inbound::Close if message.source_id == namespace::PLATFORM_RECEIVER_ID => {
                    let message = "device closed the connection during handshake";
                    return Err(self.handshake_error(message, None));
                }
                other => {
                    tracing::debug!(device = %self.device_name, ?other, "ignored during handshake");
                }
            }
        }
    }
}

enum Exit {
    Cancelled,
    Failed(DisconnectReason),
}

/// Receive loop of one session
pub(crate) struct Dispatcher {
    connection: Connection,
    device_name: String,
    shared: Arc<SessionShared>,
    registry: Arc<ListenerRegistry>,
    cancel: CancellationToken,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    drain_timeout: Duration,
    media_transport: Option<String>,
    last_activity: Instant,
}

impl Dispatcher {
    pub(crate) fn new(
        connection: Connection,
        shared: Arc<SessionShared>,
        registry: Arc<ListenerRegistry>,
        cancel: CancellationToken,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            device_name: connection.device_name.clone(),
            connection,
            shared,
            registry,
            cancel,
            heartbeat_interval: config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            heartbeat_timeout: config.heartbeat_timeout,
            drain_timeout: config.close_timeout,
            media_transport: None,
            last_activity: Instant::now(),
        }
    }

    /// Run until cancelled or the connection fails
    pub(crate) async fn run(mut self, initial: ReceiverStatus) {
        let exit = match self.track_media_app(&initial).await {
            ControlFlow::Break(reason) => Exit::Failed(reason),
            ControlFlow::Continue(()) => self.receive_loop().await,
        };

        match exit {
            Exit::Cancelled => self.close_virtual_connections().await,
            Exit::Failed(reason) => self.fail(reason).await,
        }
        tracing::debug!(device = %self.device_name, "dispatcher stopped");
    }

    async fn receive_loop(&mut self) -> Exit {
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Exit::Cancelled,

                _ = heartbeat.tick() => {
                    if self.last_activity.elapsed() > self.heartbeat_timeout {
                        return Exit::Failed(DisconnectReason::HeartbeatTimeout);
                    }
                    if let Err(e) = self
                        .connection
                        .send(
                            namespace::PLATFORM_RECEIVER_ID,
                            namespace::HEARTBEAT,
                            &namespace::ping(),
                        )
                        .await
                    {
                        return Exit::Failed(DisconnectReason::ConnectionLost(e.to_string()));
                    }
                }

                frame = self.connection.framed.next() => match frame {
                    Some(Ok(body)) => {
                        let received_at = Utc::now();
                        self.last_activity = Instant::now();
                        let flow = self.handle_frame(&body, received_at).await;
                        if let ControlFlow::Break(reason) = flow {
                            return Exit::Failed(reason);
                        }
                    }
                    Some(Err(e @ CodecError::FrameTooLarge { .. })) => {
                        return Exit::Failed(DisconnectReason::FramingError(e.to_string()));
                    }
                    Some(Err(CodecError::Io(e))) => {
                        return Exit::Failed(DisconnectReason::ConnectionLost(e.to_string()));
                    }
                    None => {
                        return Exit::Failed(DisconnectReason::ConnectionLost(
                            "connection closed by device".to_string(),
                        ));
                    }
                },
            }
        }
    }

    async fn handle_frame(
        &mut self,
        body: &[u8],
        received_at: DateTime<Utc>,
    ) -> ControlFlow<DisconnectReason> {
        let InboundMessage { source_id, inbound } = match classify(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(device = %self.device_name, "dropping undecodable frame: {e}");
                return ControlFlow::Continue(());
            }
        };

        match inbound {
            Inbound::ReceiverStatus(status) => {
                self.track_media_app(&status).await?;
                self.shared.set_last_device(status.clone());
                self.publish(ChannelKind::Device, EventPayload::DeviceStatus(status), received_at)
                    .await;
            }
            Inbound::MediaStatus(status) => self.publish_media(status, received_at).await,
            Inbound::Ping => {
                if let Err(e) = self
                    .connection
                    .send(&source_id, namespace::HEARTBEAT, &namespace::pong())
                    .await
                {
                    return ControlFlow::Break(DisconnectReason::ConnectionLost(e.to_string()));
                }
            }
            Inbound::Pong => tracing::trace!(device = %self.device_name, "heartbeat pong"),
            Inbound::Close if source_id == namespace::PLATFORM_RECEIVER_ID => {
                return ControlFlow::Break(DisconnectReason::DeviceClosed);
            }
            Inbound::Close => {
                if self.media_transport.as_deref() == Some(source_id.as_str()) {
                    tracing::debug!(
                        device = %self.device_name,
                        transport = %source_id,
                        "media application closed its connection"
                    );
                    self.media_transport = None;
                }
            }
            Inbound::Other { namespace, kind } => {
                tracing::debug!(device = %self.device_name, %namespace, ?kind, "ignoring message");
            }
        }
        ControlFlow::Continue(())
    }

    async fn publish_media(&mut self, status: MediaStatus, received_at: DateTime<Utc>) {
        self.shared.set_last_media(status.clone());
        self.publish(ChannelKind::Media, EventPayload::MediaStatus(status), received_at)
            .await;
    }

    async fn publish(
        &mut self,
        channel: ChannelKind,
        payload: EventPayload,
        observed: DateTime<Utc>,
    ) {
        if self.shared.state().is_terminal() {
            return;
        }
        let event = StatusEvent {
            channel,
            device: self.device_name.clone(),
            timestamp: self.shared.stamp(channel, observed),
            payload,
        };
        self.registry.notify(event).await;
    }

    /// Follow the application that owns the media namespace
    async fn track_media_app(&mut self, status: &ReceiverStatus) -> ControlFlow<DisconnectReason> {
        let transport = status
            .applications
            .iter()
            .find(|app| app.supports_namespace(namespace::MEDIA))
            .and_then(|app| app.transport_id.clone());

        if transport == self.media_transport {
            return ControlFlow::Continue(());
        }

        if let Some(old) = self.media_transport.take() {
            tracing::debug!(device = %self.device_name, transport = %old, "media application gone");
        }

        if let Some(transport) = transport {
            let opened = async {
                self.connection.open_virtual_connection(&transport).await?;
                self.connection
                    .request_status(&transport, namespace::MEDIA)
                    .await
            };
            if let Err(e) = opened.await {
                return ControlFlow::Break(DisconnectReason::ConnectionLost(e.to_string()));
            }
            tracing::debug!(
                device = %self.device_name,
                %transport,
                "connected to media application"
            );
            self.media_transport = Some(transport);
        }
        ControlFlow::Continue(())
    }

    async fn close_virtual_connections(&mut self) {
        let mut destinations: Vec<String> = self.media_transport.take().into_iter().collect();
        destinations.push(namespace::PLATFORM_RECEIVER_ID.to_string());

        for destination in destinations {
            if let Err(e) = self
                .connection
                .send(&destination, namespace::CONNECTION, &namespace::close())
                .await
            {
                tracing::debug!(
                    device = %self.device_name,
                    %destination,
                    "failed to send CLOSE: {e}"
                );
                break;
            }
        }
        let _ = self.connection.framed.close().await;
    }

    async fn fail(&mut self, reason: DisconnectReason) {
        if !self.shared.transition(SessionState::Failed) {
            return;
        }
        tracing::warn!(device = %self.device_name, %reason, "session failed");

        let now = Utc::now();
        for channel in ChannelKind::ALL {
            let event = StatusEvent {
                channel,
                device: self.device_name.clone(),
                payload: EventPayload::SessionEnded {
                    reason: reason.clone(),
                },
                timestamp: self.shared.stamp(channel, now),
            };
            self.registry.notify(event).await;
        }
        self.registry.shutdown(self.drain_timeout).await;
    }
}
