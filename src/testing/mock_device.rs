//! Mock Cast device for testing purposes.
//!
//! Answers the sender handshake (`CONNECT`, receiver `GET_STATUS`), media
//! `GET_STATUS` and heartbeat `PING`s, records everything it receives, and
//! lets a test push arbitrary frames, raw bytes, or a disconnect.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::{Notify, mpsc};
use tokio_util::codec::Framed;

use super::create_test_device;
use crate::protocol::cast::{CastCodec, CastMessage, namespace};
use crate::types::CastDevice;

/// App id of the default media receiver
pub const DEFAULT_MEDIA_RECEIVER: &str = "CC1AD845";

/// Configuration for the mock device.
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Friendly name reported by [`MockCastDevice::device`].
    pub name: String,
    /// `status` object of `RECEIVER_STATUS` replies.
    pub receiver_status: Value,
    /// `status` array of `MEDIA_STATUS` replies.
    pub media_status: Value,
    /// Whether receiver `GET_STATUS` is answered.
    pub answer_status: bool,
    /// Whether `PING` is answered with `PONG`.
    pub answer_pings: bool,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            name: "Mock Chromecast".to_string(),
            receiver_status: idle_receiver_status(),
            media_status: json!([]),
            answer_status: true,
            answer_pings: true,
        }
    }
}

impl MockDeviceConfig {
    /// Config with the given friendly name
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Receiver status with no running application.
#[must_use]
pub fn idle_receiver_status() -> Value {
    json!({
        "applications": [],
        "volume": {"level": 0.5, "muted": false},
        "isActiveInput": true,
        "isStandBy": false,
    })
}

/// Receiver status with the default media receiver running on `transport_id`.
#[must_use]
pub fn media_app_status(transport_id: &str) -> Value {
    json!({
        "applications": [{
            "appId": DEFAULT_MEDIA_RECEIVER,
            "displayName": "Default Media Receiver",
            "sessionId": format!("session-{transport_id}"),
            "statusText": "Ready To Cast",
            "transportId": transport_id,
            "namespaces": [{"name": namespace::MEDIA}],
            "isIdleScreen": false,
        }],
        "volume": {"level": 0.5, "muted": false},
    })
}

/// A single media session entry for `MEDIA_STATUS`.
#[must_use]
pub fn media_session(player_state: &str, current_time: f64) -> Value {
    json!({
        "mediaSessionId": 1,
        "playerState": player_state,
        "currentTime": current_time,
        "playbackRate": 1,
        "media": {
            "contentId": "http://example.invalid/track.mp3",
            "contentType": "audio/mpeg",
            "streamType": "BUFFERED",
            "duration": 215.5,
            "metadata": {"title": "Test Track", "artist": "Test Artist"},
        },
    })
}

enum Command {
    Send(CastMessage),
    Raw(Vec<u8>),
    Disconnect,
}

#[derive(Default)]
struct Shared {
    received: Mutex<Vec<CastMessage>>,
    notify: Notify,
    connection: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

/// A mock Cast device.
///
/// One connection is served at a time; commands go to the most recent one.
pub struct MockCastDevice {
    config: MockDeviceConfig,
    shared: Arc<Shared>,
    address: Option<SocketAddr>,
    accept_task: Option<tokio::task::JoinHandle<()>>,
}

impl MockCastDevice {
    /// Start a mock device listening on an ephemeral localhost port
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(config: MockDeviceConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let address = listener.local_addr()?;
        let shared = Arc::new(Shared::default());

        let accept_task = {
            let shared = Arc::clone(&shared);
            let config = config.clone();
            tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, _)) => {
                            let _ = stream.set_nodelay(true);
                            spawn_connection(stream, Arc::clone(&shared), config.clone());
                        }
                        Err(e) => {
                            tracing::error!("mock device accept error: {e}");
                            break;
                        }
                    }
                }
            })
        };

        Ok(Self {
            config,
            shared,
            address: Some(address),
            accept_task: Some(accept_task),
        })
    }

    /// Create a mock device served over an in-memory pipe
    ///
    /// Returns the device and the sender end of the pipe.
    #[must_use]
    pub fn duplex(config: MockDeviceConfig) -> (Self, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let shared = Arc::new(Shared::default());
        spawn_connection(server, Arc::clone(&shared), config.clone());
        (
            Self {
                config,
                shared,
                address: None,
                accept_task: None,
            },
            client,
        )
    }

    /// Local address, for TCP devices
    #[must_use]
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Descriptor pointing at this mock device
    #[must_use]
    pub fn device(&self) -> CastDevice {
        let addr = self
            .address
            .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
        create_test_device(&self.config.name, addr.ip(), addr.port())
    }

    fn command(&self, command: Command) -> bool {
        self.shared
            .connection
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    /// Send any message to the connected sender; false if none is connected
    pub fn send(&self, message: CastMessage) -> bool {
        self.command(Command::Send(message))
    }

    /// Push an unsolicited `RECEIVER_STATUS`
    pub fn send_receiver_status(&self, status: Value) -> bool {
        self.send(CastMessage::json(
            namespace::PLATFORM_RECEIVER_ID,
            "*",
            namespace::RECEIVER,
            &json!({"type": "RECEIVER_STATUS", "requestId": 0, "status": status}),
        ))
    }

    /// Push an unsolicited `MEDIA_STATUS` from `transport_id`
    pub fn send_media_status(&self, transport_id: &str, sessions: Value) -> bool {
        self.send(CastMessage::json(
            transport_id,
            "*",
            namespace::MEDIA,
            &json!({"type": "MEDIA_STATUS", "requestId": 0, "status": sessions}),
        ))
    }

    /// Close the platform virtual connection from the device side
    pub fn send_close(&self) -> bool {
        self.send(CastMessage::json(
            namespace::PLATFORM_RECEIVER_ID,
            "*",
            namespace::CONNECTION,
            &namespace::close(),
        ))
    }

    /// Write raw bytes, bypassing the codec
    pub fn send_raw(&self, bytes: Vec<u8>) -> bool {
        self.command(Command::Raw(bytes))
    }

    /// Drop the connection without a `CLOSE`
    pub fn disconnect(&self) -> bool {
        self.command(Command::Disconnect)
    }

    /// Everything received so far
    #[must_use]
    pub fn received(&self) -> Vec<CastMessage> {
        self.shared.received.lock().clone()
    }

    /// Received messages whose JSON `type` equals `kind` on `ns`
    #[must_use]
    pub fn received_of(&self, ns: &str, kind: &str) -> Vec<CastMessage> {
        self.received()
            .into_iter()
            .filter(|m| m.namespace == ns && message_type(m).as_deref() == Some(kind))
            .collect()
    }

    /// Wait until a message matching `predicate` has been received
    pub async fn wait_for_message<F>(&self, timeout: Duration, predicate: F) -> Option<CastMessage>
    where
        F: Fn(&CastMessage) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.shared.notify.notified();
            if let Some(found) = self.shared.received.lock().iter().find(|m| predicate(m)) {
                return Some(found.clone());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }
}

impl Drop for MockCastDevice {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        self.command(Command::Disconnect);
    }
}

/// JSON `type` of a message payload
#[must_use]
pub fn message_type(message: &CastMessage) -> Option<String> {
    let value: Value = serde_json::from_str(message.payload_utf8()?).ok()?;
    value.get("type")?.as_str().map(ToString::to_string)
}

fn spawn_connection<S>(stream: S, shared: Arc<Shared>, config: MockDeviceConfig)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    *shared.connection.lock() = Some(tx);
    tokio::spawn(serve(stream, shared, config, rx));
}

async fn serve<S>(
    stream: S,
    shared: Arc<Shared>,
    config: MockDeviceConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut framed = Framed::new(stream, CastCodec::new());

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(Ok(body)) = frame else { break };
                let Ok(message) = CastMessage::decode_body(&body) else { continue };
                let replies = respond(&config, &message);
                shared.received.lock().push(message);
                shared.notify.notify_waiters();
                for reply in replies {
                    if framed.send(reply).await.is_err() {
                        return;
                    }
                }
            }
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if framed.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Command::Raw(bytes)) => {
                    let _ = SinkExt::<CastMessage>::flush(&mut framed).await;
                    if framed.get_mut().write_all(&bytes).await.is_err() {
                        break;
                    }
                    let _ = AsyncWriteExt::flush(framed.get_mut()).await;
                }
                Some(Command::Disconnect) | None => break,
            }
        }
    }

    let _ = framed.get_mut().shutdown().await;
}

fn respond(config: &MockDeviceConfig, message: &CastMessage) -> Vec<CastMessage> {
    let Some(kind) = message_type(message) else {
        return Vec::new();
    };
    let request_id = message
        .payload_utf8()
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .and_then(|v| v.get("requestId").and_then(Value::as_u64))
        .unwrap_or(0);

    let reply = |ns: &str, payload: Value| {
        CastMessage::json(
            message.destination_id.clone(),
            message.source_id.clone(),
            ns,
            &payload,
        )
    };

    match (message.namespace.as_str(), kind.as_str()) {
        (namespace::HEARTBEAT, "PING") if config.answer_pings => {
            vec![reply(namespace::HEARTBEAT, namespace::pong())]
        }
        (namespace::RECEIVER, "GET_STATUS") if config.answer_status => vec![reply(
            namespace::RECEIVER,
            json!({
                "type": "RECEIVER_STATUS",
                "requestId": request_id,
                "status": config.receiver_status,
            }),
        )],
        (namespace::MEDIA, "GET_STATUS") => vec![reply(
            namespace::MEDIA,
            json!({
                "type": "MEDIA_STATUS",
                "requestId": request_id,
                "status": config.media_status,
            }),
        )],
        _ => Vec::new(),
    }
}
