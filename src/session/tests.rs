use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use super::*;
use crate::protocol::cast::{CastMessage, namespace};
use crate::testing::mock_device::{
    idle_receiver_status, media_app_status, media_session, message_type,
};
use crate::testing::{MockCastDevice, MockDeviceConfig, RecordingListener};
use crate::types::{DisconnectReason, StatusEvent, TransportSecurity};

const WAIT: Duration = Duration::from_secs(2);

fn test_config() -> MonitorConfig {
    MonitorConfig::builder()
        .handshake_timeout(Duration::from_secs(1))
        .close_timeout(Duration::from_secs(1))
        .transport(TransportSecurity::Plain)
        .build()
}

async fn open(config: MockDeviceConfig) -> (MockCastDevice, CastSession) {
    let (mock, stream) = MockCastDevice::duplex(config);
    let session = CastSession::open_with_stream(mock.device(), stream, test_config())
        .await
        .unwrap();
    (mock, session)
}

fn listen_all(session: &CastSession) -> Arc<RecordingListener> {
    let listener = RecordingListener::new();
    session
        .register(ChannelKind::Device, listener.clone())
        .unwrap();
    session
        .register(ChannelKind::Media, listener.clone())
        .unwrap();
    listener
}

fn status_with_level(level: f64) -> serde_json::Value {
    json!({"applications": [], "volume": {"level": level, "muted": false}})
}

fn volume_level(event: &StatusEvent) -> Option<f64> {
    match &event.payload {
        EventPayload::DeviceStatus(status) => status.volume.as_ref()?.level,
        _ => None,
    }
}

fn end_reason(event: &StatusEvent) -> Option<&DisconnectReason> {
    match &event.payload {
        EventPayload::SessionEnded { reason } => Some(reason),
        _ => None,
    }
}

fn is_type(message: &CastMessage, ns: &str, kind: &str, destination: &str) -> bool {
    message.namespace == ns
        && message.destination_id == destination
        && message_type(message).as_deref() == Some(kind)
}

// --- handshake ---

#[tokio::test]
async fn test_handshake_stores_initial_status() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.device().name, "Den");
    let Some(EventPayload::DeviceStatus(status)) = session.last_status(ChannelKind::Device) else {
        panic!("no initial device status");
    };
    assert_eq!(status.volume.unwrap().level, Some(0.5));
    assert!(session.last_status(ChannelKind::Media).is_none());

    let received = mock.received();
    assert!(is_type(&received[0], namespace::CONNECTION, "CONNECT", "receiver-0"));
    assert!(is_type(&received[1], namespace::RECEIVER, "GET_STATUS", "receiver-0"));
    assert_eq!(received[0].source_id, "sender-0");

    session.close().await;
}

#[tokio::test]
async fn test_handshake_timeout() {
    let config = MockDeviceConfig {
        answer_status: false,
        ..MockDeviceConfig::named("Den")
    };
    let (mock, stream) = MockCastDevice::duplex(config);
    let session_config = MonitorConfig::builder()
        .handshake_timeout(Duration::from_millis(100))
        .build();

    let result = CastSession::open_with_stream(mock.device(), stream, session_config).await;
    assert!(matches!(
        result,
        Err(CastError::HandshakeTimeout { ref device_name, .. }) if device_name == "Den"
    ));
}

#[tokio::test]
async fn test_handshake_fails_when_device_hangs_up() {
    let config = MockDeviceConfig {
        answer_status: false,
        ..MockDeviceConfig::named("Den")
    };
    let (mock, stream) = MockCastDevice::duplex(config);
    mock.disconnect();

    let result = CastSession::open_with_stream(mock.device(), stream, test_config()).await;
    assert!(matches!(result, Err(CastError::ConnectionFailed { .. })));
}

#[tokio::test]
async fn test_open_over_tcp() {
    let mock = MockCastDevice::start(MockDeviceConfig::named("Attic"))
        .await
        .unwrap();
    let session = CastSession::open(mock.device(), test_config()).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    session.close().await;
}

// --- dispatch ---

#[tokio::test]
async fn test_device_events_in_order_with_monotonic_timestamps() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    let levels: Vec<f64> = (1..=10).map(|n| f64::from(n) / 10.0).collect();
    for level in &levels {
        assert!(mock.send_receiver_status(status_with_level(*level)));
    }

    let events = listener.wait_for_count(levels.len(), WAIT).await;
    let received: Vec<_> = events.iter().filter_map(volume_level).collect();
    assert_eq!(received, levels);

    assert!(events.iter().all(|e| e.device == "Den"));
    assert!(events.iter().all(|e| e.timestamp >= session.opened_at()));
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    session.close().await;
}

#[tokio::test]
async fn test_listener_attached_at_open_sees_first_media_status() {
    let (mock, stream) = MockCastDevice::duplex(MockDeviceConfig {
        receiver_status: media_app_status("web-3"),
        media_status: json!([media_session("PLAYING", 1.0)]),
        ..MockDeviceConfig::named("Den")
    });
    let listener = RecordingListener::new();
    let session =
        CastSession::establish(mock.device(), stream, test_config(), Some(listener.clone()))
            .await
            .unwrap();

    let events = listener.wait_for_count(1, WAIT).await;
    assert_eq!(events[0].channel, ChannelKind::Media);
    let EventPayload::MediaStatus(status) = &events[0].payload else {
        panic!("expected media status, got {:?}", events[0].payload);
    };
    assert_eq!(status.current().unwrap().player_state, "PLAYING");
    assert!(matches!(
        session.register(ChannelKind::Media, RecordingListener::new()),
        Err(CastError::ListenerAlreadyRegistered { .. })
    ));

    session.close().await;
}

#[tokio::test]
async fn test_media_app_is_followed() {
    let config = MockDeviceConfig {
        media_status: json!([media_session("PLAYING", 12.5)]),
        ..MockDeviceConfig::named("Den")
    };
    let (mock, session) = open(config).await;
    let listener = listen_all(&session);

    mock.send_receiver_status(media_app_status("web-7"));

    let events = listener.wait_for_count(2, WAIT).await;
    let media: Vec<_> = events
        .iter()
        .filter(|e| e.channel == ChannelKind::Media)
        .collect();
    assert_eq!(media.len(), 1);
    let EventPayload::MediaStatus(status) = &media[0].payload else {
        panic!("expected media status");
    };
    assert_eq!(status.current().unwrap().player_state, "PLAYING");
    assert!(media[0].payload.to_string().contains("title=Test Track"));

    assert!(
        mock.wait_for_message(WAIT, |m| is_type(m, namespace::CONNECTION, "CONNECT", "web-7"))
            .await
            .is_some()
    );
    assert!(matches!(
        session.last_status(ChannelKind::Media),
        Some(EventPayload::MediaStatus(_))
    ));

    // The app goes away and comes back: a new virtual connection is opened
    mock.send_receiver_status(idle_receiver_status());
    mock.send_receiver_status(media_app_status("web-7"));
    listener.wait_for_count(5, WAIT).await;
    let connects = mock
        .received()
        .into_iter()
        .filter(|m| is_type(m, namespace::CONNECTION, "CONNECT", "web-7"))
        .count();
    assert_eq!(connects, 2);

    session.close().await;
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    // Valid length prefix, garbage body
    mock.send_raw(vec![0, 0, 0, 3, 0xff, 0xff, 0xff]);
    // Valid envelope, invalid JSON
    mock.send(CastMessage {
        source_id: "receiver-0".to_string(),
        destination_id: "sender-0".to_string(),
        namespace: namespace::RECEIVER.to_string(),
        payload: crate::protocol::cast::Payload::Utf8("{".to_string()),
    });
    mock.send_receiver_status(status_with_level(0.3));

    let events = listener.wait_for_count(1, WAIT).await;
    assert_eq!(events.len(), 1);
    assert_eq!(volume_level(&events[0]), Some(0.3));
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await;
}

#[tokio::test]
async fn test_unknown_namespace_is_ignored() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    mock.send(CastMessage::json(
        "receiver-0",
        "sender-0",
        "urn:x-cast:com.example.custom",
        &json!({"type": "WHATEVER"}),
    ));
    mock.send_receiver_status(status_with_level(0.9));

    let events = listener.wait_for_count(1, WAIT).await;
    assert_eq!(volume_level(&events[0]), Some(0.9));
    session.close().await;
}

#[tokio::test]
async fn test_ping_is_answered() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;

    mock.send(CastMessage::json(
        "receiver-0",
        "sender-0",
        namespace::HEARTBEAT,
        &namespace::ping(),
    ));

    let pong = mock
        .wait_for_message(WAIT, |m| is_type(m, namespace::HEARTBEAT, "PONG", "receiver-0"))
        .await;
    assert!(pong.is_some());
    session.close().await;
}

// --- failure ---

async fn assert_single_terminal_per_channel(
    listener: &RecordingListener,
    expected: &DisconnectReason,
) {
    let events = listener.wait_for_count(2, WAIT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events_after = listener.events();
    assert_eq!(events.len(), events_after.len(), "events after terminal");

    let terminals: Vec<_> = events_after.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 2);
    for kind in ChannelKind::ALL {
        let ended = listener.events_for(kind);
        assert_eq!(ended.iter().filter(|e| e.is_terminal()).count(), 1);
    }
    for terminal in terminals {
        assert_eq!(end_reason(terminal), Some(expected));
    }
}

#[tokio::test]
async fn test_disconnect_ends_each_channel_once() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    mock.disconnect();

    let events = listener.wait_for_count(2, WAIT).await;
    assert!(events.iter().all(StatusEvent::is_terminal));
    assert!(matches!(
        end_reason(&events[0]),
        Some(DisconnectReason::ConnectionLost(_))
    ));
    let reason = end_reason(&events[0]).unwrap().clone();
    assert_single_terminal_per_channel(&listener, &reason).await;
    assert_eq!(session.state(), SessionState::Failed);

    assert!(matches!(
        session.register(ChannelKind::Device, RecordingListener::new()),
        Err(CastError::InvalidState { .. })
    ));

    // Closing a failed session is harmless and sends nothing more
    session.close().await;
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(listener.events().len(), 2);
}

#[tokio::test]
async fn test_device_close_fails_session() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    mock.send_close();

    assert_single_terminal_per_channel(&listener, &DisconnectReason::DeviceClosed).await;
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_oversized_frame_is_fatal() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    mock.send_raw(vec![0x7f, 0xff, 0xff, 0xff]);

    let events = listener.wait_for_count(2, WAIT).await;
    assert!(matches!(
        end_reason(&events[0]),
        Some(DisconnectReason::FramingError(_))
    ));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_heartbeat_silence_fails_session() {
    let config = MockDeviceConfig {
        answer_pings: false,
        ..MockDeviceConfig::named("Den")
    };
    let (mock, stream) = MockCastDevice::duplex(config);
    let session_config = MonitorConfig::builder()
        .heartbeat(Duration::from_millis(50), Duration::from_millis(150))
        .build();
    let session = CastSession::open_with_stream(mock.device(), stream, session_config)
        .await
        .unwrap();
    let listener = listen_all(&session);

    assert_single_terminal_per_channel(&listener, &DisconnectReason::HeartbeatTimeout).await;
    assert_eq!(session.state(), SessionState::Failed);

    // The session did ping before giving up
    assert!(!mock.received_of(namespace::HEARTBEAT, "PING").is_empty());
}

#[tokio::test]
async fn test_answered_heartbeat_keeps_session_alive() {
    let (mock, stream) = MockCastDevice::duplex(MockDeviceConfig::named("Den"));
    let session_config = MonitorConfig::builder()
        .heartbeat(Duration::from_millis(30), Duration::from_millis(100))
        .build();
    let session = CastSession::open_with_stream(mock.device(), stream, session_config)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.state(), SessionState::Ready);
    assert!(mock.received_of(namespace::HEARTBEAT, "PING").len() >= 3);
    session.close().await;
}

#[tokio::test]
async fn test_zero_heartbeat_interval_does_not_panic() {
    let (mock, stream) = MockCastDevice::duplex(MockDeviceConfig::named("Den"));
    let mut session_config = test_config();
    session_config.heartbeat_interval = Duration::ZERO;
    let session = CastSession::open_with_stream(mock.device(), stream, session_config)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), SessionState::Ready);
    assert!(!mock.received_of(namespace::HEARTBEAT, "PING").is_empty());
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
}

// --- close & registration ---

#[tokio::test]
async fn test_close_is_idempotent() {
    let (mock, session) = open(MockDeviceConfig::named("Den")).await;
    let listener = listen_all(&session);

    mock.send_receiver_status(media_app_status("web-3"));
    mock.wait_for_message(WAIT, |m| is_type(m, namespace::CONNECTION, "CONNECT", "web-3"))
        .await
        .unwrap();

    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);
    session.close().await;
    assert_eq!(session.state(), SessionState::Closed);

    for destination in ["web-3", "receiver-0"] {
        assert!(
            mock.wait_for_message(WAIT, |m| is_type(m, namespace::CONNECTION, "CLOSE", destination))
                .await
                .is_some(),
            "no CLOSE sent to {destination}"
        );
    }

    // Explicit close is not a failure; nothing arrives afterwards
    let count = listener.events().len();
    assert!(listener.events().iter().all(|e| !e.is_terminal()));
    mock.send_receiver_status(status_with_level(0.1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(listener.events().len(), count);
}

#[tokio::test]
async fn test_concurrent_close() {
    let (_mock, session) = open(MockDeviceConfig::named("Den")).await;
    let session = Arc::new(session);
    let closers: Vec<_> = (0..4)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.close().await })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap();
    }
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_register_rejects_overwrite() {
    let (_mock, session) = open(MockDeviceConfig::named("Den")).await;
    let first = RecordingListener::new();
    session.register(ChannelKind::Device, first).unwrap();

    let err = session
        .register(ChannelKind::Device, RecordingListener::new())
        .unwrap_err();
    assert!(matches!(err, CastError::ListenerAlreadyRegistered { .. }));

    assert!(session.unregister(ChannelKind::Device).is_some());
    session
        .register(ChannelKind::Device, RecordingListener::new())
        .unwrap();
    session.close().await;
}

#[tokio::test]
async fn test_register_after_close_fails() {
    let (_mock, session) = open(MockDeviceConfig::named("Den")).await;
    session.close().await;
    assert!(matches!(
        session.register(ChannelKind::Media, RecordingListener::new()),
        Err(CastError::InvalidState { .. })
    ));
}

#[test]
fn test_state_transitions() {
    let shared = SessionShared::new(Utc::now());
    assert_eq!(shared.state(), SessionState::Connecting);
    assert!(!shared.transition(SessionState::Connecting));
    assert!(shared.transition(SessionState::Ready));
    assert!(!shared.transition(SessionState::Ready));
    assert!(shared.transition(SessionState::Failed));
    assert!(!shared.transition(SessionState::Closed));
    assert!(!shared.transition(SessionState::Failed));
    assert_eq!(shared.state(), SessionState::Failed);
}

#[test]
fn test_timestamps_never_precede_open() {
    let opened = Utc::now();
    let shared = SessionShared::new(opened);
    let earlier = opened - chrono::Duration::seconds(5);
    assert_eq!(shared.stamp(ChannelKind::Device, earlier), opened);

    let later = opened + chrono::Duration::seconds(5);
    assert_eq!(shared.stamp(ChannelKind::Device, later), later);
    assert_eq!(shared.stamp(ChannelKind::Device, opened), later);
    // Channels keep separate clocks
    assert_eq!(shared.stamp(ChannelKind::Media, opened), opened);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_device_channel_preserves_order(levels in proptest::collection::vec(0u8..=100, 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let received = runtime.block_on(async {
            let (mock, session) = open(MockDeviceConfig::named("Den")).await;
            let listener = listen_all(&session);
            for level in &levels {
                mock.send_receiver_status(status_with_level(f64::from(*level) / 100.0));
            }
            let events = listener.wait_for_count(levels.len(), WAIT).await;
            session.close().await;
            events.iter().filter_map(volume_level).collect::<Vec<_>>()
        });

        let expected: Vec<f64> = levels.iter().map(|l| f64::from(*l) / 100.0).collect();
        prop_assert_eq!(received, expected);
    }
}
