use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::testing::mock_device::{media_app_status, media_session};
use crate::testing::mock_discovery;
use crate::testing::{
    MockAdvertiser, MockCastDevice, MockDeviceConfig, RecordingListener, create_test_device,
};
use crate::types::{ChannelKind, EventPayload, TransportSecurity};

fn config() -> MonitorConfig {
    MonitorConfig::builder()
        .discovery_timeout(Duration::from_millis(200))
        .connection_timeout(Duration::from_secs(1))
        .handshake_timeout(Duration::from_secs(1))
        .close_timeout(Duration::from_secs(1))
        .transport(TransportSecurity::Plain)
        .build()
}

async fn start_mock(name: &str) -> MockCastDevice {
    MockCastDevice::start(MockDeviceConfig::named(name))
        .await
        .unwrap()
}

fn names(selection: &Selection) -> Vec<String> {
    selection
        .sessions
        .iter()
        .map(|s| s.device().name.clone())
        .collect()
}

#[tokio::test]
async fn test_resolve_reports_unmatched() {
    let a = start_mock("A").await;
    let c = start_mock("C").await;
    let source = mock_discovery::fixed(vec![a.device(), c.device()]);
    let discovery = DiscoveryService::start_with_source(source, ["A", "B", "C"]);

    let selection = SessionSelector::new(&discovery, config())
        .resolve(["A", "B", "C"])
        .await
        .unwrap();

    assert_eq!(names(&selection), vec!["A".to_string(), "C".to_string()]);
    assert_eq!(
        selection.unmatched,
        BTreeSet::from(["B".to_string()])
    );
    assert!(selection.failed.is_empty());

    for session in &selection.sessions {
        session.close().await;
    }
    discovery.stop().await;
}

#[tokio::test]
async fn test_resolve_keeps_requested_order() {
    let x = start_mock("X").await;
    let y = start_mock("Y").await;
    let (advertiser, source) = MockAdvertiser::channel();
    advertiser.announce(&x.device());
    advertiser.announce(&y.device());
    let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());

    let selection = SessionSelector::new(&discovery, config())
        .resolve(["Y", "X", "Y"])
        .await
        .unwrap();

    assert_eq!(names(&selection), vec!["Y".to_string(), "X".to_string()]);
    assert!(selection.unmatched.is_empty());
}

#[tokio::test]
async fn test_resolve_rejects_empty_request() {
    let (_advertiser, source) = MockAdvertiser::channel();
    let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());

    let result = SessionSelector::new(&discovery, config())
        .resolve(Vec::<String>::new())
        .await;
    assert!(matches!(result, Err(CastError::InvalidParameter { .. })));
}

#[tokio::test]
async fn test_failed_open_does_not_block_others() {
    let good = start_mock("Good").await;

    // Resolves, but nothing listens on its port
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let dead_port = listener.local_addr().unwrap().port();
    drop(listener);
    let dead = create_test_device("Dead", IpAddr::V4(Ipv4Addr::LOCALHOST), dead_port);

    let source = mock_discovery::fixed(vec![good.device(), dead]);
    let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());

    let selection = SessionSelector::new(&discovery, config())
        .resolve(["Dead", "Good"])
        .await
        .unwrap();

    assert_eq!(names(&selection), vec!["Good".to_string()]);
    assert_eq!(selection.failed.len(), 1);
    assert_eq!(selection.failed[0].name, "Dead");
    assert!(selection.failed[0].error.is_connection_lost());
}

#[tokio::test]
async fn test_listener_sees_early_events_while_others_open() {
    let fast = MockCastDevice::start(MockDeviceConfig {
        receiver_status: media_app_status("web-1"),
        media_status: json!([media_session("PLAYING", 1.0)]),
        ..MockDeviceConfig::named("Fast")
    })
    .await
    .unwrap();
    let slow = MockCastDevice::start(MockDeviceConfig {
        answer_status: false,
        ..MockDeviceConfig::named("Slow")
    })
    .await
    .unwrap();
    let source = mock_discovery::fixed(vec![fast.device(), slow.device()]);
    let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());
    let recorder = RecordingListener::new();

    let selection = SessionSelector::new(&discovery, config())
        .listener(recorder.clone())
        .resolve(["Fast", "Slow"])
        .await
        .unwrap();

    assert_eq!(names(&selection), vec!["Fast".to_string()]);
    assert_eq!(selection.failed.len(), 1);
    assert!(matches!(
        selection.failed[0].error,
        CastError::HandshakeTimeout { .. }
    ));

    let events = recorder.wait_for_count(1, Duration::from_secs(2)).await;
    let media: Vec<_> = recorder
        .events_for(ChannelKind::Media)
        .into_iter()
        .filter(|e| e.device == "Fast")
        .collect();
    assert_eq!(media.len(), 1, "events: {events:?}");
    let EventPayload::MediaStatus(status) = &media[0].payload else {
        panic!("expected media status, got {:?}", media[0].payload);
    };
    assert_eq!(status.current().unwrap().player_state, "PLAYING");

    for session in &selection.sessions {
        session.close().await;
    }
    discovery.stop().await;
}

#[tokio::test]
async fn test_nothing_resolved_is_empty_selection() {
    let (_advertiser, source) = MockAdvertiser::channel();
    let discovery = DiscoveryService::start_with_source(source, Vec::<String>::new());

    let selection = SessionSelector::new(&discovery, config())
        .resolve(["Nowhere"])
        .await
        .unwrap();
    assert!(selection.is_empty());
    assert_eq!(selection.unmatched.len(), 1);
}
