use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use super::mock_device::{media_app_status, message_type};
use super::*;
use crate::protocol::cast::{CastCodec, CastMessage, namespace};

async fn next_message<S>(framed: &mut Framed<S, CastCodec>) -> CastMessage
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let body = tokio::time::timeout(Duration::from_secs(1), framed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    CastMessage::decode_body(&body).unwrap()
}

fn payload(message: &CastMessage) -> Value {
    serde_json::from_str(message.payload_utf8().unwrap()).unwrap()
}

#[test]
fn test_create_test_device() {
    let device = create_test_device("Living Room", IpAddr::V4(Ipv4Addr::LOCALHOST), 8009);
    assert_eq!(device.name, "Living Room");
    assert_eq!(device.host, "living-room.local");
    assert_eq!(device.port, 8009);
    assert_eq!(device.txt_records.get("fn").map(String::as_str), Some("Living Room"));
}

#[tokio::test]
async fn test_mock_answers_receiver_status() {
    let mock = MockCastDevice::start(MockDeviceConfig {
        receiver_status: media_app_status("web-9"),
        ..MockDeviceConfig::named("Den")
    })
    .await
    .unwrap();
    let stream = TcpStream::connect(mock.address().unwrap()).await.unwrap();
    let mut framed = Framed::new(stream, CastCodec::new());

    framed
        .send(CastMessage::json(
            "sender-0",
            namespace::PLATFORM_RECEIVER_ID,
            namespace::RECEIVER,
            &namespace::get_status(7),
        ))
        .await
        .unwrap();

    let reply = next_message(&mut framed).await;
    assert_eq!(reply.source_id, namespace::PLATFORM_RECEIVER_ID);
    assert_eq!(reply.destination_id, "sender-0");
    let value = payload(&reply);
    assert_eq!(value["type"], "RECEIVER_STATUS");
    assert_eq!(value["requestId"], 7);
    assert_eq!(value["status"]["applications"][0]["transportId"], "web-9");

    let seen = mock
        .wait_for_message(Duration::from_secs(1), |m| {
            message_type(m).as_deref() == Some("GET_STATUS")
        })
        .await;
    assert!(seen.is_some());
}

#[tokio::test]
async fn test_mock_pongs_unless_silenced() {
    let (mock, client) = MockCastDevice::duplex(MockDeviceConfig::default());
    let mut framed = Framed::new(client, CastCodec::new());

    framed
        .send(CastMessage::json(
            "sender-0",
            namespace::PLATFORM_RECEIVER_ID,
            namespace::HEARTBEAT,
            &namespace::ping(),
        ))
        .await
        .unwrap();
    let reply = next_message(&mut framed).await;
    assert_eq!(message_type(&reply).as_deref(), Some("PONG"));
    assert_eq!(mock.received_of(namespace::HEARTBEAT, "PING").len(), 1);

    let (_silent, client) = MockCastDevice::duplex(MockDeviceConfig {
        answer_pings: false,
        ..MockDeviceConfig::default()
    });
    let mut framed = Framed::new(client, CastCodec::new());
    framed
        .send(CastMessage::json(
            "sender-0",
            namespace::PLATFORM_RECEIVER_ID,
            namespace::HEARTBEAT,
            &namespace::ping(),
        ))
        .await
        .unwrap();
    let nothing = tokio::time::timeout(Duration::from_millis(100), framed.next()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_mock_pushes_and_disconnects() {
    let (mock, client) = MockCastDevice::duplex(MockDeviceConfig::default());
    let mut framed = Framed::new(client, CastCodec::new());

    assert!(mock.send_media_status("web-1", json!([])));
    let pushed = next_message(&mut framed).await;
    assert_eq!(pushed.source_id, "web-1");
    assert_eq!(payload(&pushed)["type"], "MEDIA_STATUS");

    assert!(mock.disconnect());
    let end = tokio::time::timeout(Duration::from_secs(1), framed.next())
        .await
        .unwrap();
    assert!(end.is_none());
}

#[tokio::test]
async fn test_advertiser_feeds_stream() {
    let (advertiser, source) = MockAdvertiser::channel();
    let device = create_test_device("Attic", IpAddr::V4(Ipv4Addr::LOCALHOST), 8009);
    futures::pin_mut!(source);

    assert!(advertiser.announce(&device));
    assert!(advertiser.depart(&device));
    drop(advertiser);

    let received: Vec<_> = source.collect().await;
    assert_eq!(
        received,
        vec![
            crate::discovery::Advertisement::Announced {
                fullname: "Attic._googlecast._tcp.local.".to_string(),
                device,
            },
            crate::discovery::Advertisement::Departed {
                fullname: "Attic._googlecast._tcp.local.".to_string(),
            },
        ]
    );
}
