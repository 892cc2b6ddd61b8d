//! Classification of received frames

use serde_json::Value;

use super::{CastMessage, DecodeError, Payload, namespace};
use crate::types::{MediaStatus, ReceiverStatus};

/// What a received frame means to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `RECEIVER_STATUS` on the receiver namespace
    ReceiverStatus(ReceiverStatus),
    /// `MEDIA_STATUS` on the media namespace
    MediaStatus(MediaStatus),
    /// Heartbeat ping from the device
    Ping,
    /// Heartbeat reply from the device
    Pong,
    /// The source closed its virtual connection
    Close,
    /// A message this crate does not act on
    Other {
        /// Namespace of the message
        namespace: String,
        /// `type` field, if there was one
        kind: Option<String>,
    },
}

/// A classified frame together with its source id
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender of the frame
    pub source_id: String,
    /// Decoded meaning
    pub inbound: Inbound,
}

/// Decode a frame body and classify it
///
/// # Errors
///
/// Returns `DecodeError` if the envelope is malformed, or if a message on a
/// namespace this crate handles has a binary, non-JSON or incomplete payload.
pub fn classify(body: &[u8]) -> Result<InboundMessage, DecodeError> {
    let message = CastMessage::decode_body(body)?;
    classify_message(message)
}

/// Classify an already decoded message
///
/// # Errors
///
/// See [`classify`].
pub fn classify_message(message: CastMessage) -> Result<InboundMessage, DecodeError> {
    let known = matches!(
        message.namespace.as_str(),
        namespace::CONNECTION | namespace::HEARTBEAT | namespace::RECEIVER | namespace::MEDIA
    );

    let text = match &message.payload {
        Payload::Utf8(text) => text,
        Payload::Binary(_) if known => {
            return Err(DecodeError::UnexpectedBinaryPayload {
                namespace: message.namespace,
            });
        }
        Payload::Binary(_) => {
            return Ok(InboundMessage {
                source_id: message.source_id,
                inbound: Inbound::Other {
                    namespace: message.namespace,
                    kind: None,
                },
            });
        }
    };

    if !known {
        let kind = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(ToString::to_string));
        return Ok(InboundMessage {
            source_id: message.source_id,
            inbound: Inbound::Other {
                namespace: message.namespace,
                kind,
            },
        });
    }

    let mut value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("type"))?
        .to_string();

    let inbound = match (message.namespace.as_str(), kind.as_str()) {
        (namespace::HEARTBEAT, "PING") => Inbound::Ping,
        (namespace::HEARTBEAT, "PONG") => Inbound::Pong,
        (namespace::CONNECTION, "CLOSE") => Inbound::Close,
        (namespace::RECEIVER, "RECEIVER_STATUS") => {
            let status = value
                .get_mut("status")
                .map(Value::take)
                .ok_or(DecodeError::MissingField("status"))?;
            Inbound::ReceiverStatus(serde_json::from_value(status)?)
        }
        (namespace::MEDIA, "MEDIA_STATUS") => Inbound::MediaStatus(serde_json::from_value(value)?),
        _ => Inbound::Other {
            namespace: message.namespace.clone(),
            kind: Some(kind),
        },
    };

    Ok(InboundMessage {
        source_id: message.source_id,
        inbound,
    })
}
