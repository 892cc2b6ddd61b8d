//! `CastMessage` protobuf envelope
//!
//! The envelope is small and fixed, so it is encoded by hand rather than
//! through generated code:
//!
//! ```text
//! 1 protocol_version  varint (0 = CASTV2_1_0)
//! 2 source_id         string
//! 3 destination_id    string
//! 4 namespace         string
//! 5 payload_type      varint (0 = STRING, 1 = BINARY)
//! 6 payload_utf8      string
//! 7 payload_binary    bytes
//! ```

use bytes::{BufMut, Bytes};

use super::DecodeError;

const FIELD_PROTOCOL_VERSION: u32 = 1;
const FIELD_SOURCE_ID: u32 = 2;
const FIELD_DESTINATION_ID: u32 = 3;
const FIELD_NAMESPACE: u32 = 4;
const FIELD_PAYLOAD_TYPE: u32 = 5;
const FIELD_PAYLOAD_UTF8: u32 = 6;
const FIELD_PAYLOAD_BINARY: u32 = 7;

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Message payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 payload, JSON for every namespace this crate speaks
    Utf8(String),
    /// Binary payload (used by device authentication)
    Binary(Bytes),
}

/// A decoded Cast v2 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastMessage {
    /// Sender of the message
    pub source_id: String,
    /// Receiver of the message
    pub destination_id: String,
    /// Namespace URN
    pub namespace: String,
    /// Message payload
    pub payload: Payload,
}

impl CastMessage {
    /// Create a message with a JSON payload
    #[must_use]
    pub fn json(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: Payload::Utf8(payload.to_string()),
        }
    }

    /// Text payload, if this is a UTF-8 message
    #[must_use]
    pub fn payload_utf8(&self) -> Option<&str> {
        match &self.payload {
            Payload::Utf8(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Encode the protobuf body (without the length prefix)
    pub fn encode_body(&self, out: &mut impl BufMut) {
        write_varint_field(out, FIELD_PROTOCOL_VERSION, 0);
        write_bytes_field(out, FIELD_SOURCE_ID, self.source_id.as_bytes());
        write_bytes_field(out, FIELD_DESTINATION_ID, self.destination_id.as_bytes());
        write_bytes_field(out, FIELD_NAMESPACE, self.namespace.as_bytes());
        match &self.payload {
            Payload::Utf8(text) => {
                write_varint_field(out, FIELD_PAYLOAD_TYPE, 0);
                write_bytes_field(out, FIELD_PAYLOAD_UTF8, text.as_bytes());
            }
            Payload::Binary(data) => {
                write_varint_field(out, FIELD_PAYLOAD_TYPE, 1);
                write_bytes_field(out, FIELD_PAYLOAD_BINARY, data);
            }
        }
    }

    /// Decode a protobuf body
    ///
    /// Unknown fields are skipped. Source, destination and namespace are
    /// required.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the body is truncated, uses an unsupported
    /// wire type, contains invalid UTF-8, or misses a required field.
    pub fn decode_body(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = 0usize;
        let mut source_id = None;
        let mut destination_id = None;
        let mut namespace = None;
        let mut payload_type = 0u64;
        let mut payload_utf8 = None;
        let mut payload_binary = None;

        while cursor < bytes.len() {
            let key = read_varint(bytes, &mut cursor)?;
            let field = u32::try_from(key >> 3).map_err(|_| DecodeError::InvalidProtobuf {
                message: format!("field number out of range: {}", key >> 3),
            })?;
            #[allow(clippy::cast_possible_truncation)]
            let wire_type = (key & 0x07) as u8;

            match wire_type {
                WIRE_VARINT => {
                    let value = read_varint(bytes, &mut cursor)?;
                    if field == FIELD_PAYLOAD_TYPE {
                        payload_type = value;
                    }
                }
                WIRE_LEN => {
                    let data = read_len_delimited(bytes, &mut cursor)?;
                    match field {
                        FIELD_SOURCE_ID => source_id = Some(utf8(data, "source_id")?),
                        FIELD_DESTINATION_ID => {
                            destination_id = Some(utf8(data, "destination_id")?);
                        }
                        FIELD_NAMESPACE => namespace = Some(utf8(data, "namespace")?),
                        FIELD_PAYLOAD_UTF8 => payload_utf8 = Some(utf8(data, "payload_utf8")?),
                        FIELD_PAYLOAD_BINARY => payload_binary = Some(Bytes::copy_from_slice(data)),
                        _ => {}
                    }
                }
                WIRE_FIXED64 => skip(bytes, &mut cursor, 8)?,
                WIRE_FIXED32 => skip(bytes, &mut cursor, 4)?,
                other => {
                    return Err(DecodeError::InvalidProtobuf {
                        message: format!("unsupported wire type {other} for field {field}"),
                    });
                }
            }
        }

        let payload = if payload_type == 1 {
            Payload::Binary(payload_binary.unwrap_or_default())
        } else {
            Payload::Utf8(payload_utf8.unwrap_or_default())
        };

        Ok(Self {
            source_id: source_id.ok_or(DecodeError::MissingField("source_id"))?,
            destination_id: destination_id.ok_or(DecodeError::MissingField("destination_id"))?,
            namespace: namespace.ok_or(DecodeError::MissingField("namespace"))?,
            payload,
        })
    }
}

fn utf8(data: &[u8], field: &'static str) -> Result<String, DecodeError> {
    String::from_utf8(data.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { field })
}

fn write_varint_field(out: &mut impl BufMut, field: u32, value: u64) {
    write_varint(out, u64::from(field) << 3 | u64::from(WIRE_VARINT));
    write_varint(out, value);
}

fn write_bytes_field(out: &mut impl BufMut, field: u32, value: &[u8]) {
    write_varint(out, u64::from(field) << 3 | u64::from(WIRE_LEN));
    write_varint(out, value.len() as u64);
    out.put_slice(value);
}

fn write_varint(out: &mut impl BufMut, mut value: u64) {
    loop {
        #[allow(clippy::cast_possible_truncation)]
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.put_u8(byte);
            return;
        }
        out.put_u8(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], cursor: &mut usize) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    while shift <= 63 {
        let Some(&byte) = bytes.get(*cursor) else {
            return Err(DecodeError::InvalidProtobuf {
                message: "truncated varint".to_string(),
            });
        };
        *cursor += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(DecodeError::InvalidProtobuf {
        message: "varint longer than 10 bytes".to_string(),
    })
}

fn read_len_delimited<'a>(bytes: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], DecodeError> {
    let len = usize::try_from(read_varint(bytes, cursor)?).map_err(|_| {
        DecodeError::InvalidProtobuf {
            message: "length does not fit in memory".to_string(),
        }
    })?;
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| DecodeError::InvalidProtobuf {
            message: format!("field of {len} bytes exceeds message"),
        })?;
    let data = &bytes[*cursor..end];
    *cursor = end;
    Ok(data)
}

fn skip(bytes: &[u8], cursor: &mut usize, len: usize) -> Result<(), DecodeError> {
    if *cursor + len > bytes.len() {
        return Err(DecodeError::InvalidProtobuf {
            message: "truncated fixed-width field".to_string(),
        });
    }
    *cursor += len;
    Ok(())
}
