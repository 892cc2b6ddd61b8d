//! Cast v2 control channel protocol
//!
//! Frames are a 4-byte big-endian length followed by a protobuf
//! `CastMessage`; every namespace used here carries JSON payloads.

mod codec;
mod inbound;
mod message;
pub mod namespace;


pub use codec::{CastCodec, LENGTH_PREFIX, MAX_FRAME_LEN};
pub use inbound::{Inbound, InboundMessage, classify, classify_message};
pub use message::{CastMessage, Payload};

use thiserror::Error;

/// Errors decoding a single frame; the connection stays usable
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The protobuf envelope is malformed
    #[error("invalid protobuf: {message}")]
    InvalidProtobuf {
        /// Description of the problem
        message: String,
    },

    /// A string field is not valid UTF-8
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// The offending field
        field: &'static str,
    },

    /// A required field is absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A JSON namespace carried a binary payload
    #[error("unexpected binary payload on {namespace}")]
    UnexpectedBinaryPayload {
        /// The namespace of the message
        namespace: String,
    },

    /// The payload is not the expected JSON
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors of the frame stream itself; the connection must be dropped
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame length prefix above the limit
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced length
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
