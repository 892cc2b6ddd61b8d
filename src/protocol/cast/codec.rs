use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{CastMessage, CodecError};

/// Length of the big-endian frame length prefix
pub const LENGTH_PREFIX: usize = 4;

/// Largest frame body accepted or produced (64 KiB)
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Frame codec for the Cast control channel
///
/// The decoder only splits the byte stream into frame bodies; protobuf
/// decoding happens later so that a malformed body costs one frame rather
/// than the connection. A length prefix above the limit cannot be skipped
/// safely and is reported as an error.
#[derive(Debug, Clone)]
pub struct CastCodec {
    max_frame_len: usize,
}

impl CastCodec {
    /// Create a codec with the default frame limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }

    /// Set the maximum frame body length
    #[must_use]
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }
}

impl Default for CastCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CastCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, CodecError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<CastMessage> for CastCodec {
    type Error = CodecError;

    fn encode(&mut self, item: CastMessage, dst: &mut BytesMut) -> Result<(), CodecError> {
        let start = dst.len();
        dst.put_u32(0);
        item.encode_body(dst);

        let len = dst.len() - start - LENGTH_PREFIX;
        if len > self.max_frame_len {
            dst.truncate(start);
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let prefix = (len as u32).to_be_bytes();
        dst[start..start + LENGTH_PREFIX].copy_from_slice(&prefix);
        Ok(())
    }
}
