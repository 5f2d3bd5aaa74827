//! Length-prefixed framing for the control channel
//!
//! Frames travel over TCP as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: protobuf Frame ]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::Frame;

/// Largest frame body accepted on either side (10 MB)
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),

    #[error("Invalid frame length prefix: {0}")]
    InvalidLength(u32),

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

/// Encode a frame into a freshly allocated, length-prefixed buffer
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Append a length-prefixed frame to `buf`
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), CodecError> {
    let body_len = frame.encoded_len();
    if body_len > MAX_FRAME_SIZE as usize {
        return Err(CodecError::FrameTooLarge(body_len));
    }

    buf.reserve(PREFIX_LEN + body_len);
    buf.put_u32(body_len as u32);
    frame.encode(buf)?;
    Ok(())
}

/// Try to take one complete frame off the front of `buf`
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is incomplete.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    if buf.len() < PREFIX_LEN {
        return Ok(None);
    }

    let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if body_len > MAX_FRAME_SIZE {
        return Err(CodecError::InvalidLength(body_len));
    }

    if buf.len() < PREFIX_LEN + body_len as usize {
        return Ok(None);
    }

    buf.advance(PREFIX_LEN);
    let body = buf.split_to(body_len as usize);
    Ok(Some(Frame::decode(body)?))
}

/// Accumulates bytes read from a stream and yields complete frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data read from the stream
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Call repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<Frame>, CodecError> {
        decode(&mut self.buffer)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame, Qos};

    fn command_frame() -> Frame {
        Frame::publish(
            "/node-7/AppControl",
            "SET_DWELL_TIME 45000",
            Qos::AtMostOnce,
            false,
        )
    }

    #[test]
    fn test_length_prefix_matches_body() {
        let encoded = encode(&command_frame()).expect("encode failed");
        let prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(prefix as usize, encoded.len() - PREFIX_LEN);
    }

    #[test]
    fn test_partial_frame_is_not_consumed() {
        let encoded = encode(&command_frame()).expect("encode failed");

        let mut buf = BytesMut::from(&encoded[..6]);
        assert!(decode(&mut buf).expect("partial data is not an error").is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_decoder_reassembles_split_reads() {
        let encoded = encode(&command_frame()).expect("encode failed");
        let mut decoder = FrameDecoder::new();

        decoder.extend(&encoded[..3]);
        assert!(decoder.decode_next().expect("decode error").is_none());

        decoder.extend(&encoded[3..]);
        let decoded = decoder
            .decode_next()
            .expect("decode error")
            .expect("should have a frame");

        match decoded.body {
            Some(frame::Body::Publish(p)) => {
                assert_eq!(p.topic, "/node-7/AppControl");
                assert_eq!(p.payload_text(), "SET_DWELL_TIME 45000");
            }
            other => panic!("unexpected body: {:?}", other),
        }
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encode(&Frame::ping()).expect("encode failed"));
        decoder.extend(&encode(&Frame::sub_ack("/a", true)).expect("encode failed"));

        assert!(matches!(
            decoder.decode_next().expect("decode error"),
            Some(Frame { body: Some(frame::Body::Ping(_)) })
        ));
        assert!(matches!(
            decoder.decode_next().expect("decode error"),
            Some(Frame { body: Some(frame::Body::SubAck(_)) })
        ));
        assert!(decoder.decode_next().expect("decode error").is_none());
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_SIZE + 1);
        buf.put_bytes(0, 16);

        assert!(matches!(decode(&mut buf), Err(CodecError::InvalidLength(_))));
    }
}
