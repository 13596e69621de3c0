//! # Wire Protocol
//!
//! Purpose: Frame and encode the peer RPC messages nodes exchange, keeping
//! the schema identical whether a request comes from a client or a peer.
//!
//! ## Design Principles
//! 1. **Length-Prefixed Frames**: A `u32` little-endian payload length keeps
//!    parsing stateless and binary-safe.
//! 2. **Incremental Decoding**: A partial frame yields `None`; the caller
//!    reads more bytes and retries without losing buffer contents.
//! 3. **Bounded Messages**: Frames beyond the configured cap are rejected
//!    before any payload allocation happens.
//! 4. **Source Marking**: Every request carries `source_node`; a non-empty
//!    value marks a peer forward that must be served strictly locally.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{DkvError, DkvResult};

/// Bytes occupied by the frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default cap on encoded message size (4 MiB), matching the config default.
pub const DEFAULT_MAX_MSG_SIZE: usize = 4 * 1024 * 1024;

/// Status carried on error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    Internal,
    ResourceExhausted,
}

/// Write request. An empty `source_node` marks a client-origin request the
/// receiving node must coordinate; a non-empty one marks a peer forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    pub source_node: String,
}

/// Read request, with the same `source_node` marking as [`SetRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
    pub source_node: String,
}

/// Read response: the stored value and the version it carried on the
/// replica that answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub value: String,
    pub version: u32,
}

/// Requests a node accepts over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Set(SetRequest),
    Get(GetRequest),
}

/// Responses a node sends back, one per request, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Successful write acknowledgement.
    Set,
    /// Successful read.
    Get(GetResponse),
    /// Any failure, carrying the wire status and a human-readable message.
    Error { code: StatusCode, message: String },
}

impl Response {
    /// Builds the error response for a failed request.
    pub fn from_error(err: &DkvError) -> Self {
        Response::Error {
            code: err.status(),
            message: err.to_string(),
        }
    }
}

/// Encodes one message as a length-prefixed frame appended to `buf`.
///
/// Fails without touching `buf` when the encoded payload exceeds
/// `max_size`.
pub fn encode_frame<T: Serialize>(msg: &T, buf: &mut BytesMut, max_size: usize) -> DkvResult<()> {
    let payload = bincode::serialize(msg)?;
    if payload.len() > max_size {
        return Err(DkvError::Codec(format!(
            "message of {} bytes exceeds the {} byte limit",
            payload.len(),
            max_size
        )));
    }
    buf.reserve(FRAME_HEADER_LEN + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(())
}

/// Decodes one message from the front of `buf`, if a full frame is present.
///
/// Returns `Ok(None)` when more bytes are needed. Consumed bytes are split
/// off `buf` only once a complete frame has been decoded.
pub fn decode_frame<T: serde::de::DeserializeOwned>(
    buf: &mut BytesMut,
    max_size: usize,
) -> DkvResult<Option<T>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max_size {
        return Err(DkvError::Codec(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, max_size
        )));
    }
    if buf.len() < FRAME_HEADER_LEN + len {
        return Ok(None);
    }

    buf.advance(FRAME_HEADER_LEN);
    let payload = buf.split_to(len);
    Ok(Some(bincode::deserialize(&payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> Request {
        Request::Set(SetRequest {
            key: "alpha".to_string(),
            value: "one".to_string(),
            source_node: String::new(),
        })
    }

    #[test]
    fn frame_round_trip() {
        let mut buf = BytesMut::new();
        encode_frame(&sample_set(), &mut buf, DEFAULT_MAX_MSG_SIZE).unwrap();

        let decoded: Request = decode_frame(&mut buf, DEFAULT_MAX_MSG_SIZE)
            .unwrap()
            .expect("complete frame");
        assert_eq!(decoded, sample_set());
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut full = BytesMut::new();
        encode_frame(&sample_set(), &mut full, DEFAULT_MAX_MSG_SIZE).unwrap();

        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        let decoded: Option<Request> = decode_frame(&mut buf, DEFAULT_MAX_MSG_SIZE).unwrap();
        assert!(decoded.is_none());

        buf.extend_from_slice(&full[full.len() - 1..]);
        let decoded: Request = decode_frame(&mut buf, DEFAULT_MAX_MSG_SIZE)
            .unwrap()
            .expect("complete frame");
        assert_eq!(decoded, sample_set());
    }

    #[test]
    fn oversized_frame_is_rejected_before_buffering() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(64);
        let result: DkvResult<Option<Request>> = decode_frame(&mut buf, 16);
        assert!(matches!(result, Err(DkvError::Codec(_))));
    }

    #[test]
    fn oversized_message_is_rejected_on_encode() {
        let request = Request::Set(SetRequest {
            key: "alpha".to_string(),
            value: "x".repeat(64),
            source_node: String::new(),
        });
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_frame(&request, &mut buf, 16),
            Err(DkvError::Codec(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn two_frames_decode_in_order() {
        let get = Request::Get(GetRequest {
            key: "alpha".to_string(),
            source_node: "localhost:9000".to_string(),
        });

        let mut buf = BytesMut::new();
        encode_frame(&sample_set(), &mut buf, DEFAULT_MAX_MSG_SIZE).unwrap();
        encode_frame(&get, &mut buf, DEFAULT_MAX_MSG_SIZE).unwrap();

        let first: Request = decode_frame(&mut buf, DEFAULT_MAX_MSG_SIZE).unwrap().unwrap();
        let second: Request = decode_frame(&mut buf, DEFAULT_MAX_MSG_SIZE).unwrap().unwrap();
        assert_eq!(first, sample_set());
        assert_eq!(second, get);
    }
}
