//! # Error Type
//!
//! Purpose: Give every crate in the workspace a single error enum with a
//! stable mapping onto wire status codes.

use std::io;

use thiserror::Error;

use crate::wire::StatusCode;

/// Result type used across the workspace.
pub type DkvResult<T> = Result<T, DkvError>;

/// Errors surfaced by the cache, ring, transport, and coordinator layers.
#[derive(Debug, Error)]
pub enum DkvError {
    /// The request itself is malformed (e.g. an empty key on a write).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The key is absent from a quorum of replicas.
    #[error("key not found")]
    NotFound,
    /// Fewer replicas acknowledged a write than the quorum requires.
    #[error("no write quorum")]
    NoWriteQuorum,
    /// Fewer replicas returned a hit than the quorum requires.
    #[error("no read quorum")]
    NoReadQuorum,
    /// The ring holds fewer live members than the replication factor.
    #[error("not enough replicas available")]
    Unavailable,
    /// The node-wide token bucket is empty.
    #[error("rate limit exceeded")]
    RateLimited,
    /// Dial, read, or write failure on a peer connection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    /// A peer exchange outlived its deadline.
    #[error("request timed out")]
    Timeout,
    /// Frame or payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// A peer reported an internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DkvError {
    /// Maps this error onto the status code carried in error responses.
    ///
    /// Quorum, ring, transport, and codec failures all collapse to
    /// `Internal`; the caller cannot act on the distinction and retries are
    /// its responsibility either way.
    pub fn status(&self) -> StatusCode {
        match self {
            DkvError::InvalidArgument(_) => StatusCode::InvalidArgument,
            DkvError::NotFound => StatusCode::NotFound,
            DkvError::RateLimited => StatusCode::ResourceExhausted,
            DkvError::NoWriteQuorum
            | DkvError::NoReadQuorum
            | DkvError::Unavailable
            | DkvError::Transport(_)
            | DkvError::Timeout
            | DkvError::Codec(_)
            | DkvError::Internal(_) => StatusCode::Internal,
        }
    }

    /// Rebuilds an error from a received status code and message.
    ///
    /// Used on the client side to turn an error response back into the
    /// variant the caller matches on.
    pub fn from_status(code: StatusCode, message: String) -> Self {
        match code {
            StatusCode::InvalidArgument => DkvError::InvalidArgument(message),
            StatusCode::NotFound => DkvError::NotFound,
            StatusCode::ResourceExhausted => DkvError::RateLimited,
            StatusCode::Internal => DkvError::Internal(message),
            // An error frame with an Ok code is a peer bug; keep the text.
            StatusCode::Ok => DkvError::Internal(message),
        }
    }
}

impl From<bincode::Error> for DkvError {
    fn from(err: bincode::Error) -> Self {
        DkvError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_wire_codes() {
        assert_eq!(
            DkvError::InvalidArgument("empty key".into()).status(),
            StatusCode::InvalidArgument
        );
        assert_eq!(DkvError::NotFound.status(), StatusCode::NotFound);
        assert_eq!(DkvError::NoWriteQuorum.status(), StatusCode::Internal);
        assert_eq!(DkvError::NoReadQuorum.status(), StatusCode::Internal);
        assert_eq!(DkvError::RateLimited.status(), StatusCode::ResourceExhausted);
    }

    #[test]
    fn from_status_round_trips_not_found() {
        let err = DkvError::from_status(StatusCode::NotFound, "key not found".into());
        assert!(matches!(err, DkvError::NotFound));
    }

    #[test]
    fn from_status_keeps_internal_message() {
        let err = DkvError::from_status(StatusCode::Internal, "no write quorum".into());
        match err {
            DkvError::Internal(message) => assert_eq!(message, "no write quorum"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
