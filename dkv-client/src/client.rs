//! # Client API
//!
//! Purpose: Expose a compact async API for issuing cache requests to any
//! node, hiding framing and connection reuse.
//!
//! Requests leave here with an empty `source_node`, so the receiving node
//! acts as coordinator and fans out on the caller's behalf.

use std::sync::Arc;
use std::time::Duration;

use dkv_common::{
    DkvError, DkvResult, GetRequest, GetResponse, Request, Response, SetRequest,
    DEFAULT_MAX_MSG_SIZE,
};

use crate::pool::{Peer, PeerPool};

/// Configuration for a client handle.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Node address, e.g. "localhost:8080".
    pub addr: String,
    /// Cap on encoded message size, both directions.
    pub max_msg_size: usize,
    /// Deadline for one request/response exchange, dial included.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "localhost:8080".to_string(),
            max_msg_size: DEFAULT_MAX_MSG_SIZE,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Async client for one node. The underlying connection is dialed on first
/// use and reused across calls.
pub struct CacheClient {
    peer: Arc<Peer>,
    timeout: Duration,
}

impl CacheClient {
    /// Creates a client for `addr` with default limits. No I/O happens
    /// until the first call.
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::with_config(ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        })
    }

    /// Creates a client with explicit configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        let pool = PeerPool::new(config.max_msg_size);
        CacheClient {
            peer: pool.get(&config.addr),
            timeout: config.timeout,
        }
    }

    /// Stores `value` under `key`, replicated per the cluster's quorum rule.
    pub async fn set(&self, key: &str, value: &str) -> DkvResult<()> {
        let request = Request::Set(SetRequest {
            key: key.to_string(),
            value: value.to_string(),
            source_node: String::new(),
        });
        match self.call(&request).await? {
            Response::Set => Ok(()),
            Response::Error { code, message } => Err(DkvError::from_status(code, message)),
            Response::Get(_) => Err(DkvError::Internal("mismatched response type".to_string())),
        }
    }

    /// Fetches the quorum-merged value and version for `key`.
    pub async fn get(&self, key: &str) -> DkvResult<GetResponse> {
        let request = Request::Get(GetRequest {
            key: key.to_string(),
            source_node: String::new(),
        });
        match self.call(&request).await? {
            Response::Get(response) => Ok(response),
            Response::Error { code, message } => Err(DkvError::from_status(code, message)),
            Response::Set => Err(DkvError::Internal("mismatched response type".to_string())),
        }
    }

    /// Sends a raw request and returns the raw response.
    ///
    /// Lets callers mark `source_node` themselves, e.g. to probe a single
    /// replica's local store.
    pub async fn call(&self, request: &Request) -> DkvResult<Response> {
        self.peer.call(request, self.timeout).await
    }
}
