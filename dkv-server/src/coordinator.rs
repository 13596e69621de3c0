//! # Quorum Coordinator
//!
//! Purpose: Turn a single client request into a replica fan-out and decide
//! success by quorum.
//!
//! ## Design Principles
//! 1. **Two-State Protocol**: An empty `source_node` makes this node the
//!    coordinator; a non-empty one makes it a replica that acts strictly
//!    locally. Forwards can never cascade, so loops are impossible by
//!    construction.
//! 2. **Deferred Local Write**: The coordinator counts its own slot up
//!    front but applies the value only after quorum, so a failed write
//!    never leaves the coordinator holding data its replicas lack.
//! 3. **Independent Failures**: Each replica call runs in its own task
//!    under its own deadline; one slow or dead peer costs one slot, not the
//!    whole fan-out.
//! 4. **Version Merge**: Reads return the highest version among the
//!    collected hits; ties break arbitrarily.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dkv_client::PeerPool;
use dkv_common::{
    DkvError, DkvResult, GetRequest, GetResponse, Request, Response, SetRequest, StatusCode,
};
use dkv_engine::ShardedCache;
use dkv_ring::HashRing;

/// Fan-out engine shared by the RPC handlers.
pub struct Coordinator {
    cache: Arc<ShardedCache>,
    ring: Arc<HashRing>,
    pool: Arc<PeerPool>,
    local_addr: String,
    rpc_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        cache: Arc<ShardedCache>,
        ring: Arc<HashRing>,
        pool: Arc<PeerPool>,
        local_addr: String,
        rpc_timeout: Duration,
    ) -> Self {
        Coordinator {
            cache,
            ring,
            pool,
            local_addr,
            rpc_timeout,
        }
    }

    /// Handles a write.
    ///
    /// Client-origin requests fan out to every replica of the key and
    /// require `required` acknowledgements, the coordinator's own slot
    /// included. Peer forwards apply to the local store and report success.
    pub async fn set(&self, request: SetRequest) -> DkvResult<()> {
        if request.key.is_empty() {
            return Err(DkvError::InvalidArgument("empty key".to_string()));
        }

        if !request.source_node.is_empty() {
            self.cache
                .insert(request.key.as_bytes(), request.value.as_bytes());
            return Ok(());
        }

        let replicas = self
            .ring
            .replicas(&request.key)
            .map_err(|_| DkvError::NoWriteQuorum)?;

        let mut forward = request.clone();
        forward.source_node = self.local_addr.clone();

        let mut successes = 0usize;
        let mut calls = Vec::new();
        for node in &replicas.nodes {
            if node.addr == self.local_addr {
                // Own slot counts now; the write itself waits for quorum.
                successes += 1;
                continue;
            }

            let peer = self.pool.get(&node.addr);
            let forward = forward.clone();
            let deadline = self.rpc_timeout;
            calls.push(tokio::spawn(async move {
                match peer.call(&Request::Set(forward), deadline).await {
                    Ok(Response::Set) => true,
                    Ok(Response::Error { code, message }) => {
                        warn!(peer = peer.addr(), ?code, %message, "replica rejected write");
                        false
                    }
                    Ok(_) => {
                        warn!(peer = peer.addr(), "replica sent mismatched response");
                        false
                    }
                    Err(err) => {
                        warn!(peer = peer.addr(), error = %err, "replica write failed");
                        false
                    }
                }
            }));
        }

        for outcome in join_all(calls).await {
            if matches!(outcome, Ok(true)) {
                successes += 1;
            }
        }

        if successes < replicas.required {
            debug!(
                key = %request.key,
                successes,
                required = replicas.required,
                "write quorum missed"
            );
            return Err(DkvError::NoWriteQuorum);
        }

        self.cache
            .insert(request.key.as_bytes(), request.value.as_bytes());
        Ok(())
    }

    /// Handles a read.
    ///
    /// Client-origin requests fan out to the key's replica set and require
    /// `required` hits; the highest version among them wins and ties break
    /// arbitrarily. Versions are per-node lineages, so concurrent
    /// independent writes can race to an undefined winner.
    /// Misses and errors are discarded rather than counted: a key absent
    /// from most replicas reports a quorum failure, not `NotFound`. The
    /// read quorum protects read-your-write; it does not prove absence.
    pub async fn get(&self, request: GetRequest) -> DkvResult<GetResponse> {
        if !request.source_node.is_empty() {
            return self.lookup_local(&request.key);
        }

        let replicas = self
            .ring
            .replicas(&request.key)
            .map_err(|_| DkvError::NotFound)?;

        let mut forward = request.clone();
        forward.source_node = self.local_addr.clone();

        // Hits funnel into a channel bounded by the replica count, so a
        // send can never block and draining after the barrier sees all of
        // them.
        let (hits_tx, mut hits_rx) = mpsc::channel::<GetResponse>(replicas.nodes.len());
        let mut calls = Vec::new();
        for node in &replicas.nodes {
            if node.addr == self.local_addr {
                if let Ok(found) = self.lookup_local(&request.key) {
                    let _ = hits_tx.send(found).await;
                }
                continue;
            }

            let peer = self.pool.get(&node.addr);
            let forward = forward.clone();
            let deadline = self.rpc_timeout;
            let hits_tx = hits_tx.clone();
            calls.push(tokio::spawn(async move {
                match peer.call(&Request::Get(forward), deadline).await {
                    Ok(Response::Get(found)) => {
                        let _ = hits_tx.send(found).await;
                    }
                    Ok(Response::Error {
                        code: StatusCode::NotFound,
                        ..
                    }) => {}
                    Ok(Response::Error { code, message }) => {
                        warn!(peer = peer.addr(), ?code, %message, "replica read error");
                    }
                    Ok(_) => {
                        warn!(peer = peer.addr(), "replica sent mismatched response");
                    }
                    Err(err) => {
                        warn!(peer = peer.addr(), error = %err, "replica read failed");
                    }
                }
            }));
        }
        drop(hits_tx);

        join_all(calls).await;

        let mut hits = Vec::new();
        while let Some(found) = hits_rx.recv().await {
            hits.push(found);
        }

        if hits.len() < replicas.required {
            debug!(
                key = %request.key,
                hits = hits.len(),
                required = replicas.required,
                "read quorum missed"
            );
            return Err(DkvError::NoReadQuorum);
        }

        hits.into_iter()
            .max_by_key(|found| found.version)
            .ok_or(DkvError::NotFound)
    }

    fn lookup_local(&self, key: &str) -> DkvResult<GetResponse> {
        match self.cache.lookup(key.as_bytes()) {
            Some((value, version)) => Ok(GetResponse {
                value: String::from_utf8_lossy(&value).into_owned(),
                version,
            }),
            None => Err(DkvError::NotFound),
        }
    }
}
