//! # Peer Connection Pool
//!
//! Purpose: Keep one long-lived framed connection per peer address, dialed
//! lazily on first use and reused for the life of the process.
//!
//! ## Design Principles
//! 1. **Singleton Per Address**: The pool maps each address to one peer
//!    handle; callers share it freely.
//! 2. **Minimal Locking**: The pool mutex only guards the map; connection
//!    I/O happens under the peer's own async lock.
//! 3. **Poison On Failure**: Any failed or timed-out exchange drops the
//!    stream, so the next call redials instead of reading a stale response.
//! 4. **No Negative Caching**: A failed dial surfaces to the caller and the
//!    next call simply tries again.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use dkv_common::{decode_frame, encode_frame, DkvError, DkvResult, Request, Response};

/// Single framed TCP connection carrying request/response exchanges in
/// order. The buffers live on the connection to avoid per-call allocations.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_msg_size: usize,
}

impl Connection {
    /// Dials a peer and prepares reusable buffers.
    pub async fn dial(addr: &str, max_msg_size: usize) -> DkvResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        // Fan-out requests are small; trade batching for latency.
        stream.set_nodelay(true)?;
        debug!(peer = %addr, "dialed peer");

        Ok(Connection {
            stream,
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::with_capacity(1024),
            max_msg_size,
        })
    }

    /// Sends one request and reads the matching response.
    pub async fn roundtrip(&mut self, request: &Request) -> DkvResult<Response> {
        self.write_buf.clear();
        encode_frame(request, &mut self.write_buf, self.max_msg_size)?;
        self.stream.write_all(&self.write_buf).await?;

        loop {
            if let Some(response) = decode_frame(&mut self.read_buf, self.max_msg_size)? {
                return Ok(response);
            }
            let read = self.stream.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(DkvError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection mid-response",
                )));
            }
        }
    }
}

/// One peer's lazily-dialed connection slot.
pub struct Peer {
    addr: String,
    max_msg_size: usize,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl Peer {
    fn new(addr: String, max_msg_size: usize) -> Self {
        Peer {
            addr,
            max_msg_size,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Performs one exchange under `deadline`, dialing first if needed.
    ///
    /// The deadline covers dial plus roundtrip. On any failure the slot is
    /// cleared: a cancelled exchange may leave a response in flight on the
    /// stream, and reusing it would hand that response to the next request.
    pub async fn call(&self, request: &Request, deadline: Duration) -> DkvResult<Response> {
        let mut slot = self.conn.lock().await;
        let result = Self::exchange(&mut *slot, &self.addr, self.max_msg_size, request, deadline).await;
        if result.is_err() {
            *slot = None;
        }
        result
    }

    async fn exchange(
        slot: &mut Option<Connection>,
        addr: &str,
        max_msg_size: usize,
        request: &Request,
        deadline: Duration,
    ) -> DkvResult<Response> {
        let exchange = async {
            if slot.is_none() {
                *slot = Some(Connection::dial(addr, max_msg_size).await?);
            }
            match slot.as_mut() {
                Some(conn) => conn.roundtrip(request).await,
                None => Err(DkvError::Internal("connection slot empty after dial".to_string())),
            }
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DkvError::Timeout),
        }
    }
}

/// Process-wide map from peer address to its shared connection slot.
///
/// Peers are registered on first use and never evicted; connections close
/// only when the process exits.
pub struct PeerPool {
    max_msg_size: usize,
    peers: Mutex<HashMap<String, Arc<Peer>>>,
}

impl PeerPool {
    pub fn new(max_msg_size: usize) -> Self {
        PeerPool {
            max_msg_size,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the peer handle for `addr`, registering it if unknown.
    pub fn get(&self, addr: &str) -> Arc<Peer> {
        let mut peers = self.peers.lock();
        match peers.get(addr) {
            Some(peer) => Arc::clone(peer),
            None => {
                let peer = Arc::new(Peer::new(addr.to_string(), self.max_msg_size));
                peers.insert(addr.to_string(), Arc::clone(&peer));
                peer
            }
        }
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
