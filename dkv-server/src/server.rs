//! # RPC Surface
//!
//! Purpose: Accept framed connections, apply the node-wide rate limit, and
//! hand decoded requests to the coordinator.
//!
//! Handlers stay thin: every decision about replicas and quorums lives in
//! the coordinator; this layer only frames, limits, and maps errors onto
//! wire status codes.

use std::io;
use std::num::NonZeroU32;
use std::sync::Arc;

use bytes::BytesMut;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use dkv_common::{decode_frame, encode_frame, DkvError, DkvResult, Request, Response};

use crate::config::Config;
use crate::coordinator::Coordinator;

/// Framed TCP server in front of the coordinator.
pub struct CacheServer {
    coordinator: Arc<Coordinator>,
    limiter: DefaultDirectRateLimiter,
    max_recv_msg_size: usize,
    max_send_msg_size: usize,
}

impl CacheServer {
    /// Builds the server, including the token bucket sized from config.
    pub fn new(config: &Config, coordinator: Arc<Coordinator>) -> Self {
        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.rate_limit_burst).unwrap_or(NonZeroU32::MIN);

        CacheServer {
            coordinator,
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            max_recv_msg_size: config.max_recv_msg_size,
            max_send_msg_size: config.max_send_msg_size,
        }
    }

    /// Accepts connections until the listener fails.
    ///
    /// Connection tasks live in a `JoinSet` owned by this future: dropping
    /// the serve future (shutdown) tears down every open connection with
    /// it.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "server listening");
        let mut connections = JoinSet::new();

        loop {
            let (stream, remote) = listener.accept().await?;
            let server = Arc::clone(&self);
            connections.spawn(async move {
                if let Err(err) = server.handle_connection(stream).await {
                    debug!(%remote, error = %err, "connection ended with error");
                }
            });

            // Reap finished connection tasks so the set stays bounded.
            while connections.try_join_next().is_some() {}
        }
    }

    /// Serves one connection: read frames, dispatch, answer in order.
    async fn handle_connection(&self, mut stream: TcpStream) -> DkvResult<()> {
        let mut read_buf = BytesMut::with_capacity(8 * 1024);
        let mut write_buf = BytesMut::with_capacity(1024);

        loop {
            while let Some(request) = decode_frame::<Request>(&mut read_buf, self.max_recv_msg_size)? {
                let response = self.dispatch(request).await;

                write_buf.clear();
                if let Err(err) = encode_frame(&response, &mut write_buf, self.max_send_msg_size) {
                    // The payload outgrew the send cap; answer with the
                    // error instead of killing the connection.
                    warn!(error = %err, "response exceeded send limit");
                    write_buf.clear();
                    encode_frame(&Response::from_error(&err), &mut write_buf, self.max_send_msg_size)?;
                }
                stream.write_all(&write_buf).await?;
            }

            let read = stream.read_buf(&mut read_buf).await?;
            if read == 0 {
                return Ok(());
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        if self.limiter.check().is_err() {
            return Response::from_error(&DkvError::RateLimited);
        }

        match request {
            Request::Set(set) => match self.coordinator.set(set).await {
                Ok(()) => Response::Set,
                Err(err) => Response::from_error(&err),
            },
            Request::Get(get) => match self.coordinator.get(get).await {
                Ok(found) => Response::Get(found),
                Err(err) => Response::from_error(&err),
            },
        }
    }
}
