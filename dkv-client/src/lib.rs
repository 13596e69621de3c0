// dkv-client - Peer connections and the client facade for DistKV
//
// One framed TCP connection per peer, dialed lazily and reused for the
// node's lifetime, plus a thin client API for issuing cache requests.

mod client;
mod pool;

pub use client::{CacheClient, ClientConfig};
pub use pool::{Connection, Peer, PeerPool};
