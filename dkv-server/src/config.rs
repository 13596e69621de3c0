//! # Node Configuration
//!
//! Purpose: Resolve every runtime knob from flags with environment-variable
//! fallbacks, so containerized deployments can run the node bare.

use std::time::Duration;

use clap::Parser;

fn parse_secs(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_secs(arg.parse()?))
}

/// Runtime configuration for one cache node.
#[derive(Debug, Clone, Parser)]
#[command(name = "dkv-server", about = "Distributed in-memory key-value cache node")]
pub struct Config {
    /// Listen address; doubles as this node's ring identity.
    #[arg(long, env = "DKV_ADDR", default_value = "localhost:8080")]
    pub addr: String,

    /// Seed peers for membership bootstrap, comma separated.
    #[arg(long, env = "DKV_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Shard count for the local cache.
    #[arg(long, env = "DKV_NUM_SHARDS", default_value_t = 1)]
    pub num_shards: usize,

    /// Total local cache capacity in entries, split across shards.
    #[arg(long, env = "DKV_CAPACITY", default_value_t = 1000)]
    pub capacity: usize,

    /// Entry time-to-live in seconds.
    #[arg(long, env = "DKV_TTL", default_value = "3600", value_parser = parse_secs)]
    pub ttl: Duration,

    /// Cap on inbound message size in bytes.
    #[arg(long, env = "DKV_MAX_RECV_MSG_SIZE", default_value_t = 4 * 1024 * 1024)]
    pub max_recv_msg_size: usize,

    /// Cap on outbound message size in bytes.
    #[arg(long, env = "DKV_MAX_SEND_MSG_SIZE", default_value_t = 4 * 1024 * 1024)]
    pub max_send_msg_size: usize,

    /// Deadline in seconds for each replica fan-out call.
    #[arg(long, env = "DKV_RPC_TIMEOUT", default_value = "5", value_parser = parse_secs)]
    pub rpc_timeout: Duration,

    /// Token refill rate for the node-wide limiter, in requests per second.
    #[arg(long, env = "DKV_RATE_LIMIT", default_value_t = 10)]
    pub rate_limit: u32,

    /// Token bucket capacity for the node-wide limiter.
    #[arg(long, env = "DKV_RATE_LIMIT_BURST", default_value_t = 100)]
    pub rate_limit_burst: u32,
}
