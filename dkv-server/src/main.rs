//! DistKV node entry point: wire the engine, ring, pool, and coordinator
//! together, seed membership, and serve until interrupted.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dkv_client::PeerPool;
use dkv_engine::ShardedCache;
use dkv_ring::{run_membership, HashRing, MemberEvent, Node};
use dkv_server::config::Config;
use dkv_server::coordinator::Coordinator;
use dkv_server::server::CacheServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cache = Arc::new(ShardedCache::new(
        config.num_shards,
        config.capacity,
        config.ttl,
    ));

    // The local node is a ring member from startup to shutdown; membership
    // events only ever add or remove peers.
    let ring = Arc::new(HashRing::new());
    ring.add(Node::new(config.addr.clone(), config.addr.clone()));

    let (member_tx, member_rx) = mpsc::channel(64);
    tokio::spawn(run_membership(Arc::clone(&ring), member_rx));
    for peer in config.peers.iter().filter(|peer| !peer.is_empty()) {
        member_tx
            .send(MemberEvent::Join(peer.clone()))
            .await
            .map_err(|_| anyhow::anyhow!("membership channel closed during seeding"))?;
    }

    let pool = Arc::new(PeerPool::new(config.max_send_msg_size));
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&cache),
        Arc::clone(&ring),
        pool,
        config.addr.clone(),
        config.rpc_timeout,
    ));
    let server = Arc::new(CacheServer::new(&config, coordinator));

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("failed to listen on {}", config.addr))?;
    info!(addr = %config.addr, seed_peers = config.peers.len(), "node starting");

    tokio::select! {
        result = server.serve(listener) => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => {
            info!(addr = %config.addr, "server shutting down");
        }
    }

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        expirations = stats.expirations,
        "final cache statistics"
    );
    Ok(())
}
