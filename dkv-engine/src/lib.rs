// dkv-engine - Local cache engine for DistKV
//
// Sharded LRU storage with per-entry TTL and a monotonic version counter,
// used as the replica-local store behind the quorum coordinator.

mod cache;

pub use cache::{CacheStats, ShardedCache};
