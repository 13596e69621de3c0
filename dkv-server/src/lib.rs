// dkv-server - Node runtime for DistKV
//
// The quorum coordinator, the framed RPC surface, and node configuration.
// The binary in main.rs wires these together with the engine and ring.

pub mod config;
pub mod coordinator;
pub mod server;
