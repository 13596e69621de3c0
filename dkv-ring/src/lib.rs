// dkv-ring - Consistent hash ring and cluster membership adapter for DistKV
//
// Maps keys to replica sets over the live member set and keeps the ring in
// step with join/leave events from the membership layer.

mod member;
mod ring;

pub use member::{run_membership, MemberEvent};
pub use ring::{ring_hash, HashRing, Node, ReplicaSet};
