//! # Consistent Hash Ring
//!
//! Purpose: Place cluster members on a hash circle and resolve each key to
//! the ordered set of replicas responsible for it.
//!
//! ## Design Principles
//! 1. **Interoperable Hashing**: Positions are the first four SHA-1 digest
//!    bytes decoded little-endian, so every node computes identical rings.
//! 2. **Majority Replication**: The replication factor tracks the member
//!    count as `size / 2 + 1` and is recomputed on every mutation.
//! 3. **Stable Ordering**: Members sort by `(hash, id)`; equal hashes keep a
//!    deterministic order across nodes.
//! 4. **One Lock**: Membership churn is rare and the ring is small, so every
//!    operation takes the same mutex rather than maintaining snapshots.

use std::sync::Arc;

use parking_lot::Mutex;
use sha1::{Digest, Sha1};

use dkv_common::{DkvError, DkvResult};

/// Ring position for a string: the first four bytes of its SHA-1 digest,
/// decoded little-endian.
pub fn ring_hash(key: &str) -> u32 {
    let digest = Sha1::digest(key.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// A cluster member: the identity it hashes under and the address peers
/// dial. The membership layer uses one name for both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub addr: String,
}

impl Node {
    pub fn new(id: impl Into<String>, addr: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            addr: addr.into(),
        }
    }
}

/// The replicas for one key, with the quorum size captured under the same
/// lock so a concurrent membership change cannot skew one request's math.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    /// Distinct replicas in ring order, starting at the key's successor.
    pub nodes: Vec<Arc<Node>>,
    /// Successes required for the operation to count as quorate.
    pub required: usize,
}

fn quorum(size: usize) -> usize {
    size / 2 + 1
}

#[derive(Debug)]
struct RingState {
    /// Members sorted by (hash, id).
    slots: Vec<(u32, Arc<Node>)>,
    replication: usize,
}

/// Consistent hash ring over the live member set.
#[derive(Debug)]
pub struct HashRing {
    state: Mutex<RingState>,
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl HashRing {
    pub fn new() -> Self {
        HashRing {
            state: Mutex::new(RingState {
                slots: Vec::new(),
                replication: quorum(0),
            }),
        }
    }

    /// Number of members on the ring.
    pub fn size(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Current replication factor.
    pub fn replication(&self) -> usize {
        self.state.lock().replication
    }

    /// Overrides the replication factor until the next membership change.
    ///
    /// An operational and testing knob; normal operation relies on the
    /// recomputed majority.
    pub fn set_replication(&self, replication: usize) {
        self.state.lock().replication = replication;
    }

    /// Adds a member. Re-adding an already-known ID is a no-op, which makes
    /// self-joins from the membership stream harmless.
    pub fn add(&self, node: Node) {
        let mut state = self.state.lock();
        if state.slots.iter().any(|(_, member)| member.id == node.id) {
            return;
        }

        let hash = ring_hash(&node.id);
        let node = Arc::new(node);
        let at = state
            .slots
            .partition_point(|(slot_hash, member)| (*slot_hash, member.id.as_str()) < (hash, node.id.as_str()));
        state.slots.insert(at, (hash, node));
        state.replication = quorum(state.slots.len());
    }

    /// Removes the member with the given ID, if present.
    pub fn remove(&self, node_id: &str) {
        let mut state = self.state.lock();
        if let Some(at) = state.slots.iter().position(|(_, member)| member.id == node_id) {
            state.slots.remove(at);
            state.replication = quorum(state.slots.len());
        }
    }

    /// Resolves the replica set for a key.
    ///
    /// Walks clockwise from the key's successor collecting distinct nodes.
    /// Fails with [`DkvError::Unavailable`] when the ring is empty or holds
    /// fewer distinct members than the replication factor.
    pub fn replicas(&self, key: &str) -> DkvResult<ReplicaSet> {
        let state = self.state.lock();
        let size = state.slots.len();
        let required = state.replication;
        if size == 0 || required > size {
            return Err(DkvError::Unavailable);
        }

        let hash = ring_hash(key);
        let start = state.slots.partition_point(|(slot_hash, _)| *slot_hash < hash) % size;

        let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(required);
        let mut at = start;
        loop {
            let (_, member) = &state.slots[at];
            if !nodes.iter().any(|node| node.id == member.id) {
                nodes.push(Arc::clone(member));
                if nodes.len() == required {
                    break;
                }
            }
            at = (at + 1) % size;
            if at == start {
                break;
            }
        }

        if nodes.len() < required {
            return Err(DkvError::Unavailable);
        }
        Ok(ReplicaSet { nodes, required })
    }

    /// Snapshot of the ring members in position order.
    pub fn members(&self) -> Vec<(u32, Arc<Node>)> {
        self.state.lock().slots.clone()
    }
}
