//! # Membership Adapter
//!
//! Purpose: Translate the cluster membership event stream into ring
//! mutations. Failure detection itself lives in the membership layer; this
//! adapter only mirrors its verdicts onto the ring.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::ring::{HashRing, Node};

/// Membership change reported by the cluster membership layer.
///
/// The carried name doubles as the node's ring ID and dial address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberEvent {
    Join(String),
    Leave(String),
    Update(String),
}

/// Applies membership events to the ring until the sender side closes.
///
/// Join adds the node under its name, Leave removes it, Update carries no
/// ring-relevant state and is ignored. Ring insertion is idempotent on ID,
/// so seed joins and the local self-join never conflict.
pub async fn run_membership(ring: Arc<HashRing>, mut events: mpsc::Receiver<MemberEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            MemberEvent::Join(name) => {
                info!(node = %name, "node joined");
                ring.add(Node::new(name.clone(), name));
            }
            MemberEvent::Leave(name) => {
                info!(node = %name, "node left");
                ring.remove(&name);
            }
            MemberEvent::Update(name) => {
                debug!(node = %name, "node updated");
            }
        }
    }
    debug!("membership stream closed");
}
