//! Peer handles: a node bound to its transport channel.

use crate::member::{Incarnation, Node, SequenceNumber};
use crate::message::GossipPayload;
use crate::transport::{ProbeCallback, Transport};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// An addressable cluster participant.
///
/// A peer is a lightweight view, not an owned resource: it is a `(node,
/// channel)` pair that is cheap to clone into probe callbacks. Any two
/// peers for the same node are interchangeable for send operations, so
/// equality considers the node only.
#[derive(Clone)]
pub struct Peer {
    node: Node,
    channel: Arc<dyn Transport>,
}

impl Peer {
    pub fn new(node: Node, channel: Arc<dyn Transport>) -> Self {
        Self { node, channel }
    }

    /// The node this peer was constructed from.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Probe this peer directly.
    pub fn ping(
        &self,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    ) {
        self.channel
            .ping(&self.node, payload, from, timeout, sequence_number, on_response);
    }

    /// Ask this peer to probe `target` on our behalf.
    #[allow(clippy::too_many_arguments)]
    pub fn ping_request(
        &self,
        target: &Node,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    ) {
        self.channel.ping_request(
            &self.node,
            target,
            payload,
            from,
            timeout,
            sequence_number,
            on_response,
        );
    }

    /// Acknowledge probe `acknowledging` of `target` to this peer.
    pub fn ack(
        &self,
        acknowledging: SequenceNumber,
        target: &Node,
        incarnation: Incarnation,
        payload: GossipPayload,
    ) {
        self.channel
            .ack(&self.node, acknowledging, target, incarnation, payload);
    }

    /// Tell this peer we could not confirm `target`.
    pub fn nack(&self, acknowledging: SequenceNumber, target: &Node) {
        self.channel.nack(&self.node, acknowledging, target);
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Peer {}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("node", &self.node).finish()
    }
}
