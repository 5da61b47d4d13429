//! Inbound protocol messages and probe responses.

use crate::member::{Incarnation, Member, Node, SequenceNumber};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Membership rumors piggybacked on probe traffic.
///
/// Produced by [`SwimEngine::make_gossip_payload`](crate::SwimEngine::make_gossip_payload)
/// and applied by the receiving engine; the shell only carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipPayload {
    pub members: Vec<Member>,
}

impl GossipPayload {
    /// The empty payload, used for initial-contact probes.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A protocol message decoded from an inbound datagram.
///
/// The wire codec and the UDP transport live outside this crate; the
/// transport delivers decoded messages to the driver shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A direct probe. The receiver must answer with an ack to `reply_to`.
    Ping {
        reply_to: Node,
        payload: GossipPayload,
        sequence_number: SequenceNumber,
    },

    /// An indirect probe: probe `target` on behalf of `reply_to` and
    /// forward the outcome.
    PingRequest {
        target: Node,
        reply_to: Node,
        payload: GossipPayload,
        sequence_number: SequenceNumber,
    },

    /// A response to one of our probes.
    Response(PingResponse),
}

/// Outcome of a probe, as observed by the prober.
///
/// `Timeout` never crosses the wire: the shell fabricates it when the
/// transport reports a failure or when an indirect fan-out's overall
/// deadline elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingResponse {
    /// The target answered.
    Ack {
        target: Node,
        incarnation: Incarnation,
        payload: GossipPayload,
        sequence_number: SequenceNumber,
    },

    /// A relay declined to vouch for the target (its own probe of the
    /// target got no answer). Feeds health bookkeeping only.
    Nack {
        target: Node,
        sequence_number: SequenceNumber,
    },

    /// No answer within the allotted window.
    Timeout {
        target: Node,
        /// Set when the timed-out probe was serving an indirect request.
        ping_request_origin: Option<Node>,
        timeout: Duration,
        sequence_number: SequenceNumber,
    },
}

impl PingResponse {
    /// The member this response is about.
    pub fn target(&self) -> &Node {
        match self {
            PingResponse::Ack { target, .. }
            | PingResponse::Nack { target, .. }
            | PingResponse::Timeout { target, .. } => target,
        }
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        match self {
            PingResponse::Ack {
                sequence_number, ..
            }
            | PingResponse::Nack {
                sequence_number, ..
            }
            | PingResponse::Timeout {
                sequence_number, ..
            } => *sequence_number,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, PingResponse::Ack { .. })
    }
}
