//! Directives: everything the engine can ask the shell to do.
//!
//! Directives are **passive data** — the engine describes the required
//! side effect and the shell executes it. The shell matches exhaustively,
//! so adding a variant here forces the dispatcher to be revisited.

use crate::member::{Incarnation, Member, MemberStatus, Node, SequenceNumber, StatusChange};
use crate::message::GossipPayload;
use std::time::Duration;

/// An instruction emitted by the engine in response to an event.
///
/// Directives returned from a single engine call are executed in emission
/// order before the shell consumes the next inbound event.
#[derive(Debug, Clone)]
pub enum Directive {
    /// The event's piggybacked gossip has been merged into the local view.
    GossipProcessed(GossipOutcome),

    /// Acknowledge a probe of `target` back to the event's reply context.
    ///
    /// When produced while handling an inbound ping, `target` is always
    /// the local node.
    SendAck {
        target: Node,
        incarnation: Incarnation,
        payload: GossipPayload,
        /// Sequence number of the probe being acknowledged.
        acknowledging: SequenceNumber,
    },

    /// Tell `to` that we could not confirm `target` on its behalf.
    SendNack {
        to: Node,
        target: Node,
        acknowledging: SequenceNumber,
    },

    /// Probe `target` directly.
    SendPing {
        target: Node,
        /// Set when this probe serves an inbound ping-request; the
        /// response is forwarded to this origin.
        ping_request_origin: Option<Node>,
        timeout: Duration,
        sequence_number: SequenceNumber,
    },

    /// Probe `target` indirectly through a set of relays.
    SendPingRequests(PingRequestFanout),

    /// A member previously written off has answered.
    Alive {
        previous: Option<MemberStatus>,
        member: Member,
    },

    /// A member has just entered the suspect state.
    NewlySuspect {
        previous: Option<MemberStatus>,
        suspect: Member,
    },

    /// A relay answered with a nack; the engine has recorded it.
    NackReceived,

    /// Nothing to do.
    Ignore,
}

/// Result of merging one gossip payload.
#[derive(Debug, Clone)]
pub enum GossipOutcome {
    /// The payload changed the local view; `change` is set when a single
    /// member transition resulted.
    Applied { change: Option<StatusChange> },

    /// The payload was stale or irrelevant. The engine may suggest a log
    /// level and message for the shell to emit.
    Ignored {
        level: Option<tracing::Level>,
        message: Option<String>,
    },
}

/// One indirect-probe fan-out: ask `probes.len()` relays to probe
/// `target` on our behalf.
///
/// `timeout` is the engine's current dynamic ping timeout; it bounds each
/// relay probe and the fan-out as a whole.
#[derive(Debug, Clone)]
pub struct PingRequestFanout {
    pub target: Node,
    pub timeout: Duration,
    pub probes: Vec<PingRequestProbe>,
}

/// One relay's share of a fan-out, with its own payload and sequence number.
#[derive(Debug, Clone)]
pub struct PingRequestProbe {
    pub relay: Node,
    pub payload: GossipPayload,
    pub sequence_number: SequenceNumber,
}

/// Result of [`SwimEngine::mark`](crate::SwimEngine::mark).
#[derive(Debug, Clone)]
pub enum MarkOutcome {
    /// The transition was applied.
    Applied {
        previous: Option<MemberStatus>,
        member: Member,
    },
    /// The member already has an equal or newer status.
    IgnoredDueToOlderStatus,
}

/// Result of [`SwimEngine::confirm_dead`](crate::SwimEngine::confirm_dead).
#[derive(Debug, Clone)]
pub enum ConfirmDeadOutcome {
    Applied { change: StatusChange },
    Ignored,
}
