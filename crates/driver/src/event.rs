//! Events consumed by the protocol loop.

use crate::timer::TimerKey;
use std::time::Duration;
use swim_core::{Message, Node, PingResponse, SequenceNumber, TransportError};

/// Identifies one indirect-probe fan-out for the lifetime of its
/// first-success promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FanoutId(pub u64);

/// All possible inputs to the protocol loop.
///
/// Every public entry point and every completion callback funnels into
/// this enum; [`Shell::handle`](crate::Shell::handle) is the only
/// consumer, so all engine and shell state mutation is single-threaded by
/// construction. Events own their nodes and payloads, so identity
/// survives the hop across threads.
#[derive(Debug)]
pub enum ShellEvent {
    /// A decoded protocol message delivered by the transport.
    MessageReceived { message: Message },

    /// Local request: start monitoring `node`.
    Monitor { node: Node },

    /// Local request: confirm the unreachable member `node` dead.
    ConfirmDead { node: Node },

    /// A scheduled timer fired.
    TimerFired { key: TimerKey },

    /// A direct probe completed (ack, nack, or transport failure).
    PingProbeCompleted {
        target: Node,
        /// Set when the probe served an inbound ping-request.
        ping_request_origin: Option<Node>,
        timeout: Duration,
        sequence_number: SequenceNumber,
        result: Result<PingResponse, TransportError>,
    },

    /// One relay of an indirect-probe fan-out completed.
    PingRequestProbeCompleted {
        fanout: FanoutId,
        relay: Node,
        target: Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        result: Result<PingResponse, TransportError>,
    },

    /// An initial-contact probe completed.
    ContactProbeCompleted {
        node: Node,
        result: Result<PingResponse, TransportError>,
    },
}
