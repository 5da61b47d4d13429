//! The channel seam.
//!
//! The wire codec and the datagram socket live outside this crate. A
//! `Transport` implementation encodes and sends; for probes it also tracks
//! the reply window and invokes the completion callback exactly once, from
//! whatever thread the transport runs on. The shell's callbacks only
//! enqueue an event back onto the protocol loop.

use crate::member::{Incarnation, Node, SequenceNumber};
use crate::message::{GossipPayload, PingResponse};
use std::time::Duration;

/// Error reported by the transport for a failed probe.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(Node),

    #[error("channel closed")]
    ChannelClosed,

    #[error("transport error: {0}")]
    Other(String),
}

/// Completion callback for a probe. Called exactly once, from a transport
/// thread.
pub type ProbeCallback = Box<dyn FnOnce(Result<PingResponse, TransportError>) + Send + 'static>;

/// Datagram channel for protocol messages.
///
/// `ack`/`nack` are fire-and-forget. `ping`/`ping_request` expect an
/// answer within `timeout` and report the outcome via `on_response`;
/// datagram loss surfaces as [`TransportError::Timeout`].
pub trait Transport: Send + Sync {
    /// Probe `to` directly.
    #[allow(clippy::too_many_arguments)]
    fn ping(
        &self,
        to: &Node,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    );

    /// Ask `to` to probe `target` on our behalf.
    #[allow(clippy::too_many_arguments)]
    fn ping_request(
        &self,
        to: &Node,
        target: &Node,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    );

    /// Acknowledge probe `acknowledging` of `target` back to `to`.
    fn ack(
        &self,
        to: &Node,
        acknowledging: SequenceNumber,
        target: &Node,
        incarnation: Incarnation,
        payload: GossipPayload,
    );

    /// Tell `to` we could not confirm `target`.
    fn nack(&self, to: &Node, acknowledging: SequenceNumber, target: &Node);
}
