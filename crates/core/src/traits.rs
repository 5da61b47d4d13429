//! The engine seam.

use crate::directive::{ConfirmDeadOutcome, Directive, MarkOutcome};
use crate::member::{Member, MemberStatus, Node, SequenceNumber};
use crate::message::{GossipPayload, PingResponse};
use crate::settings::Settings;
use std::time::Duration;

/// The SWIM protocol decision engine, driven by the shell.
///
/// The engine owns the membership table, the incarnation counter, the
/// probability-of-suspect calculus, gossip payload selection, and the
/// local-health multiplier (LHM). The shell owns time, the network, and
/// the execution context.
///
/// # Guarantees required of implementations
///
/// - **Synchronous**: no method blocks or awaits.
/// - **Deterministic**: same state + event = same directives.
/// - **No I/O**: all side effects are described by the returned
///   [`Directive`]s and performed by the shell.
///
/// # Guarantees provided by the shell
///
/// - Every method is invoked from the protocol loop; implementations need
///   no internal synchronization.
/// - Directives from one call are executed in order before the next
///   inbound event is delivered.
pub trait SwimEngine {
    /// An inbound direct probe from `origin`.
    fn on_ping(
        &mut self,
        origin: Node,
        payload: GossipPayload,
        sequence_number: SequenceNumber,
    ) -> Vec<Directive>;

    /// An inbound indirect-probe request: `origin` asks us to probe `target`.
    fn on_ping_request(
        &mut self,
        target: Node,
        origin: Node,
        payload: GossipPayload,
        sequence_number: SequenceNumber,
    ) -> Vec<Directive>;

    /// A response (or fabricated timeout) for one of our direct probes.
    ///
    /// `ping_request_origin` is set when the probe was serving an inbound
    /// ping-request; resulting `SendAck`/`SendNack` directives are then
    /// addressed to that origin.
    fn on_ping_response(
        &mut self,
        response: PingResponse,
        ping_request_origin: Option<Node>,
    ) -> Vec<Directive>;

    /// Every relay completion of an indirect fan-out, win or lose.
    ///
    /// This stream feeds LHM bookkeeping and must see all completions,
    /// including those arriving after the fan-out was already decided.
    fn on_every_ping_request_response(&mut self, response: PingResponse, member: Node);

    /// The decisive outcome of an indirect fan-out: the first ack, or the
    /// aggregated timeout if no relay succeeded.
    ///
    /// The aggregated timeout carries sequence number 0; it correlates to
    /// no individual probe and implementations must not match on it.
    fn on_ping_request_response(&mut self, response: PingResponse, member: Node)
        -> Vec<Directive>;

    /// One protocol-period tick. Returns `Ignore` or a `SendPing`.
    fn on_periodic_ping_tick(&mut self) -> Vec<Directive>;

    /// Apply a status transition decided by the shell (suspicion-timeout
    /// escalation). Stale transitions are refused.
    fn mark(&mut self, node: &Node, status: MemberStatus) -> MarkOutcome;

    /// Administratively confirm an unreachable member dead.
    fn confirm_dead(&mut self, node: &Node) -> ConfirmDeadOutcome;

    /// Select gossip to piggyback on a probe of `to`.
    fn make_gossip_payload(&mut self, to: &Node) -> GossipPayload;

    /// Next probe correlation number; monotonic.
    fn next_sequence_number(&mut self) -> SequenceNumber;

    /// Set the engine's logical clock. Called by the shell before every
    /// event is handled.
    fn set_time(&mut self, now: Duration);

    // ─── Read-only accessors ────────────────────────────────────────────

    fn settings(&self) -> &Settings;

    /// Members currently in the suspect state.
    fn suspects(&self) -> Vec<Member>;

    fn all_members(&self) -> Vec<Member>;

    /// Number of members other than the local node.
    fn other_member_count(&self) -> usize;

    /// Look up a member by node, ignoring the UID.
    fn member_for(&self, node: &Node) -> Option<Member>;

    fn is_member(&self, node: &Node, ignore_uid: bool) -> bool;

    /// Suspicion window for a suspect corroborated by `suspected_by` peers.
    fn suspicion_timeout(&self, suspected_by: usize) -> Duration;

    /// Baseline protocol period.
    fn protocol_period(&self) -> Duration;

    /// Protocol period stretched by the current local-health multiplier.
    fn dynamic_lhm_protocol_interval(&self) -> Duration;

    /// Direct-probe timeout stretched by the current local-health multiplier.
    fn dynamic_lhm_ping_timeout(&self) -> Duration;
}
