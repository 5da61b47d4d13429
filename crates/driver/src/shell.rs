//! The driver shell: turns a [`SwimEngine`] into a live cluster participant.
//!
//! `Shell` owns the engine and interprets every directive it emits. It is
//! driven one [`ShellEvent`] at a time via [`Shell::handle`], which runs
//! synchronously to completion and buffers [`TimerOp`]s for the runner to
//! apply. Both driving modes share these paths:
//!
//! - **Production**: [`run_protocol_loop`](crate::run_protocol_loop)
//!   blocks on crossbeam channels, feeding events as they arrive from
//!   transport callbacks, timers, and [`ShellHandle`](crate::ShellHandle)s.
//! - **Tests/simulation**: the harness calls `set_time` and `handle`
//!   directly with a logical clock, then inspects the buffered timer ops.
//!
//! Probe completions never touch shell state from transport threads: the
//! callbacks enqueue a completion event that re-enters through `handle`.

use crate::event::{FanoutId, ShellEvent};
use crate::timer::{TimerKey, TimerOp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use swim_core::{
    ConfirmDeadOutcome, Directive, GossipOutcome, GossipPayload, Incarnation, MarkOutcome, Member,
    MemberStatus, Message, Node, Peer, PingRequestFanout, PingResponse, SequenceNumber,
    StatusChange, SwimEngine, Transport,
};
use tracing::{debug, error, info, trace, warn};

/// Callback invoked (synchronously, on the protocol loop) for every
/// member reachability change.
pub type StatusChangeCallback = Box<dyn FnMut(StatusChange) + Send>;

/// Output from processing a single event via [`Shell::handle`].
#[derive(Debug, Default)]
pub struct StepOutput {
    /// Timer operations (set/cancel) to be applied by the runner.
    pub timer_ops: Vec<TimerOp>,
    /// Number of engine directives executed during this step.
    pub directives_handled: usize,
}

/// Reply context for directives produced by one engine call.
///
/// `SendAck` resolves its recipient from this context; the acknowledged
/// target must equal the local node only in the inbound-ping case.
#[derive(Debug, Clone, Copy)]
enum ReplyContext<'a> {
    /// Directives from a tick, a fan-out decision, or a local request.
    None,
    /// Directives from an inbound ping; replies go to the ping origin.
    PingOrigin(&'a Node),
    /// Directives from a probe that served an indirect request; replies
    /// go to the requesting origin.
    PingRequestOrigin(&'a Node),
}

impl<'a> ReplyContext<'a> {
    fn reply_to(&self) -> Option<&'a Node> {
        match *self {
            ReplyContext::None => None,
            ReplyContext::PingOrigin(node) | ReplyContext::PingRequestOrigin(node) => Some(node),
        }
    }
}

/// One in-flight indirect-probe fan-out.
///
/// Presence in [`Shell::pending_fanouts`] *is* the unresolved first-success
/// promise: the first ack removes the entry and cancels the round timer;
/// the round timer removes the entry and synthesizes the aggregated
/// timeout. Relay completions arriving after removal still feed the
/// every-response stream, since the completion event carries the target.
#[derive(Debug)]
struct FanoutState {
    target: Node,
    timeout: Duration,
}

/// The driver shell.
///
/// Exclusively owned by the protocol loop; external callers interact
/// through [`ShellHandle`](crate::ShellHandle) or by enqueueing
/// [`ShellEvent`]s.
pub struct Shell<E: SwimEngine> {
    engine: E,
    self_peer: Peer,
    channel: Arc<dyn Transport>,
    /// Probe completions re-enter the loop through this sender.
    event_tx: crossbeam::channel::Sender<ShellEvent>,
    on_member_status_change: StatusChangeCallback,

    /// Logical clock, set by the runner before each step.
    now: Duration,

    next_fanout: u64,
    pending_fanouts: HashMap<FanoutId, FanoutState>,
    contact_attempts: HashMap<Node, u32>,

    // Accumulated outputs from the current step.
    pending_timer_ops: Vec<TimerOp>,
    directives_handled: usize,

    shut_down: bool,
}

impl<E: SwimEngine> Shell<E> {
    /// Create a shell around `engine`, bound to `channel`.
    ///
    /// `event_tx` must feed the loop that drives this shell; probe
    /// completion callbacks send into it. Call [`start`](Self::start)
    /// next.
    pub fn new(
        node: Node,
        engine: E,
        channel: Arc<dyn Transport>,
        event_tx: crossbeam::channel::Sender<ShellEvent>,
        on_member_status_change: StatusChangeCallback,
    ) -> Self {
        Self {
            self_peer: Peer::new(node, Arc::clone(&channel)),
            engine,
            channel,
            event_tx,
            on_member_status_change,
            now: Duration::ZERO,
            next_fanout: 0,
            pending_fanouts: HashMap::new(),
            contact_attempts: HashMap::new(),
            pending_timer_ops: Vec::new(),
            directives_handled: 0,
            shut_down: false,
        }
    }

    /// Bring the shell online: announce the local node as alive, begin
    /// monitoring all configured initial contact points, and (if
    /// `start_periodic`) schedule the first protocol-period tick.
    pub fn start(&mut self, start_periodic: bool) -> StepOutput {
        self.begin_step();

        let myself = Member::alive(self.self_peer.node().clone(), Incarnation(0));
        info!(node = %myself.node, "membership shell starting");
        (self.on_member_status_change)(StatusChange::new(None, myself));

        for contact in self.engine.settings().initial_contact_points.clone() {
            self.receive_start_monitoring(contact);
        }

        if start_periodic {
            self.schedule_next_tick();
        }

        self.drain_step()
    }

    /// Set the logical clock. Must be called before [`handle`](Self::handle)
    /// to keep the shell and engine in sync with the driving environment.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.engine.set_time(now);
    }

    /// Process a single event and execute all resulting directives.
    ///
    /// After shutdown this is a no-op returning an empty step, so
    /// in-flight completions and stale timer fires resolve harmlessly.
    pub fn handle(&mut self, event: ShellEvent) -> StepOutput {
        if self.shut_down {
            return StepOutput::default();
        }
        self.begin_step();

        match event {
            ShellEvent::MessageReceived { message } => self.receive_message(message),
            ShellEvent::Monitor { node } => self.receive_start_monitoring(node),
            ShellEvent::ConfirmDead { node } => self.receive_confirm_dead(node),
            ShellEvent::TimerFired { key } => self.handle_timer_fired(key),
            ShellEvent::PingProbeCompleted {
                target,
                ping_request_origin,
                timeout,
                sequence_number,
                result,
            } => self.handle_ping_probe_completed(
                target,
                ping_request_origin,
                timeout,
                sequence_number,
                result,
            ),
            ShellEvent::PingRequestProbeCompleted {
                fanout,
                relay,
                target,
                timeout,
                sequence_number,
                result,
            } => self.handle_ping_request_probe_completed(
                fanout,
                relay,
                target,
                timeout,
                sequence_number,
                result,
            ),
            ShellEvent::ContactProbeCompleted { node, result } => {
                self.handle_contact_probe_completed(node, result)
            }
        }

        self.drain_step()
    }

    /// Stop accepting work. Cancels the pending periodic tick; every later
    /// [`handle`](Self::handle) call returns an empty step.
    pub fn shutdown(&mut self) -> StepOutput {
        self.begin_step();
        self.shut_down = true;
        self.pending_timer_ops.push(TimerOp::Cancel {
            key: TimerKey::PeriodicPing,
        });
        info!(node = %self.self_peer.node(), "membership shell shutting down");
        self.drain_step()
    }

    /// Access the engine (read-only; mutation belongs to the loop).
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutably access the engine, for setup and simulation harnesses.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn begin_step(&mut self) {
        self.pending_timer_ops.clear();
        self.directives_handled = 0;
    }

    fn drain_step(&mut self) -> StepOutput {
        StepOutput {
            timer_ops: std::mem::take(&mut self.pending_timer_ops),
            directives_handled: self.directives_handled,
        }
    }

    fn peer(&self, node: &Node) -> Peer {
        Peer::new(node.clone(), Arc::clone(&self.channel))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inbound messages
    // ═══════════════════════════════════════════════════════════════════

    fn receive_message(&mut self, message: Message) {
        match message {
            Message::Ping {
                reply_to,
                payload,
                sequence_number,
            } => self.receive_ping(reply_to, payload, sequence_number),
            Message::PingRequest {
                target,
                reply_to,
                payload,
                sequence_number,
            } => self.receive_ping_request(target, reply_to, payload, sequence_number),
            Message::Response(response) => self.receive_ping_response(response, None),
        }
    }

    fn receive_ping(&mut self, origin: Node, payload: GossipPayload, seq: SequenceNumber) {
        trace!(origin = %origin, seq = seq.0, "received ping");
        let directives = self.engine.on_ping(origin.clone(), payload, seq);
        self.process_directives(directives, ReplyContext::PingOrigin(&origin));
    }

    fn receive_ping_request(
        &mut self,
        target: Node,
        origin: Node,
        payload: GossipPayload,
        seq: SequenceNumber,
    ) {
        trace!(target = %target, origin = %origin, seq = seq.0, "received ping request");
        let directives = self
            .engine
            .on_ping_request(target, origin.clone(), payload, seq);
        self.process_directives(directives, ReplyContext::PingRequestOrigin(&origin));
    }

    fn receive_ping_response(&mut self, response: PingResponse, ping_request_origin: Option<Node>) {
        trace!(
            target = %response.target(),
            seq = response.sequence_number().0,
            "received ping response"
        );
        let directives = self
            .engine
            .on_ping_response(response, ping_request_origin.clone());
        match &ping_request_origin {
            Some(origin) => {
                self.process_directives(directives, ReplyContext::PingRequestOrigin(origin))
            }
            None => self.process_directives(directives, ReplyContext::None),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Directive dispatch
    // ═══════════════════════════════════════════════════════════════════

    /// Execute directives from one engine call, in emission order.
    fn process_directives(&mut self, directives: Vec<Directive>, ctx: ReplyContext<'_>) {
        for directive in directives {
            self.directives_handled += 1;
            match directive {
                Directive::GossipProcessed(outcome) => self.handle_gossip_outcome(outcome),

                Directive::SendAck {
                    target,
                    incarnation,
                    payload,
                    acknowledging,
                } => {
                    if let ReplyContext::PingOrigin(_) = ctx {
                        debug_assert_eq!(
                            &target,
                            self.self_peer.node(),
                            "inbound ping acknowledged a target other than the local node"
                        );
                    }
                    let Some(reply_to) = ctx.reply_to() else {
                        error!(target = %target, "send_ack directive with no reply context");
                        continue;
                    };
                    self.peer(reply_to)
                        .ack(acknowledging, &target, incarnation, payload);
                }

                Directive::SendNack {
                    to,
                    target,
                    acknowledging,
                } => {
                    self.peer(&to).nack(acknowledging, &target);
                }

                Directive::SendPing {
                    target,
                    ping_request_origin,
                    timeout,
                    sequence_number,
                } => self.send_ping(target, ping_request_origin, timeout, sequence_number),

                Directive::SendPingRequests(fanout) => self.send_ping_requests(fanout),

                Directive::Alive { previous, member } => {
                    self.try_announce(Some(StatusChange::new(previous, member)));
                }

                Directive::NewlySuspect { previous, suspect } => {
                    self.try_announce(Some(StatusChange::new(previous, suspect)));
                }

                Directive::NackReceived => trace!("nack received"),

                Directive::Ignore => trace!("engine ignored event"),
            }
        }
    }

    fn handle_gossip_outcome(&mut self, outcome: GossipOutcome) {
        match outcome {
            GossipOutcome::Applied { change } => self.try_announce(change),
            GossipOutcome::Ignored { level, message } => {
                let Some(message) = message else { return };
                use tracing::Level;
                let level = level.unwrap_or(Level::TRACE);
                if level == Level::ERROR {
                    error!("{message}");
                } else if level == Level::WARN {
                    warn!("{message}");
                } else if level == Level::INFO {
                    info!("{message}");
                } else if level == Level::DEBUG {
                    debug!("{message}");
                } else {
                    trace!("{message}");
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Probe orchestration
    // ═══════════════════════════════════════════════════════════════════

    /// Issue a direct probe. The completion re-enters the loop as a
    /// [`ShellEvent::PingProbeCompleted`]; nothing is mutated from the
    /// transport thread.
    fn send_ping(
        &mut self,
        target: Node,
        ping_request_origin: Option<Node>,
        timeout: Duration,
        sequence_number: SequenceNumber,
    ) {
        let payload = self.engine.make_gossip_payload(&target);
        debug!(target = %target, seq = sequence_number.0, ?timeout, "sending ping");

        let event_tx = self.event_tx.clone();
        let completed_target = target.clone();
        let completed_origin = ping_request_origin.clone();
        self.peer(&target).ping(
            payload,
            self.self_peer.node(),
            timeout,
            sequence_number,
            Box::new(move |result| {
                let _ = event_tx.send(ShellEvent::PingProbeCompleted {
                    target: completed_target,
                    ping_request_origin: completed_origin,
                    timeout,
                    sequence_number,
                    result,
                });
            }),
        );
    }

    fn handle_ping_probe_completed(
        &mut self,
        target: Node,
        ping_request_origin: Option<Node>,
        timeout: Duration,
        sequence_number: SequenceNumber,
        result: Result<PingResponse, swim_core::TransportError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                if !matches!(error, swim_core::TransportError::Timeout(_)) {
                    debug!(target = %target, %error, "ping failed, treating as timeout");
                }
                PingResponse::Timeout {
                    target: target.clone(),
                    ping_request_origin: ping_request_origin.clone(),
                    timeout,
                    sequence_number,
                }
            }
        };
        self.receive_ping_response(response, ping_request_origin);
    }

    /// Issue an indirect-probe fan-out and arm its first-success promise.
    fn send_ping_requests(&mut self, fanout: PingRequestFanout) {
        if fanout.probes.is_empty() {
            warn!(target = %fanout.target, "ping request fan-out with no relays");
            let response = PingResponse::Timeout {
                target: fanout.target.clone(),
                ping_request_origin: None,
                timeout: fanout.timeout,
                sequence_number: SequenceNumber(0),
            };
            let directives = self.engine.on_ping_request_response(response, fanout.target);
            self.process_directives(directives, ReplyContext::None);
            return;
        }

        let id = FanoutId(self.next_fanout);
        self.next_fanout += 1;
        self.pending_fanouts.insert(
            id,
            FanoutState {
                target: fanout.target.clone(),
                timeout: fanout.timeout,
            },
        );
        self.pending_timer_ops.push(TimerOp::Set {
            key: TimerKey::PingRequestRound(id),
            delay: fanout.timeout,
        });
        debug!(
            target = %fanout.target,
            relays = fanout.probes.len(),
            timeout = ?fanout.timeout,
            "sending ping requests"
        );

        for probe in fanout.probes {
            let event_tx = self.event_tx.clone();
            let relay = probe.relay.clone();
            let completed_target = fanout.target.clone();
            let timeout = fanout.timeout;
            let sequence_number = probe.sequence_number;
            self.peer(&probe.relay).ping_request(
                &fanout.target,
                probe.payload,
                self.self_peer.node(),
                timeout,
                sequence_number,
                Box::new(move |result| {
                    let _ = event_tx.send(ShellEvent::PingRequestProbeCompleted {
                        fanout: id,
                        relay,
                        target: completed_target,
                        timeout,
                        sequence_number,
                        result,
                    });
                }),
            );
        }
    }

    /// One relay completed. The engine sees *every* completion on the
    /// health-bookkeeping stream; only the first ack decides the fan-out.
    fn handle_ping_request_probe_completed(
        &mut self,
        fanout: FanoutId,
        relay: Node,
        target: Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        result: Result<PingResponse, swim_core::TransportError>,
    ) {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                if !matches!(error, swim_core::TransportError::Timeout(_)) {
                    debug!(relay = %relay, %error, "ping request relay failed");
                }
                PingResponse::Timeout {
                    target: target.clone(),
                    ping_request_origin: None,
                    timeout,
                    sequence_number,
                }
            }
        };

        self.engine
            .on_every_ping_request_response(response.clone(), target.clone());

        if response.is_ack() && self.pending_fanouts.remove(&fanout).is_some() {
            self.pending_timer_ops.push(TimerOp::Cancel {
                key: TimerKey::PingRequestRound(fanout),
            });
            let directives = self.engine.on_ping_request_response(response, target);
            self.process_directives(directives, ReplyContext::None);
        }
    }

    /// The fan-out deadline elapsed with no relay ack: resolve the promise
    /// with the aggregated timeout. Its sequence number is 0 — it
    /// correlates to no individual probe.
    fn handle_fanout_deadline(&mut self, fanout: FanoutId) {
        let Some(state) = self.pending_fanouts.remove(&fanout) else {
            return;
        };
        debug!(target = %state.target, "ping request fan-out timed out");
        let response = PingResponse::Timeout {
            target: state.target.clone(),
            ping_request_origin: None,
            timeout: state.timeout,
            sequence_number: SequenceNumber(0),
        };
        let directives = self.engine.on_ping_request_response(response, state.target);
        self.process_directives(directives, ReplyContext::None);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Periodic tick
    // ═══════════════════════════════════════════════════════════════════

    fn handle_timer_fired(&mut self, key: TimerKey) {
        match key {
            TimerKey::PeriodicPing => self.handle_periodic_tick(),
            TimerKey::PingRequestRound(fanout) => self.handle_fanout_deadline(fanout),
            TimerKey::ContactRetry(node) => self.receive_start_monitoring(node),
        }
    }

    fn handle_periodic_tick(&mut self) {
        self.check_suspicion_timeouts();
        let directives = self.engine.on_periodic_ping_tick();
        self.process_directives(directives, ReplyContext::None);
        self.schedule_next_tick();
    }

    /// Chain the next tick at the engine's current LHM-stretched interval.
    /// Setting the key replaces any pending tick, so at most one is ever
    /// scheduled.
    fn schedule_next_tick(&mut self) {
        self.pending_timer_ops.push(TimerOp::Set {
            key: TimerKey::PeriodicPing,
            delay: self.engine.dynamic_lhm_protocol_interval(),
        });
    }

    /// Escalate every suspect whose suspicion window has elapsed.
    ///
    /// Entries without an incarnation are already dead and awaiting
    /// reaping; they are skipped and the scan continues.
    fn check_suspicion_timeouts(&mut self) {
        for member in self.engine.suspects() {
            let MemberStatus::Suspect {
                incarnation,
                suspected_by,
            } = &member.status
            else {
                continue;
            };
            let Some(started_at) = member.suspicion_started_at else {
                continue;
            };
            let deadline = started_at + self.engine.suspicion_timeout(suspected_by.len());
            if deadline > self.now {
                continue;
            }

            let incarnation = *incarnation;
            let next_status = if self.engine.settings().unreachability.is_enabled() {
                MemberStatus::Unreachable { incarnation }
            } else {
                MemberStatus::Dead
            };
            debug!(
                member = %member.node,
                status = %next_status,
                "suspicion timeout elapsed"
            );
            match self.engine.mark(&member.node, next_status) {
                MarkOutcome::Applied { previous, member } => {
                    self.try_announce(Some(StatusChange::new(previous, member)));
                }
                MarkOutcome::IgnoredDueToOlderStatus => {
                    trace!(member = %member.node, "escalation ignored, status already newer")
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Bootstrap & monitoring
    // ═══════════════════════════════════════════════════════════════════

    /// Begin monitoring `node`: one-shot ping with an empty payload, then
    /// hand the response to the normal response path. Failures retry after
    /// [`Settings::contact_retry_interval`](swim_core::Settings), capped by
    /// [`Settings::max_contact_attempts`](swim_core::Settings).
    ///
    /// Monitoring ourselves — including a different incarnation of our own
    /// address — and monitoring an existing member are no-ops.
    fn receive_start_monitoring(&mut self, node: Node) {
        if node.without_uid() == self.self_peer.node().without_uid() {
            trace!(node = %node, "refusing to monitor ourselves");
            return;
        }
        if self.engine.is_member(&node, true) {
            trace!(node = %node, "already a member, not monitoring");
            return;
        }

        let sequence_number = self.engine.next_sequence_number();
        let timeout = self.engine.settings().contact_probe_timeout;
        debug!(node = %node, seq = sequence_number.0, "probing contact point");

        let event_tx = self.event_tx.clone();
        let probed = node.clone();
        self.peer(&node).ping(
            GossipPayload::none(),
            self.self_peer.node(),
            timeout,
            sequence_number,
            Box::new(move |result| {
                let _ = event_tx.send(ShellEvent::ContactProbeCompleted {
                    node: probed,
                    result,
                });
            }),
        );
    }

    fn handle_contact_probe_completed(
        &mut self,
        node: Node,
        result: Result<PingResponse, swim_core::TransportError>,
    ) {
        match result {
            Ok(response) => {
                self.contact_attempts.remove(&node);
                self.receive_ping_response(response, None);
            }
            Err(error) => {
                let attempts = self.contact_attempts.entry(node.clone()).or_insert(0);
                *attempts += 1;
                let attempts = *attempts;
                let exhausted = self
                    .engine
                    .settings()
                    .max_contact_attempts
                    .is_some_and(|max| attempts >= max);
                if exhausted {
                    warn!(node = %node, attempts, %error, "giving up on contact point");
                    self.contact_attempts.remove(&node);
                    return;
                }
                let retry_in = self.engine.settings().contact_retry_interval;
                warn!(node = %node, attempts, %error, ?retry_in, "contact probe failed, will retry");
                self.pending_timer_ops.push(TimerOp::Set {
                    key: TimerKey::ContactRetry(node),
                    delay: retry_in,
                });
            }
        }
    }

    /// Administratively confirm an unreachable member dead.
    fn receive_confirm_dead(&mut self, node: Node) {
        if !self.engine.settings().unreachability.is_enabled() {
            warn!(
                node = %node,
                "confirm_dead requires the unreachability extension, ignoring"
            );
            return;
        }
        let Some(member) = self.engine.member_for(&node) else {
            warn!(node = %node, "confirm_dead for unknown member, ignoring");
            return;
        };
        match self.engine.confirm_dead(&member.node) {
            ConfirmDeadOutcome::Applied { change } => {
                info!(member = %change.member.node, "member confirmed dead");
                self.try_announce(Some(change));
            }
            ConfirmDeadOutcome::Ignored => {
                trace!(node = %node, "confirm_dead ignored by engine")
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Membership announcements
    // ═══════════════════════════════════════════════════════════════════

    /// Deliver a status change to the embedder iff it crosses the
    /// reachable⇄unreachable boundary. Transitions on the same side of
    /// the boundary were already visible through earlier announcements.
    fn try_announce(&mut self, change: Option<StatusChange>) {
        let Some(change) = change else { return };
        if !change.is_reachability_change() {
            return;
        }
        debug!(
            member = %change.member.node,
            status = %change.member.status,
            "announcing reachability change"
        );
        (self.on_member_status_change)(change);
    }
}
