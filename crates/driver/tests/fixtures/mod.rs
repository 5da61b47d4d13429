//! Shared fixtures for driver shell tests: a scripted engine and a
//! harness that drives the shell with a logical clock.

#![allow(dead_code)]

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swim_core::{
    ConfirmDeadOutcome, Directive, GossipPayload, Incarnation, MarkOutcome, Member, MemberStatus,
    Node, PingResponse, SequenceNumber, Settings, StatusChange, SwimEngine, Transport,
};
use swim_driver::{Shell, ShellEvent, StepOutput};
use swim_transport_memory::MemoryTransport;

pub fn node(port: u16, uid: u64) -> Node {
    Node::new(format!("127.0.0.1:{port}").parse().unwrap(), uid)
}

/// Record of one engine invocation, for assertions.
#[derive(Debug, Clone)]
pub enum EngineCall {
    Ping {
        origin: Node,
        sequence_number: SequenceNumber,
    },
    PingRequest {
        target: Node,
        origin: Node,
        sequence_number: SequenceNumber,
    },
    PingResponse {
        response: PingResponse,
        ping_request_origin: Option<Node>,
    },
    EveryPingRequestResponse {
        response: PingResponse,
        member: Node,
    },
    PingRequestResponse {
        response: PingResponse,
        member: Node,
    },
    PeriodicTick,
    Mark {
        node: Node,
        status: MemberStatus,
    },
    ConfirmDead {
        node: Node,
    },
}

/// A scripted [`SwimEngine`].
///
/// Records every invocation in `calls`. Responses are popped from
/// per-method scripts; when a script is empty a minimal sensible default
/// is returned (ack inbound pings, relay inbound ping-requests, ignore
/// everything else).
pub struct ScriptedEngine {
    pub settings: Settings,
    pub myself: Node,
    pub incarnation: Incarnation,
    pub members: Vec<Member>,
    pub suspect_members: Vec<Member>,
    pub calls: Vec<EngineCall>,

    pub tick_script: VecDeque<Vec<Directive>>,
    pub ping_script: VecDeque<Vec<Directive>>,
    pub ping_response_script: VecDeque<Vec<Directive>>,
    pub ping_request_response_script: VecDeque<Vec<Directive>>,

    pub fixed_suspicion_timeout: Duration,
    pub lhm_protocol_interval: Duration,
    pub lhm_ping_timeout: Duration,

    next_seq: u64,
    now: Duration,
}

impl ScriptedEngine {
    pub fn new(myself: Node) -> Self {
        Self {
            settings: Settings::default(),
            myself,
            incarnation: Incarnation(0),
            members: Vec::new(),
            suspect_members: Vec::new(),
            calls: Vec::new(),
            tick_script: VecDeque::new(),
            ping_script: VecDeque::new(),
            ping_response_script: VecDeque::new(),
            ping_request_response_script: VecDeque::new(),
            fixed_suspicion_timeout: Duration::from_secs(3),
            lhm_protocol_interval: Duration::from_secs(1),
            lhm_ping_timeout: Duration::from_millis(300),
            next_seq: 0,
            now: Duration::ZERO,
        }
    }

    fn find_member_mut(&mut self, node: &Node) -> Option<&mut Member> {
        self.members
            .iter_mut()
            .find(|member| member.node.same_address(node))
    }

    /// Calls recorded on the every-ping-request-response stream.
    pub fn every_responses(&self) -> Vec<PingResponse> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::EveryPingRequestResponse { response, .. } => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    /// Decisive fan-out outcomes delivered to the engine.
    pub fn decisive_responses(&self) -> Vec<PingResponse> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::PingRequestResponse { response, .. } => Some(response.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statuses passed to `mark`, in order.
    pub fn marks(&self) -> Vec<(Node, MemberStatus)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Mark { node, status } => Some((node.clone(), status.clone())),
                _ => None,
            })
            .collect()
    }
}

impl SwimEngine for ScriptedEngine {
    fn on_ping(
        &mut self,
        origin: Node,
        _payload: GossipPayload,
        sequence_number: SequenceNumber,
    ) -> Vec<Directive> {
        self.calls.push(EngineCall::Ping {
            origin,
            sequence_number,
        });
        self.ping_script.pop_front().unwrap_or_else(|| {
            vec![Directive::SendAck {
                target: self.myself.clone(),
                incarnation: self.incarnation,
                payload: GossipPayload::none(),
                acknowledging: sequence_number,
            }]
        })
    }

    fn on_ping_request(
        &mut self,
        target: Node,
        origin: Node,
        _payload: GossipPayload,
        sequence_number: SequenceNumber,
    ) -> Vec<Directive> {
        self.calls.push(EngineCall::PingRequest {
            target: target.clone(),
            origin: origin.clone(),
            sequence_number,
        });
        let seq = self.next_sequence_number();
        vec![Directive::SendPing {
            target,
            ping_request_origin: Some(origin),
            timeout: self.lhm_ping_timeout,
            sequence_number: seq,
        }]
    }

    fn on_ping_response(
        &mut self,
        response: PingResponse,
        ping_request_origin: Option<Node>,
    ) -> Vec<Directive> {
        self.calls.push(EngineCall::PingResponse {
            response,
            ping_request_origin,
        });
        self.ping_response_script.pop_front().unwrap_or_default()
    }

    fn on_every_ping_request_response(&mut self, response: PingResponse, member: Node) {
        self.calls.push(EngineCall::EveryPingRequestResponse {
            response,
            member,
        });
    }

    fn on_ping_request_response(
        &mut self,
        response: PingResponse,
        member: Node,
    ) -> Vec<Directive> {
        self.calls.push(EngineCall::PingRequestResponse {
            response,
            member,
        });
        self.ping_request_response_script
            .pop_front()
            .unwrap_or_default()
    }

    fn on_periodic_ping_tick(&mut self) -> Vec<Directive> {
        self.calls.push(EngineCall::PeriodicTick);
        self.tick_script
            .pop_front()
            .unwrap_or_else(|| vec![Directive::Ignore])
    }

    fn mark(&mut self, node: &Node, status: MemberStatus) -> MarkOutcome {
        self.calls.push(EngineCall::Mark {
            node: node.clone(),
            status: status.clone(),
        });
        match self.find_member_mut(node) {
            Some(member) => {
                let previous = member.status.clone();
                member.status = status;
                MarkOutcome::Applied {
                    previous: Some(previous),
                    member: member.clone(),
                }
            }
            None => {
                let member = Member {
                    node: node.clone(),
                    status,
                    suspicion_started_at: None,
                };
                self.members.push(member.clone());
                MarkOutcome::Applied {
                    previous: None,
                    member,
                }
            }
        }
    }

    fn confirm_dead(&mut self, node: &Node) -> ConfirmDeadOutcome {
        self.calls.push(EngineCall::ConfirmDead { node: node.clone() });
        match self.find_member_mut(node) {
            Some(member) => {
                let previous = member.status.clone();
                member.status = MemberStatus::Dead;
                ConfirmDeadOutcome::Applied {
                    change: StatusChange::new(Some(previous), member.clone()),
                }
            }
            None => ConfirmDeadOutcome::Ignored,
        }
    }

    fn make_gossip_payload(&mut self, _to: &Node) -> GossipPayload {
        GossipPayload::none()
    }

    fn next_sequence_number(&mut self) -> SequenceNumber {
        self.next_seq += 1;
        SequenceNumber(self.next_seq)
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn suspects(&self) -> Vec<Member> {
        self.suspect_members.clone()
    }

    fn all_members(&self) -> Vec<Member> {
        self.members.clone()
    }

    fn other_member_count(&self) -> usize {
        self.members
            .iter()
            .filter(|member| member.node != self.myself)
            .count()
    }

    fn member_for(&self, node: &Node) -> Option<Member> {
        self.members
            .iter()
            .find(|member| member.node.same_address(node))
            .cloned()
    }

    fn is_member(&self, node: &Node, ignore_uid: bool) -> bool {
        self.members.iter().any(|member| {
            if ignore_uid {
                member.node.same_address(node)
            } else {
                member.node == *node
            }
        })
    }

    fn suspicion_timeout(&self, _suspected_by: usize) -> Duration {
        self.fixed_suspicion_timeout
    }

    fn protocol_period(&self) -> Duration {
        self.settings.protocol_period
    }

    fn dynamic_lhm_protocol_interval(&self) -> Duration {
        self.lhm_protocol_interval
    }

    fn dynamic_lhm_ping_timeout(&self) -> Duration {
        self.lhm_ping_timeout
    }
}

/// Drives a shell synchronously with a logical clock, collecting
/// announcements and pumping completion events back through `handle`.
pub struct Harness {
    pub shell: Shell<ScriptedEngine>,
    pub transport: Arc<MemoryTransport>,
    pub event_tx: Sender<ShellEvent>,
    pub event_rx: Receiver<ShellEvent>,
    pub announcements: Arc<Mutex<Vec<StatusChange>>>,
}

impl Harness {
    pub fn new(engine: ScriptedEngine) -> Self {
        let myself = engine.myself.clone();
        let transport = MemoryTransport::new();
        let channel: Arc<dyn Transport> = transport.clone();
        let (event_tx, event_rx) = unbounded();
        let announcements: Arc<Mutex<Vec<StatusChange>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&announcements);
        let shell = Shell::new(
            myself,
            engine,
            channel,
            event_tx.clone(),
            Box::new(move |change| sink.lock().unwrap().push(change)),
        );

        Self {
            shell,
            transport,
            event_tx,
            event_rx,
            announcements,
        }
    }

    /// Drain queued completion events through the shell, returning the
    /// outputs in processing order.
    pub fn pump(&mut self) -> Vec<StepOutput> {
        let mut outputs = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            outputs.push(self.shell.handle(event));
        }
        outputs
    }

    pub fn announcements(&self) -> Vec<StatusChange> {
        self.announcements.lock().unwrap().clone()
    }
}
