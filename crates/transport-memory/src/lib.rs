//! In-memory transport for deterministic tests and simulation.
//!
//! [`MemoryTransport`] performs no I/O. Every outbound operation is
//! appended to an ordered log, and probes additionally park their
//! completion callback in a pending buffer. The harness drains pending
//! probes and completes them in whatever order and with whatever outcome
//! the scenario calls for — an ack, a nack, or a transport error.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swim_core::{
    GossipPayload, Incarnation, Node, PingResponse, ProbeCallback, SequenceNumber, Transport,
    TransportError,
};

/// What kind of probe a [`PendingProbe`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    Ping,
    /// An indirect probe of `target` relayed through the addressee.
    PingRequest { target: Node },
}

/// A probe captured by the transport, waiting for the harness to complete it.
pub struct PendingProbe {
    pub kind: ProbeKind,
    pub to: Node,
    pub from: Node,
    pub payload: GossipPayload,
    pub timeout: Duration,
    pub sequence_number: SequenceNumber,
    callback: ProbeCallback,
}

impl PendingProbe {
    /// Complete this probe with the given outcome, invoking its callback.
    pub fn complete(self, result: Result<PingResponse, TransportError>) {
        (self.callback)(result);
    }

    /// Complete with a transport-level timeout.
    pub fn time_out(self) {
        let timeout = self.timeout;
        self.complete(Err(TransportError::Timeout(timeout)));
    }
}

impl fmt::Debug for PendingProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingProbe")
            .field("kind", &self.kind)
            .field("to", &self.to)
            .field("seq", &self.sequence_number)
            .finish()
    }
}

/// One entry in the ordered outbound-operation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentOp {
    Ping {
        to: Node,
        from: Node,
        payload: GossipPayload,
        timeout: Duration,
        sequence_number: SequenceNumber,
    },
    PingRequest {
        to: Node,
        target: Node,
        from: Node,
        payload: GossipPayload,
        timeout: Duration,
        sequence_number: SequenceNumber,
    },
    Ack {
        to: Node,
        acknowledging: SequenceNumber,
        target: Node,
        incarnation: Incarnation,
        payload: GossipPayload,
    },
    Nack {
        to: Node,
        acknowledging: SequenceNumber,
        target: Node,
    },
}

#[derive(Default)]
struct Inner {
    sent: Vec<SentOp>,
    pending: Vec<PendingProbe>,
}

/// In-memory [`Transport`] backend.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drain all probes captured so far, in send order.
    pub fn take_pending_probes(&self) -> Vec<PendingProbe> {
        std::mem::take(&mut self.lock().pending)
    }

    /// Number of probes awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Snapshot of the ordered outbound-operation log.
    pub fn sent_ops(&self) -> Vec<SentOp> {
        self.lock().sent.clone()
    }

    /// Acks sent so far, in order.
    pub fn sent_acks(&self) -> Vec<SentOp> {
        self.lock()
            .sent
            .iter()
            .filter(|op| matches!(op, SentOp::Ack { .. }))
            .cloned()
            .collect()
    }

    /// Nacks sent so far, in order.
    pub fn sent_nacks(&self) -> Vec<SentOp> {
        self.lock()
            .sent
            .iter()
            .filter(|op| matches!(op, SentOp::Nack { .. }))
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for MemoryTransport {
    fn ping(
        &self,
        to: &Node,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    ) {
        let mut inner = self.lock();
        inner.sent.push(SentOp::Ping {
            to: to.clone(),
            from: from.clone(),
            payload: payload.clone(),
            timeout,
            sequence_number,
        });
        inner.pending.push(PendingProbe {
            kind: ProbeKind::Ping,
            to: to.clone(),
            from: from.clone(),
            payload,
            timeout,
            sequence_number,
            callback: on_response,
        });
    }

    fn ping_request(
        &self,
        to: &Node,
        target: &Node,
        payload: GossipPayload,
        from: &Node,
        timeout: Duration,
        sequence_number: SequenceNumber,
        on_response: ProbeCallback,
    ) {
        let mut inner = self.lock();
        inner.sent.push(SentOp::PingRequest {
            to: to.clone(),
            target: target.clone(),
            from: from.clone(),
            payload: payload.clone(),
            timeout,
            sequence_number,
        });
        inner.pending.push(PendingProbe {
            kind: ProbeKind::PingRequest {
                target: target.clone(),
            },
            to: to.clone(),
            from: from.clone(),
            payload,
            timeout,
            sequence_number,
            callback: on_response,
        });
    }

    fn ack(
        &self,
        to: &Node,
        acknowledging: SequenceNumber,
        target: &Node,
        incarnation: Incarnation,
        payload: GossipPayload,
    ) {
        self.lock().sent.push(SentOp::Ack {
            to: to.clone(),
            acknowledging,
            target: target.clone(),
            incarnation,
            payload,
        });
    }

    fn nack(&self, to: &Node, acknowledging: SequenceNumber, target: &Node) {
        self.lock().sent.push(SentOp::Nack {
            to: to.clone(),
            acknowledging,
            target: target.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16) -> Node {
        Node::new(format!("127.0.0.1:{port}").parse().unwrap(), u64::from(port))
    }

    #[test]
    fn test_probes_are_logged_and_parked() {
        let transport = MemoryTransport::new();
        let completed = Arc::new(Mutex::new(None));

        let seen = Arc::clone(&completed);
        transport.ping(
            &node(7001),
            GossipPayload::none(),
            &node(7000),
            Duration::from_secs(1),
            SequenceNumber(5),
            Box::new(move |result| {
                *seen.lock().unwrap() = Some(result);
            }),
        );

        assert_eq!(transport.pending_count(), 1);
        assert_eq!(transport.sent_ops().len(), 1);

        let probe = transport.take_pending_probes().pop().unwrap();
        assert_eq!(probe.kind, ProbeKind::Ping);
        assert_eq!(probe.sequence_number, SequenceNumber(5));
        probe.time_out();

        assert!(matches!(
            completed.lock().unwrap().take(),
            Some(Err(TransportError::Timeout(_)))
        ));
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_sends_preserve_order() {
        let transport = MemoryTransport::new();
        transport.ack(
            &node(7001),
            SequenceNumber(1),
            &node(7000),
            Incarnation(0),
            GossipPayload::none(),
        );
        transport.nack(&node(7002), SequenceNumber(2), &node(7003));

        let ops = transport.sent_ops();
        assert!(matches!(ops[0], SentOp::Ack { .. }));
        assert!(matches!(ops[1], SentOp::Nack { .. }));
        assert_eq!(transport.sent_acks().len(), 1);
        assert_eq!(transport.sent_nacks().len(), 1);
    }
}
