//! Member identity and lifecycle state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Monotonic counter a node attaches to its own status to defeat stale rumors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Incarnation(pub u64);

/// Correlates a probe with its response or timeout.
///
/// Drawn from [`SwimEngine::next_sequence_number`](crate::SwimEngine::next_sequence_number);
/// monotonic per node.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SequenceNumber(pub u64);

/// Stable logical identity of a cluster participant.
///
/// The UID distinguishes successive processes bound to the same address.
/// A node *without* a UID is an address-only form used to detect
/// self-replacement: a peer at our own address but with a different UID is
/// a restarted incarnation of ourselves and must not be monitored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Datagram address the node answers probes on.
    pub addr: SocketAddr,
    /// Unique per-process token; `None` for the address-only form.
    pub uid: Option<u64>,
}

impl Node {
    /// Create a node with an exact identity.
    pub fn new(addr: SocketAddr, uid: u64) -> Self {
        Self {
            addr,
            uid: Some(uid),
        }
    }

    /// The address-only form of this node.
    pub fn without_uid(&self) -> Self {
        Self {
            addr: self.addr,
            uid: None,
        }
    }

    /// Whether both nodes occupy the same address, ignoring UIDs.
    pub fn same_address(&self, other: &Node) -> bool {
        self.addr == other.addr
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid {
            Some(uid) => write!(f, "{}#{}", self.addr, uid),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// Lifecycle status of a member as seen by the local failure detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// The member is healthy and answering probes.
    Alive { incarnation: Incarnation },
    /// The member failed a probe and is awaiting refutation or escalation.
    Suspect {
        incarnation: Incarnation,
        /// Nodes that independently suspect this member. The suspicion
        /// timeout shrinks as this set grows.
        suspected_by: BTreeSet<Node>,
    },
    /// The member's suspicion window elapsed; it may still return.
    Unreachable { incarnation: Incarnation },
    /// The member is confirmed failed and will be reaped.
    Dead,
}

impl MemberStatus {
    /// The incarnation this status was asserted under; `None` once dead.
    pub fn incarnation(&self) -> Option<Incarnation> {
        match self {
            MemberStatus::Alive { incarnation }
            | MemberStatus::Suspect { incarnation, .. }
            | MemberStatus::Unreachable { incarnation } => Some(*incarnation),
            MemberStatus::Dead => None,
        }
    }

    /// Alive and suspect members count as reachable; unreachable and dead
    /// members do not.
    pub fn is_reachable(&self) -> bool {
        matches!(
            self,
            MemberStatus::Alive { .. } | MemberStatus::Suspect { .. }
        )
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, MemberStatus::Alive { .. })
    }

    pub fn is_suspect(&self) -> bool {
        matches!(self, MemberStatus::Suspect { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, MemberStatus::Unreachable { .. })
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, MemberStatus::Dead)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberStatus::Alive { incarnation } => write!(f, "alive({})", incarnation.0),
            MemberStatus::Suspect {
                incarnation,
                suspected_by,
            } => write!(f, "suspect({}, by {})", incarnation.0, suspected_by.len()),
            MemberStatus::Unreachable { incarnation } => {
                write!(f, "unreachable({})", incarnation.0)
            }
            MemberStatus::Dead => write!(f, "dead"),
        }
    }
}

/// A single member in the cluster view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub node: Node,
    pub status: MemberStatus,
    /// Logical instant the current suspicion began; set while suspect.
    pub suspicion_started_at: Option<Duration>,
}

impl Member {
    /// A member in the alive state with no suspicion history.
    pub fn alive(node: Node, incarnation: Incarnation) -> Self {
        Self {
            node,
            status: MemberStatus::Alive { incarnation },
            suspicion_started_at: None,
        }
    }
}

/// A status transition observed for one member.
///
/// `previous` is `None` when the member is first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub previous: Option<MemberStatus>,
    pub member: Member,
}

impl StatusChange {
    pub fn new(previous: Option<MemberStatus>, member: Member) -> Self {
        Self { previous, member }
    }

    /// Whether this transition crosses the reachable⇄unreachable boundary.
    ///
    /// A missing previous status counts as reachable, so a member first
    /// observed as unreachable or dead is a crossing while a member first
    /// observed as alive is not.
    pub fn is_reachability_change(&self) -> bool {
        let was_reachable = self
            .previous
            .as_ref()
            .is_none_or(MemberStatus::is_reachable);
        was_reachable != self.member.status.is_reachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(port: u16, uid: u64) -> Node {
        Node::new(format!("127.0.0.1:{port}").parse().unwrap(), uid)
    }

    #[test]
    fn test_without_uid_strips_identity() {
        let a = node(7001, 42);
        let b = node(7001, 99);
        assert_ne!(a, b);
        assert_eq!(a.without_uid(), b.without_uid());
        assert!(a.same_address(&b));
    }

    #[test]
    fn test_status_reachability() {
        let inc = Incarnation(1);
        assert!(MemberStatus::Alive { incarnation: inc }.is_reachable());
        assert!(MemberStatus::Suspect {
            incarnation: inc,
            suspected_by: BTreeSet::new(),
        }
        .is_reachable());
        assert!(!MemberStatus::Unreachable { incarnation: inc }.is_reachable());
        assert!(!MemberStatus::Dead.is_reachable());
    }

    #[test]
    fn test_dead_has_no_incarnation() {
        assert_eq!(MemberStatus::Dead.incarnation(), None);
        assert_eq!(
            MemberStatus::Alive {
                incarnation: Incarnation(3)
            }
            .incarnation(),
            Some(Incarnation(3))
        );
    }

    #[test]
    fn test_suspect_to_unreachable_is_reachability_change() {
        let change = StatusChange::new(
            Some(MemberStatus::Suspect {
                incarnation: Incarnation(1),
                suspected_by: BTreeSet::new(),
            }),
            Member {
                node: node(7001, 1),
                status: MemberStatus::Unreachable {
                    incarnation: Incarnation(1),
                },
                suspicion_started_at: None,
            },
        );
        assert!(change.is_reachability_change());
    }

    #[test]
    fn test_alive_to_suspect_is_not_reachability_change() {
        let change = StatusChange::new(
            Some(MemberStatus::Alive {
                incarnation: Incarnation(1),
            }),
            Member {
                node: node(7001, 1),
                status: MemberStatus::Suspect {
                    incarnation: Incarnation(1),
                    suspected_by: BTreeSet::new(),
                },
                suspicion_started_at: None,
            },
        );
        assert!(!change.is_reachability_change());
    }

    #[test]
    fn test_first_sighting_counts_previous_as_reachable() {
        let alive = StatusChange::new(None, Member::alive(node(7001, 1), Incarnation(0)));
        assert!(!alive.is_reachability_change());

        let dead = StatusChange::new(
            None,
            Member {
                node: node(7002, 2),
                status: MemberStatus::Dead,
                suspicion_started_at: None,
            },
        );
        assert!(dead.is_reachability_change());
    }
}
