//! Core types for the SWIM membership driver.
//!
//! This crate provides the passive data types and the two seams the driver
//! shell is built around:
//!
//! - [`SwimEngine`]: the protocol decision engine. Fed inbound events, it
//!   returns [`Directive`]s describing what the shell must do.
//! - [`Transport`]: the datagram channel. Fire-and-forget for acks/nacks,
//!   callback-based for probes.
//!
//! # Architecture
//!
//! The engine is a synchronous state machine:
//!
//! ```text
//! Events → SwimEngine::on_*() → Directives
//! ```
//!
//! The engine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same directives
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the driver shell, which:
//! 1. Delivers inbound messages and timer fires to the engine
//! 2. Executes the returned directives
//! 3. Converts probe completions back into engine events

mod directive;
mod member;
mod message;
mod peer;
mod settings;
mod traits;
mod transport;

pub use directive::{
    ConfirmDeadOutcome, Directive, GossipOutcome, MarkOutcome, PingRequestFanout, PingRequestProbe,
};
pub use member::{Incarnation, Member, MemberStatus, Node, SequenceNumber, StatusChange};
pub use message::{GossipPayload, Message, PingResponse};
pub use peer::Peer;
pub use settings::{Settings, UnreachabilityMode};
pub use traits::SwimEngine;
pub use transport::{ProbeCallback, Transport, TransportError};
