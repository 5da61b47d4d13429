//! Driver shell for a SWIM-family cluster membership engine.
//!
//! The engine ([`swim_core::SwimEngine`]) decides; this crate executes.
//! It dispatches inbound protocol messages to the engine, carries out the
//! directives the engine emits (probes, acks, fan-outs, announcements),
//! drives protocol-period ticks and suspicion-timeout escalation, and
//! bootstraps the node into a cluster — all from a single protocol loop
//! that exclusively owns the engine.
//!
//! # Driving modes
//!
//! - **Production**: [`spawn_protocol_loop`] runs the [`Shell`] on a
//!   dedicated thread fed by crossbeam channels; interact through the
//!   returned [`ShellHandle`].
//! - **Tests/simulation**: construct a [`Shell`] directly, call
//!   [`Shell::set_time`] and [`Shell::handle`] per event, and apply the
//!   buffered [`TimerOp`]s to a logical clock.

mod event;
mod runtime;
mod shell;
mod timer;

pub use event::{FanoutId, ShellEvent};
pub use runtime::{run_protocol_loop, spawn_protocol_loop, ProtocolLoopConfig, ShellHandle};
pub use shell::{Shell, StatusChangeCallback, StepOutput};
pub use timer::{TimerKey, TimerManager, TimerOp};
