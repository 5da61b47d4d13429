//! Timer scheduling: buffered operations and the tokio-backed manager.
//!
//! The shell emits [`TimerOp`]s from `handle()`; the runner applies them.
//! Production uses [`TimerManager`], which spawns one tokio sleep task per
//! key and fires a [`ShellEvent::TimerFired`] into the loop's timer
//! channel. Tests apply the buffered ops to a logical clock instead.

use crate::event::{FanoutId, ShellEvent};
use std::collections::HashMap;
use std::time::Duration;
use swim_core::Node;
use tokio::task::JoinHandle;

/// Identifies a scheduled one-shot.
///
/// Setting a key that is already live replaces the pending timer, so at
/// most one timer per key exists at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// The self-chaining protocol-period tick.
    PeriodicPing,
    /// Overall deadline for one indirect-probe fan-out.
    PingRequestRound(FanoutId),
    /// Retry of an initial-contact probe that failed.
    ContactRetry(Node),
}

/// A timer operation buffered by the shell for the runner to apply.
#[derive(Debug, Clone)]
pub enum TimerOp {
    /// Schedule `key` to fire after `delay`, replacing any pending timer
    /// with the same key.
    Set { key: TimerKey, delay: Duration },
    /// Cancel a pending timer. Idempotent; unknown keys are ignored.
    Cancel { key: TimerKey },
}

/// Tokio-backed timer runtime for the protocol loop.
///
/// Each live key maps to a spawned sleep task that sends
/// [`ShellEvent::TimerFired`] when it elapses. Replacing or cancelling a
/// key aborts its task; dropping the manager aborts everything.
pub struct TimerManager {
    tokio_handle: tokio::runtime::Handle,
    timer_tx: crossbeam::channel::Sender<ShellEvent>,
    active: HashMap<TimerKey, JoinHandle<()>>,
}

impl TimerManager {
    pub fn new(
        tokio_handle: tokio::runtime::Handle,
        timer_tx: crossbeam::channel::Sender<ShellEvent>,
    ) -> Self {
        Self {
            tokio_handle,
            timer_tx,
            active: HashMap::new(),
        }
    }

    pub fn process_op(&mut self, op: TimerOp) {
        match op {
            TimerOp::Set { key, delay } => {
                if let Some(handle) = self.active.remove(&key) {
                    handle.abort();
                }
                let timer_tx = self.timer_tx.clone();
                let fired_key = key.clone();
                let handle = self.tokio_handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = timer_tx.send(ShellEvent::TimerFired { key: fired_key });
                });
                self.active.insert(key, handle);
            }
            TimerOp::Cancel { key } => {
                if let Some(handle) = self.active.remove(&key) {
                    handle.abort();
                }
            }
        }
    }

    /// Number of live timers.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
    }
}
