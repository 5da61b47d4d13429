//! The protocol loop: a dedicated thread that owns the shell.
//!
//! [`run_protocol_loop`] blocks on two crossbeam channels with priority
//! via a `try_recv` cascade:
//!
//! ```text
//! timer_rx (priority 1) > event_rx (priority 2)
//! ```
//!
//! When nothing is ready it parks on `crossbeam::select!`. Wall-clock time
//! is set on the shell before every step, and the step's buffered timer
//! ops are applied to the [`TimerManager`] afterwards.
//!
//! External callers interact through a cloneable [`ShellHandle`]; its
//! methods may be invoked from any thread and enqueue in FIFO order per
//! caller. Sends after shutdown are dropped silently.

use crate::event::ShellEvent;
use crate::shell::Shell;
use crate::timer::TimerManager;
use crossbeam::channel::{Receiver, Sender};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use swim_core::{Message, Node, SwimEngine};
use tracing::info;

/// Channel plumbing for one protocol loop.
pub struct ProtocolLoopConfig {
    /// Timer-fired events (highest priority).
    pub timer_rx: Receiver<ShellEvent>,
    /// Sender side of the timer channel, given to the [`TimerManager`].
    pub timer_tx: Sender<ShellEvent>,
    /// Inbound messages, local requests, and probe completions.
    pub event_rx: Receiver<ShellEvent>,
    /// Graceful shutdown signal.
    pub shutdown_rx: Receiver<()>,
    /// Tokio runtime handle for spawning timer sleep tasks.
    pub tokio_handle: tokio::runtime::Handle,
}

/// External API of a running protocol loop.
///
/// Cheap to clone; usable from any thread. Every method is fire-and-forget
/// and becomes a no-op once the loop has exited.
#[derive(Clone)]
pub struct ShellHandle {
    event_tx: Sender<ShellEvent>,
    shutdown_tx: Sender<()>,
}

impl ShellHandle {
    /// Deliver a decoded protocol message from the transport.
    pub fn receive_message(&self, message: Message) {
        let _ = self.event_tx.send(ShellEvent::MessageReceived { message });
    }

    /// Start monitoring `node`. Monitoring the local node is a no-op.
    pub fn monitor(&self, node: Node) {
        let _ = self.event_tx.send(ShellEvent::Monitor { node });
    }

    /// Confirm the unreachable member `node` dead.
    pub fn confirm_dead(&self, node: Node) {
        let _ = self.event_tx.send(ShellEvent::ConfirmDead { node });
    }

    /// Request a graceful shutdown of the loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Get wall-clock time as a duration since the UNIX epoch.
fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Run the shell on the calling thread until shutdown.
///
/// Brings the shell online via [`Shell::start`], then processes events in
/// priority order. All engine mutation happens here; timer callbacks and
/// probe completions only enqueue.
pub fn run_protocol_loop<E: SwimEngine>(
    mut shell: Shell<E>,
    config: ProtocolLoopConfig,
    start_periodic: bool,
) {
    let mut timers = TimerManager::new(config.tokio_handle.clone(), config.timer_tx.clone());

    shell.set_time(wall_clock());
    let output = shell.start(start_periodic);
    for op in output.timer_ops {
        timers.process_op(op);
    }

    loop {
        if config.shutdown_rx.try_recv().is_ok() {
            break;
        }

        let event = 'recv: {
            if let Ok(event) = config.timer_rx.try_recv() {
                break 'recv Some(event);
            }
            if let Ok(event) = config.event_rx.try_recv() {
                break 'recv Some(event);
            }

            crossbeam::channel::select! {
                recv(config.shutdown_rx) -> _ => None,
                recv(config.timer_rx) -> event => event.ok(),
                recv(config.event_rx) -> event => event.ok(),
            }
        };

        let Some(event) = event else {
            // Shutdown signalled or all senders gone.
            break;
        };

        shell.set_time(wall_clock());
        let output = shell.handle(event);
        for op in output.timer_ops {
            timers.process_op(op);
        }
    }

    let output = shell.shutdown();
    for op in output.timer_ops {
        timers.process_op(op);
    }
    info!("protocol loop exiting");
}

/// Spawn the protocol loop on a dedicated named thread.
///
/// Builds the channel plumbing, hands `event_tx` to the shell constructor
/// via `make_shell`, and returns the external handle plus the thread's
/// `JoinHandle`. The caller keeps the join handle and calls
/// [`ShellHandle::shutdown`] before joining.
pub fn spawn_protocol_loop<E, F>(
    make_shell: F,
    tokio_handle: tokio::runtime::Handle,
    start_periodic: bool,
) -> (ShellHandle, std::thread::JoinHandle<()>)
where
    E: SwimEngine + Send + 'static,
    F: FnOnce(Sender<ShellEvent>) -> Shell<E> + Send + 'static,
{
    let (event_tx, event_rx) = crossbeam::channel::unbounded();
    let (timer_tx, timer_rx) = crossbeam::channel::unbounded();
    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded(1);

    let handle = ShellHandle {
        event_tx: event_tx.clone(),
        shutdown_tx,
    };

    let join = std::thread::Builder::new()
        .name("swim-protocol-loop".to_string())
        .spawn(move || {
            let shell = make_shell(event_tx);
            let config = ProtocolLoopConfig {
                timer_rx,
                timer_tx,
                event_rx,
                shutdown_rx,
                tokio_handle,
            };
            run_protocol_loop(shell, config, start_periodic);
        })
        .expect("failed to spawn protocol loop thread");

    (handle, join)
}
