//! BroadcastScheduler: the per-connection repeating timer.
//!
//! Each open connection gets exactly one scheduler task.  On every tick the
//! task samples the shared [`PinReader`] and, if the reading is truthy, writes
//! its decimal form to the connection's [`OutboundChannel`].
//!
//! # Cancellation
//!
//! [`SchedulerHandle::stop`] sets a stopped flag and aborts the task.  The flag
//! is checked after every timer wake-up, before the pin is read, so once
//! `stop()` has returned no further tick can write to the connection.  The
//! handle also stops the task when dropped, so a task never outlives the
//! registry entry that owns its handle.
//!
//! # Failures
//!
//! A failed write stops only this scheduler.  The task marks itself stopped and
//! reports [`SchedulerExitReason::WriteFailed`] through its [`SchedulerExit`],
//! which the session treats as an implicit close.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::application::pin_reader::PinReader;
use crate::domain::connection::ConnectionId;
use crate::domain::messages::ChannelFrame;
use crate::domain::reading::PinReading;

/// Shortest tick period a scheduler will run with.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Error type for writes to a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("connection already closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of a connection.
///
/// The infrastructure implementation wraps a WebSocket sink; tests record
/// frames in memory.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Writes one frame to the peer.
    async fn send(&self, frame: ChannelFrame) -> Result<(), ChannelError>;

    /// Closes the outbound half.  Errors are ignored: the peer may already be
    /// gone.
    async fn close(&self);
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A truthy reading was written.
    Sent(PinReading),
    /// The reading was absent or falsy; nothing was written.
    Skipped,
    /// The write failed.
    Failed(ChannelError),
}

/// Runs one tick: sample the pin and push the reading if it is truthy.
pub async fn broadcast_tick(reader: &PinReader, channel: &dyn OutboundChannel) -> TickOutcome {
    match reader.read() {
        Some(reading) if reading.is_truthy() => {
            match channel.send(ChannelFrame::from(reading)).await {
                Ok(()) => TickOutcome::Sent(reading),
                Err(e) => TickOutcome::Failed(e),
            }
        }
        _ => TickOutcome::Skipped,
    }
}

/// Why a scheduler task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExitReason {
    /// [`SchedulerHandle::stop`] was called (or the handle was dropped).
    Stopped,
    /// A write failed and the scheduler stopped itself.
    WriteFailed(ChannelError),
}

/// Resolves once the scheduler task has ended.
#[derive(Debug)]
pub struct SchedulerExit {
    rx: oneshot::Receiver<SchedulerExitReason>,
}

impl SchedulerExit {
    /// Waits for the task to end.
    pub async fn wait(self) -> SchedulerExitReason {
        // An aborted task drops its sender without sending.
        self.rx.await.unwrap_or(SchedulerExitReason::Stopped)
    }
}

/// Owning handle to a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    stopped: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancels the timer.
    ///
    /// Returns `true` if this call performed the cancellation and `false` if the
    /// scheduler was already stopped; repeated calls are no-ops.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.task.abort();
        true
    }

    /// Returns `true` once the scheduler has been stopped or stopped itself.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts broadcast tasks bound to individual connections.
#[derive(Debug, Clone)]
pub struct BroadcastScheduler {
    reader: Arc<PinReader>,
    period: Duration,
}

impl BroadcastScheduler {
    /// Creates a scheduler factory that ticks every `period`.
    ///
    /// A period below [`MIN_PERIOD`] is raised to it.
    pub fn new(reader: Arc<PinReader>, period: Duration) -> Self {
        let period = if period < MIN_PERIOD {
            warn!("broadcast period {period:?} is too short; using {MIN_PERIOD:?}");
            MIN_PERIOD
        } else {
            period
        };
        Self { reader, period }
    }

    /// The tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawns the tick task for `connection` on the current runtime.
    ///
    /// The first tick fires one `period` after this call.  If a tick overruns
    /// the period, the next one is delayed rather than fired in a burst.
    pub fn start(
        &self,
        connection: ConnectionId,
        channel: Arc<dyn OutboundChannel>,
    ) -> (SchedulerHandle, SchedulerExit) {
        let stopped = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = oneshot::channel();

        let task = tokio::spawn(run_ticks(
            connection,
            Arc::clone(&self.reader),
            channel,
            self.period,
            Arc::clone(&stopped),
            exit_tx,
        ));

        (
            SchedulerHandle { stopped, task },
            SchedulerExit { rx: exit_rx },
        )
    }
}

async fn run_ticks(
    connection: ConnectionId,
    reader: Arc<PinReader>,
    channel: Arc<dyn OutboundChannel>,
    period: Duration,
    stopped: Arc<AtomicBool>,
    exit_tx: oneshot::Sender<SchedulerExitReason>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick resolves immediately; skip it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if stopped.load(Ordering::Acquire) {
            let _ = exit_tx.send(SchedulerExitReason::Stopped);
            return;
        }

        match broadcast_tick(&reader, channel.as_ref()).await {
            TickOutcome::Sent(reading) => debug!("connection {connection}: sent {reading}"),
            TickOutcome::Skipped => {}
            TickOutcome::Failed(e) => {
                warn!("connection {connection}: broadcast write failed, stopping scheduler: {e}");
                stopped.store(true, Ordering::Release);
                let _ = exit_tx.send(SchedulerExitReason::WriteFailed(e));
                return;
            }
        }
    }
}
