//! Inter-task state: the lock-guarded drive command and the telemetry channel.
//!
//! These are the only two things the control and communication tasks share.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration};

use crate::config::{COMMAND_LOCK_TIMEOUT, MAX_DUTY, TELEMETRY_QUEUE_DEPTH};
use crate::drivers::telemetry::TelemetryRecord;

// ── Motion mode ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MotionMode {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    #[default]
    Stop,
}

impl MotionMode {
    /// Mode for a pair of signed wheel requests. Anything that is not a clean
    /// straight or spin-in-place request stops the robot.
    pub fn from_wheels(left: i32, right: i32) -> Self {
        match (left.signum(), right.signum()) {
            (1, 1) => Self::Forward,
            (-1, -1) => Self::Backward,
            (-1, 1) => Self::TurnLeft,
            (1, -1) => Self::TurnRight,
            _ => Self::Stop,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::TurnLeft => "turn-left",
            Self::TurnRight => "turn-right",
            Self::Stop => "stop",
        }
    }
}

// ── Command state ─────────────────────────────────────────────────────────────

/// Last drive intent received from the host. `speed` is a duty value in
/// `0..=MAX_DUTY`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandState {
    pub mode: MotionMode,
    pub speed: u8,
}

/// Percentage (clamped to 0..=100) scaled linearly onto `0..=MAX_DUTY`.
pub fn duty_from_percentage(raw_percentage: i32) -> u8 {
    let pct = raw_percentage.clamp(0, 100);
    (pct * MAX_DUTY as i32 / 100) as u8
}

/// Drive command shared between the communication task (writer) and the
/// control task (reader).
///
/// Every access goes through the mutex with a bounded wait. A writer that
/// cannot get the lock in time drops its update; a reader falls back to the
/// last snapshot it obtained (see [`CommandReader`]).
pub struct SharedCommand<M: RawMutex> {
    state: Mutex<M, CommandState>,
    lock_timeout: Duration,
}

impl<M: RawMutex> SharedCommand<M> {
    pub const fn new() -> Self {
        Self::with_lock_timeout(COMMAND_LOCK_TIMEOUT)
    }

    pub const fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(CommandState {
                mode: MotionMode::Stop,
                speed: 0,
            }),
            lock_timeout,
        }
    }

    /// Replace mode and speed together. Returns `false` when the lock timed
    /// out and the update was skipped.
    pub async fn set(&self, mode: MotionMode, raw_percentage: i32) -> bool {
        let next = CommandState {
            mode,
            speed: duty_from_percentage(raw_percentage),
        };
        match with_timeout(self.lock_timeout, self.state.lock()).await {
            Ok(mut guard) => {
                *guard = next;
                true
            }
            Err(_) => {
                crate::log_warn!("command lock busy, dropping {} update", mode.as_str());
                false
            }
        }
    }

    /// Consistent snapshot, or `None` when the lock timed out.
    pub async fn try_get(&self) -> Option<CommandState> {
        with_timeout(self.lock_timeout, self.state.lock())
            .await
            .ok()
            .map(|guard| *guard)
    }

    pub fn reader(&self) -> CommandReader<'_, M> {
        CommandReader {
            shared: self,
            cached: CommandState::default(),
        }
    }
}

impl<M: RawMutex> Default for SharedCommand<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of [`SharedCommand`], owned by the control task.
pub struct CommandReader<'a, M: RawMutex> {
    shared: &'a SharedCommand<M>,
    cached: CommandState,
}

impl<'a, M: RawMutex> CommandReader<'a, M> {
    /// Fresh snapshot if the lock is obtainable in time, otherwise the
    /// previous one.
    pub async fn get(&mut self) -> CommandState {
        match self.shared.try_get().await {
            Some(state) => self.cached = state,
            None => crate::log_warn!("command lock busy, reusing cached command"),
        }
        self.cached
    }
}

// ── Telemetry channel ─────────────────────────────────────────────────────────
//  Producer never blocks: when the queue is full the new record is discarded.

pub type TelemetryChannel<M> = Channel<M, TelemetryRecord, TELEMETRY_QUEUE_DEPTH>;
pub type TelemetrySender<'a, M> = Sender<'a, M, TelemetryRecord, TELEMETRY_QUEUE_DEPTH>;
pub type TelemetryReceiver<'a, M> = Receiver<'a, M, TelemetryRecord, TELEMETRY_QUEUE_DEPTH>;
