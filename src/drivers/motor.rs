//! Two-channel H-bridge motor state machine.
//!
//! | Mode      | Left bridge | Right bridge |
//! |-----------|-------------|--------------|
//! | Forward   | forward     | forward      |
//! | Backward  | reverse     | reverse      |
//! | TurnLeft  | reverse     | forward      |
//! | TurnRight | forward     | reverse      |
//! | Stop      | ramp, then both off |      |

use embassy_time::{Duration, Timer};

use crate::config::DECEL_STEP_DELAY;
use crate::state::{CommandState, MotionMode};

/// Direction pair of one H-bridge (IN1/IN2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bridge {
    /// IN1 high, IN2 low
    Forward,
    /// IN1 low, IN2 high
    Reverse,
    /// Both low, motor coasts
    Off,
}

/// Motor outputs: two direction pairs and the PWM duty shared by both enable pins.
pub trait MotorActuator {
    fn set_bridges(&mut self, left: Bridge, right: Bridge);
    fn set_duty(&mut self, duty: u8);
}

/// Duty sequence of a stop: `start, start - 1, ..., 1`, one step per
/// `step_delay`. The final cut to 0 follows the last step, so a ramp from
/// `start` completes in `start` steps and a ramp from 0 is empty.
pub struct DecelRamp {
    next: u8,
}

impl DecelRamp {
    pub fn new(start: u8) -> Self {
        Self { next: start }
    }

    /// Wall-clock length of the ramp for a given step delay.
    pub fn duration(start: u8, step_delay: Duration) -> Duration {
        step_delay * start as u32
    }
}

impl Iterator for DecelRamp {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let current = self.next;
        if current == 0 {
            return None;
        }
        self.next = current - 1;
        Some(current)
    }
}

pub struct MotorController<A: MotorActuator> {
    actuator: A,
    step_delay: Duration,
    /// Duty currently on the enable pins
    output_duty: u8,
    mode: MotionMode,
}

impl<A: MotorActuator> MotorController<A> {
    pub fn new(actuator: A) -> Self {
        Self::with_step_delay(actuator, DECEL_STEP_DELAY)
    }

    pub fn with_step_delay(mut actuator: A, step_delay: Duration) -> Self {
        actuator.set_bridges(Bridge::Off, Bridge::Off);
        actuator.set_duty(0);
        Self {
            actuator,
            step_delay,
            output_duty: 0,
            mode: MotionMode::Stop,
        }
    }

    /// Drive the outputs for one command.
    ///
    /// Leaving a drive mode for Stop ramps down from the commanded `speed` and
    /// blocks the caller for `DecelRamp::duration(speed, step_delay)`; it
    /// cannot be cut short. A Stop with speed 0, or one received while already
    /// stopped, cuts the bridges without a ramp.
    pub async fn apply(&mut self, command: CommandState) {
        let bridges = match command.mode {
            MotionMode::Forward => (Bridge::Forward, Bridge::Forward),
            MotionMode::Backward => (Bridge::Reverse, Bridge::Reverse),
            MotionMode::TurnLeft => (Bridge::Reverse, Bridge::Forward),
            MotionMode::TurnRight => (Bridge::Forward, Bridge::Reverse),
            MotionMode::Stop => {
                self.stop(command.speed).await;
                return;
            }
        };

        if self.mode != command.mode {
            crate::log_debug!("motors: {} at duty {}", command.mode.as_str(), command.speed);
        }
        self.actuator.set_bridges(bridges.0, bridges.1);
        self.actuator.set_duty(command.speed);
        self.output_duty = command.speed;
        self.mode = command.mode;
    }

    async fn stop(&mut self, speed: u8) {
        let start = if self.mode == MotionMode::Stop { 0 } else { speed };
        if start > 0 {
            crate::log_debug!(
                "motors: ramping down from duty {} ({} ms)",
                start,
                DecelRamp::duration(start, self.step_delay).as_millis()
            );
        }
        for duty in DecelRamp::new(start) {
            self.actuator.set_duty(duty);
            self.output_duty = duty;
            Timer::after(self.step_delay).await;
        }
        self.force_off();
    }

    /// Cut both bridges immediately, no ramp.
    pub fn force_off(&mut self) {
        self.actuator.set_bridges(Bridge::Off, Bridge::Off);
        self.actuator.set_duty(0);
        self.output_duty = 0;
        self.mode = MotionMode::Stop;
    }

    pub fn output_duty(&self) -> u8 {
        self.output_duty
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }
}
