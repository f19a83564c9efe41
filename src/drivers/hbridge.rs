use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use crate::config::DUTY_SCALE;
use crate::drivers::motor::{Bridge, MotorActuator};

pub struct DirectionPair {
    pub in1: Output<'static, AnyPin>,
    pub in2: Output<'static, AnyPin>,
}

impl DirectionPair {
    fn set(&mut self, bridge: Bridge) {
        match bridge {
            Bridge::Forward => {
                self.in1.set_high();
                self.in2.set_low();
            }
            Bridge::Reverse => {
                self.in1.set_low();
                self.in2.set_high();
            }
            Bridge::Off => {
                self.in1.set_low();
                self.in2.set_low();
            }
        }
    }
}

/// Dual H-bridge (L298N style): TIM3 CH3 drives ENA (left), CH4 drives ENB (right).
pub struct HBridge {
    pwm: SimplePwm<'static, TIM3>,
    left: DirectionPair,
    right: DirectionPair,
}

impl HBridge {
    pub fn new(mut pwm: SimplePwm<'static, TIM3>, left: DirectionPair, right: DirectionPair) -> Self {
        pwm.set_duty(Channel::Ch3, 0);
        pwm.set_duty(Channel::Ch4, 0);
        pwm.enable(Channel::Ch3);
        pwm.enable(Channel::Ch4);
        Self { pwm, left, right }
    }
}

impl MotorActuator for HBridge {
    fn set_bridges(&mut self, left: Bridge, right: Bridge) {
        self.left.set(left);
        self.right.set(right);
    }

    fn set_duty(&mut self, duty: u8) {
        // Firmware duty is on an 8-bit scale, the timer's top depends on the PWM frequency
        let compare = (duty as u32 * self.pwm.get_max_duty() as u32 / DUTY_SCALE as u32) as u16;
        self.pwm.set_duty(Channel::Ch3, compare);
        self.pwm.set_duty(Channel::Ch4, compare);
    }
}
