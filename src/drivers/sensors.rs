//! Sensor capabilities consumed by the control loop.
//!
//! Bring-up of the underlying peripherals happens before the loop starts; the
//! loop only ever reads through these traits.

use core::fmt;

use crate::config::{ADC_MAX, ADC_REF_MV, VOLTAGE_DIVIDER_FACTOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Transfer on the sensor bus failed
    Bus,
    /// Device did not identify itself correctly
    NotDetected,
}

impl SensorError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bus => "sensor bus error",
            Self::NotDetected => "sensor not detected",
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inertial reading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// Acceleration in g (x, y, z)
    pub accel: [f32; 3],
    /// Angular rate in rad/s (x, y, z)
    pub gyro: [f32; 3],
    /// Raw z-axis rate register, reported untouched in telemetry
    pub gyro_z_raw: i16,
}

/// Encoder edge counter. Each call returns the pulses since the previous call.
pub trait PulseCounter {
    fn take_count(&mut self) -> i16;
}

#[allow(async_fn_in_trait)]
pub trait InertialSensor {
    async fn read(&mut self) -> Result<ImuSample, SensorError>;
}

/// Raw battery-sense ADC channel (12 bit).
pub trait BatteryAdc {
    fn read_raw(&mut self) -> u16;
}

/// Pack voltage in millivolts from a raw ADC sample, through the divider.
pub fn battery_millivolts(adc_raw: u16) -> u16 {
    let pin_mv = (adc_raw as f32 / ADC_MAX) * ADC_REF_MV;
    // Float-to-int `as` saturates, out-of-range readings pin at u16::MAX.
    (pin_mv * VOLTAGE_DIVIDER_FACTOR) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_conversion_follows_divider() {
        assert_eq!(battery_millivolts(0), 0);
        // Full scale: 3300 mV at the pin
        assert_eq!(battery_millivolts(4095), (3300.0f32 * 5.545) as u16);
        // 2S pack at 7.4 V -> ~1334 mV at the pin -> raw ~1656
        let mv = battery_millivolts(1656);
        assert!((7390..=7410).contains(&mv), "mv = {}", mv);
    }

    #[test]
    fn battery_conversion_is_monotonic() {
        let mut last = 0;
        for raw in (0..=4095u16).step_by(7) {
            let mv = battery_millivolts(raw);
            assert!(mv >= last);
            last = mv;
        }
    }
}
