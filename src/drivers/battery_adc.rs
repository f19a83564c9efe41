use embassy_stm32::adc::Adc;
use embassy_stm32::peripherals::{ADC1, PC4};

use crate::drivers::sensors::BatteryAdc;

/// Battery divider tap on PC4 (ADC1_IN14)
pub struct BatterySense {
    adc: Adc<'static, ADC1>,
    pin: PC4,
}

impl BatterySense {
    pub fn new(adc: Adc<'static, ADC1>, pin: PC4) -> Self {
        Self { adc, pin }
    }
}

impl BatteryAdc for BatterySense {
    fn read_raw(&mut self) -> u16 {
        self.adc.read(&mut self.pin)
    }
}
