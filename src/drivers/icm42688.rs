use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Instance, Spi};
use embassy_time::{Duration, Timer};

use crate::drivers::sensors::{ImuSample, InertialSensor, SensorError};

const REG_DEVICE_CONFIG: u8 = 0x11;
const REG_ACCEL_DATA_X1: u8 = 0x1F;
const REG_PWR_MGMT0: u8 = 0x4E;
const REG_WHO_AM_I: u8 = 0x75;
const WHO_AM_I: u8 = 0x47;

/// ±2000 dps full scale (reset default)
const GYRO_LSB_PER_DPS: f32 = 16.4;
/// ±16 g full scale (reset default)
const ACCEL_LSB_PER_G: f32 = 2048.0;

pub struct Icm42688<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> Icm42688<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        let buf = [reg & 0x7F, value];
        self.cs.set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs.set_high();
        res.map_err(|_| SensorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let tx = [reg | 0x80, 0x00];
        let mut rx = [0u8; 2];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();

        res.map_err(|_| SensorError::Bus)?;
        Ok(rx[1])
    }

    /// Soft reset, identity check, then gyro + accel in low-noise mode.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.write_reg(REG_DEVICE_CONFIG, 0x01)?;
        Timer::after(Duration::from_millis(10)).await;

        let id = self.read_reg(REG_WHO_AM_I)?;
        if id != WHO_AM_I {
            crate::log_error!("icm42688: unexpected WHO_AM_I {}", id);
            return Err(SensorError::NotDetected);
        }

        self.write_reg(REG_PWR_MGMT0, 0x0F)?;
        Timer::after(Duration::from_millis(50)).await;
        Ok(())
    }

    fn read_raw(&mut self) -> Result<([i16; 3], [i16; 3]), SensorError> {
        let mut tx = [0u8; 13];
        tx[0] = REG_ACCEL_DATA_X1 | 0x80;
        let mut rx = [0u8; 13];

        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &tx);
        self.cs.set_high();
        res.map_err(|_| SensorError::Bus)?;

        let word = |i: usize| i16::from_be_bytes([rx[i], rx[i + 1]]);
        Ok(([word(1), word(3), word(5)], [word(7), word(9), word(11)]))
    }
}

impl<'d, T: Instance> InertialSensor for Icm42688<'d, T> {
    async fn read(&mut self) -> Result<ImuSample, SensorError> {
        let (accel, gyro) = self.read_raw()?;
        Ok(ImuSample {
            accel: accel.map(|a| a as f32 / ACCEL_LSB_PER_G),
            gyro: gyro.map(|g| (g as f32 / GYRO_LSB_PER_DPS).to_radians()),
            gyro_z_raw: gyro[2],
        })
    }
}
