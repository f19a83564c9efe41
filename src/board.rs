//! Clock tree and peripheral bring-up for the robot's STM32F405 board.
//!
//! | Function            | Resource                     |
//! |---------------------|------------------------------|
//! | Left bridge IN1/IN2 | PC0 / PC1                    |
//! | Right bridge IN1/IN2| PC2 / PC3                    |
//! | ENA / ENB (PWM)     | TIM3 CH3 PB0 / CH4 PB1       |
//! | Encoders            | PB4 (left) / PB5 (right)     |
//! | Battery sense       | PC4, ADC1                    |
//! | IMU                 | SPI1 PA5/PA7/PA6, CS PB12    |
//! | Host UART           | UART4 TX PA0 / RX PA1        |
//! | Heartbeat LED       | PC13                         |

use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{AnyPin, Input, Level, Output, OutputType, Pin, Pull, Speed};
use embassy_stm32::peripherals::{
    ADC1, EXTI4, EXTI5, PA5, PA6, PA7, PB0, PB1, PB12, PB4, PB5, PC0, PC1, PC2, PC3, SPI1, TIM3,
};
use embassy_stm32::rcc::*;
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::CountingMode;
use embassy_stm32::Config;
use embassy_time::Delay;

use diffbot_firmware::config::PWM_FREQUENCY_HZ;
use diffbot_firmware::drivers::hbridge::{DirectionPair, HBridge};
use diffbot_firmware::drivers::icm42688::Icm42688;

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: Some(PllQDiv::DIV7), // 48 MHz for USB
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        Self {
            p: embassy_stm32::init(config),
        }
    }
}

/// Both H-bridges with outputs off and the enable PWM running at `PWM_FREQUENCY_HZ`.
#[allow(clippy::too_many_arguments)]
pub fn motors(
    tim: TIM3,
    ena: PB0,
    enb: PB1,
    left_in1: PC0,
    left_in2: PC1,
    right_in1: PC2,
    right_in2: PC3,
) -> HBridge {
    let pwm = SimplePwm::new(
        tim,
        None,
        None,
        Some(PwmPin::new_ch3(ena, OutputType::PushPull)),
        Some(PwmPin::new_ch4(enb, OutputType::PushPull)),
        TimeHertz(PWM_FREQUENCY_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let pair = |in1: AnyPin, in2: AnyPin| DirectionPair {
        in1: Output::new(in1, Level::Low, Speed::Low),
        in2: Output::new(in2, Level::Low, Speed::Low),
    };
    HBridge::new(
        pwm,
        pair(left_in1.degrade(), left_in2.degrade()),
        pair(right_in1.degrade(), right_in2.degrade()),
    )
}

/// SPI1 @ 10 MHz to the ICM-42688 (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PB12).
pub fn imu(spi: SPI1, sck: PA5, mosi: PA7, miso: PA6, cs: PB12) -> Icm42688<'static, SPI1> {
    let mut spi_config = SpiConfig::default();
    spi_config.frequency = TimeHertz(10_000_000);
    let spi = Spi::new(spi, sck, mosi, miso, NoDma, NoDma, spi_config);
    let cs = Output::new(cs.degrade(), Level::High, Speed::VeryHigh);
    Icm42688::new(spi, cs)
}

pub fn battery_adc(adc: ADC1) -> Adc<'static, ADC1> {
    Adc::new(adc, &mut Delay)
}

/// Encoder inputs, pulled down, one EXTI line each.
pub fn encoders(
    left: PB4,
    left_exti: EXTI4,
    right: PB5,
    right_exti: EXTI5,
) -> (ExtiInput<'static, PB4>, ExtiInput<'static, PB5>) {
    (
        ExtiInput::new(Input::new(left, Pull::Down), left_exti),
        ExtiInput::new(Input::new(right, Pull::Down), right_exti),
    )
}
