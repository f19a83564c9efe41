#![no_std]
#![no_main]

mod board;
#[cfg(feature = "usb-link")]
mod usb;

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::peripherals::SPI1;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use {defmt_rtt as _, panic_probe as _};

use diffbot_firmware::config::TELEMETRY_FORMAT;
use diffbot_firmware::drivers::battery_adc::BatterySense;
use diffbot_firmware::drivers::encoder::{self, EdgeCounter};
use diffbot_firmware::drivers::hbridge::HBridge;
use diffbot_firmware::drivers::icm42688::Icm42688;
use diffbot_firmware::drivers::link::{HostPort, LineChannel, LineSender};
use diffbot_firmware::state::{SharedCommand, TelemetryChannel};
use diffbot_firmware::tasks::comms::CommsLoop;
use diffbot_firmware::tasks::control::{ControlHardware, ControlLoop};
use diffbot_firmware::{log_error, log_info};

use crate::board::Board;

// ── Shared state ──────────────────────────────────────────────────────────────
static COMMAND: SharedCommand<CriticalSectionRawMutex> = SharedCommand::new();
static TELEMETRY: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
static HOST_LINES: LineChannel<CriticalSectionRawMutex> = Channel::new();

// ── Executors ─────────────────────────────────────────────────────────────────
//  The control loop preempts everything on the thread executor.
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART5() {
    EXECUTOR_HIGH.on_interrupt()
}

// ── Interrupt bindings ────────────────────────────────────────────────────────
#[cfg(not(feature = "usb-link"))]
embassy_stm32::bind_interrupts!(struct Irqs {
    UART4 => embassy_stm32::usart::InterruptHandler<embassy_stm32::peripherals::UART4>;
});

// ── Tasks ─────────────────────────────────────────────────────────────────────
type Control = ControlLoop<
    'static,
    CriticalSectionRawMutex,
    EdgeCounter,
    Icm42688<'static, SPI1>,
    BatterySense,
    HBridge,
>;

#[cfg(not(feature = "usb-link"))]
type HostTx = diffbot_firmware::drivers::link::UartLinkTx;
#[cfg(feature = "usb-link")]
type HostTx = diffbot_firmware::drivers::link::UsbLinkTx;

type Comms = CommsLoop<'static, CriticalSectionRawMutex, HostPort<'static, CriticalSectionRawMutex, HostTx>>;

#[embassy_executor::task]
async fn control_task(control: Control) -> ! {
    control.run().await
}

#[embassy_executor::task]
async fn comms_task(comms: Comms) -> ! {
    comms.run().await
}

#[embassy_executor::task]
async fn left_encoder_task(edges: embassy_stm32::exti::ExtiInput<'static, embassy_stm32::peripherals::PB4>) -> ! {
    encoder::count_edges(edges, &encoder::LEFT_PULSES).await
}

#[embassy_executor::task]
async fn right_encoder_task(edges: embassy_stm32::exti::ExtiInput<'static, embassy_stm32::peripherals::PB5>) -> ! {
    encoder::count_edges(edges, &encoder::RIGHT_PULSES).await
}

#[cfg(not(feature = "usb-link"))]
#[embassy_executor::task]
async fn host_rx_task(
    rx: embassy_stm32::usart::UartRx<'static, embassy_stm32::peripherals::UART4, embassy_stm32::peripherals::DMA1_CH2>,
    lines: LineSender,
) -> ! {
    diffbot_firmware::drivers::link::uart_line_reader(rx, lines).await
}

#[cfg(feature = "usb-link")]
#[embassy_executor::task]
async fn host_rx_task(
    rx: embassy_usb::class::cdc_acm::Receiver<'static, diffbot_firmware::drivers::link::UsbDriver>,
    lines: LineSender,
) -> ! {
    diffbot_firmware::drivers::link::usb_line_reader(rx, lines).await
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;

    // 2. Motors off before anything else can fail
    let motors = board::motors(p.TIM3, p.PB0, p.PB1, p.PC0, p.PC1, p.PC2, p.PC3);

    // 3. Host link: UART4 @ 115200 (TX=PA0, RX=PA1) or USB CDC-ACM
    #[cfg(not(feature = "usb-link"))]
    let host_tx = {
        use embassy_stm32::usart::{Config as UsartConfig, Uart};

        let mut host_config = UsartConfig::default();
        host_config.baudrate = diffbot_firmware::config::HOST_BAUDRATE;
        let uart = match Uart::new(p.UART4, p.PA1, p.PA0, Irqs, p.DMA1_CH4, p.DMA1_CH2, host_config) {
            Ok(uart) => uart,
            Err(_) => {
                log_error!("host uart config rejected");
                halt().await
            }
        };
        let (tx, rx) = uart.split();
        spawner.must_spawn(host_rx_task(rx, HOST_LINES.sender()));
        diffbot_firmware::drivers::link::UartLinkTx(tx)
    };

    #[cfg(feature = "usb-link")]
    let host_tx = {
        let (usb_dev, serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
        spawner.must_spawn(usb::usb_task(usb_dev));
        let (tx, rx) = serial.split();
        spawner.must_spawn(host_rx_task(rx, HOST_LINES.sender()));
        diffbot_firmware::drivers::link::UsbLinkTx(tx)
    };

    // 4. Sensors
    let mut imu = board::imu(p.SPI1, p.PA5, p.PA7, p.PA6, p.PB12);
    let battery = BatterySense::new(board::battery_adc(p.ADC1), p.PC4);
    let (left_edges, right_edges) = board::encoders(p.PB4, p.EXTI4, p.PB5, p.EXTI5);
    spawner.must_spawn(left_encoder_task(left_edges));
    spawner.must_spawn(right_encoder_task(right_edges));

    // 5. Heartbeat LED (PC13)
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);

    // 6. IMU bring-up. Failure leaves the loops running with motors held off.
    Timer::after(Duration::from_millis(100)).await;
    let imu_available = match imu.init().await {
        Ok(()) => true,
        Err(e) => {
            log_error!("imu init failed: {}", e.as_str());
            false
        }
    };

    // 7. Control loop on the high-priority executor
    interrupt::UART5.set_priority(Priority::P6);
    let high = EXECUTOR_HIGH.start(interrupt::UART5);
    let control = ControlLoop::new(
        ControlHardware {
            left_encoder: EdgeCounter::left(),
            right_encoder: EdgeCounter::right(),
            imu,
            battery,
            motors,
        },
        imu_available,
        COMMAND.reader(),
        TELEMETRY.sender(),
        Instant::now(),
    );
    high.must_spawn(control_task(control));

    // 8. Communication loop
    let comms = CommsLoop::new(
        HostPort::new(host_tx, HOST_LINES.receiver()),
        &COMMAND,
        TELEMETRY.receiver(),
        TELEMETRY_FORMAT,
    );
    spawner.must_spawn(comms_task(comms));

    log_info!("diffbot firmware up");

    // 9. Main task: LED heartbeat @ 1 Hz
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(500)).await;
    }
}

async fn halt() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
