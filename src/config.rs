//! Build-time configuration. Nothing here is adjustable at runtime.

use embassy_time::Duration;

use crate::drivers::telemetry::TelemetryFormat;

// ── Loop timing ───────────────────────────────────────────────────────────────

/// Sensor/actuation loop period (100 Hz)
pub const CONTROL_PERIOD: Duration = Duration::from_millis(10);
/// Host communication loop period (50 Hz)
pub const COMMS_PERIOD: Duration = Duration::from_millis(20);

// ── Motors ────────────────────────────────────────────────────────────────────

/// Full scale of the firmware duty value (8-bit PWM resolution)
pub const DUTY_SCALE: u8 = 255;
/// Highest duty ever written to the H-bridge enable pins
pub const MAX_DUTY: u8 = 121;
pub const PWM_FREQUENCY_HZ: u32 = 5_000;
/// Delay between two duty steps of the stop ramp
pub const DECEL_STEP_DELAY: Duration = Duration::from_millis(20);

// ── Sensor fusion ─────────────────────────────────────────────────────────────

/// Gyro weight of the complementary filter
pub const COMPLEMENTARY_ALPHA: f32 = 0.98;

// ── Smoothing windows ─────────────────────────────────────────────────────────

pub const ENCODER_WINDOW: usize = 5;
pub const BATTERY_WINDOW: usize = 10;

// ── Battery sense ─────────────────────────────────────────────────────────────

pub const ADC_MAX: f32 = 4095.0;
pub const ADC_REF_MV: f32 = 3300.0;
/// R1 = 10k, R2 = 2.2k -> (10000 + 2200) / 2200
pub const VOLTAGE_DIVIDER_FACTOR: f32 = 5.545;

// ── Inter-task plumbing ───────────────────────────────────────────────────────

pub const TELEMETRY_QUEUE_DEPTH: usize = 5;
/// Longest wait for the command-state lock before the cycle gives up on it
pub const COMMAND_LOCK_TIMEOUT: Duration = Duration::from_millis(2);

// ── Host link ─────────────────────────────────────────────────────────────────

pub const HOST_BAUDRATE: u32 = 115_200;
/// Longest accepted command line, newline excluded
pub const MAX_LINE_LEN: usize = 64;

pub const TELEMETRY_FORMAT: TelemetryFormat = if cfg!(feature = "usb-link") {
    TelemetryFormat::Verbose
} else {
    TelemetryFormat::Binary
};

/// Log every raw host line and every parsed DRIVE pair
pub const TRACE_COMMANDS: bool = true;
