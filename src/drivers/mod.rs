pub mod command;
pub mod filter;
pub mod link;
pub mod motor;
pub mod sensors;
pub mod telemetry;

#[cfg(feature = "board")]
pub mod battery_adc;
#[cfg(feature = "board")]
pub mod encoder;
#[cfg(feature = "board")]
pub mod hbridge;
#[cfg(feature = "board")]
pub mod icm42688;
