#![cfg_attr(not(test), no_std)]

//! Control and telemetry core for a two-wheeled differential-drive robot.
//!
//! Everything in this crate is hardware independent except the modules gated
//! behind the `board` feature. Peripherals are reached through the traits in
//! [`drivers::sensors`], [`drivers::motor`] and [`drivers::link`], so the two
//! periodic loops in [`tasks`] run unchanged on the STM32 target and in host
//! unit tests.

pub mod logging;

pub mod config;
pub mod drivers;
pub mod state;
pub mod tasks;
