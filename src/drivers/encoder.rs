use core::sync::atomic::{AtomicI32, Ordering};

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pin as GpioPin;

use crate::drivers::sensors::PulseCounter;

// ── Edge counters ─────────────────────────────────────────────────────────────
//  Written by the edge task, swapped to zero by the control loop.
pub static LEFT_PULSES: AtomicI32 = AtomicI32::new(0);
pub static RIGHT_PULSES: AtomicI32 = AtomicI32::new(0);

/// Single-channel encoder counter: one increment per rising edge.
pub struct EdgeCounter(&'static AtomicI32);

impl EdgeCounter {
    pub fn left() -> Self {
        Self(&LEFT_PULSES)
    }

    pub fn right() -> Self {
        Self(&RIGHT_PULSES)
    }
}

impl PulseCounter for EdgeCounter {
    fn take_count(&mut self) -> i16 {
        let count = self.0.swap(0, Ordering::Relaxed);
        count.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

/// Counts rising edges on one encoder input into `pulses`.
///
/// Each input needs its own task: an EXTI future that is dropped unfired
/// masks its line, so racing two inputs in one loop would lose edges.
pub async fn count_edges<T: GpioPin>(mut input: ExtiInput<'static, T>, pulses: &'static AtomicI32) -> ! {
    loop {
        input.wait_for_rising_edge().await;
        pulses.fetch_add(1, Ordering::Relaxed);
    }
}
