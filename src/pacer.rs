//! Timed yield
//!
//! Polling tasks give up the CPU for a fixed interval between cycles so
//! lower priority tasks always get scheduling slots. The interval is a
//! configuration value and the clock is any [`DelayNs`], which lets host
//! tests substitute a fake clock.

use embassy_futures::yield_now;
use embedded_hal_async::delay::DelayNs;

/// Fixed-interval cooperative yield
pub struct Pacer<D: DelayNs> {
    delay: D,
    interval_us: u32,
}

impl<D: DelayNs> Pacer<D> {
    /// Create a pacer yielding for `interval_us` microseconds
    #[must_use]
    pub const fn new(delay: D, interval_us: u32) -> Self {
        Self { delay, interval_us }
    }

    /// Yield for one interval
    ///
    /// A zero interval still yields once to tasks of equal priority.
    pub async fn pause(&mut self) {
        if self.interval_us == 0 {
            yield_now().await;
        } else {
            self.delay.delay_us(self.interval_us).await;
        }
    }

    /// Configured interval in microseconds
    #[must_use]
    pub const fn interval_us(&self) -> u32 {
        self.interval_us
    }

    /// Underlying delay, for timeouts measured on the same clock
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Give back the delay
    pub fn into_inner(self) -> D {
        self.delay
    }
}
