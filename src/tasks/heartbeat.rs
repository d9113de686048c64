//! Heartbeat task - blinks LED to show the scheduler is alive

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::config::RelayConfig;
use crate::pacer::Pacer;
use crate::types::{Budget, LedState};

/// Status LED blinker
pub struct Heartbeat<P: OutputPin, D: DelayNs> {
    pin: P,
    state: LedState,
    pacer: Pacer<D>,
    toggles: u32,
}

impl<P: OutputPin, D: DelayNs> Heartbeat<P, D> {
    /// Create a blinker; the LED starts off
    #[must_use]
    pub fn new(pin: P, delay: D, config: &RelayConfig) -> Self {
        Self {
            pin,
            state: LedState::Off,
            pacer: Pacer::new(delay, config.heartbeat_period_ms.saturating_mul(1000)),
            toggles: 0,
        }
    }

    /// Current LED state
    #[must_use]
    pub const fn state(&self) -> LedState {
        self.state
    }

    /// Number of toggles so far
    #[must_use]
    pub const fn toggles(&self) -> u32 {
        self.toggles
    }

    /// Flip the LED and wait one period
    pub async fn cycle(&mut self) {
        self.state = self.state.toggle();
        let result = if self.state.is_on() {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            warn!("heartbeat: pin write failed");
        }
        self.toggles = self.toggles.wrapping_add(1);
        self.pacer.pause().await;
    }

    /// Blink until the budget is spent
    pub async fn run(&mut self, mut budget: Budget) -> LedState {
        while budget.consume() {
            self.cycle().await;
        }
        self.state
    }
}
