//! USB Device Pump
//!
//! The only task that touches the USB engine. It brings the device stack
//! up, then services bus events, flushes queued output and yields, forever.
//!
//! ```text
//! Uninitialized ──init──▶ Running ──(budget spent)──▶ Halted
//!                            │  ▲
//!                            └──┘ service → flush → pause
//! ```

use embedded_hal_async::delay::DelayNs;

use crate::config::RelayConfig;
use crate::pacer::Pacer;
use crate::types::{Budget, UsbError};

/// Device-stack operations owned by the pump
pub trait DeviceStack {
    /// Bring the stack up
    ///
    /// The USB interrupt relies on executor primitives, so this is only
    /// called from inside the running pump task.
    fn init(&mut self) -> Result<(), UsbError>;

    /// Handle pending bus events, waiting at most one poll window
    ///
    /// Returns the number of events handled.
    async fn service(&mut self) -> usize;

    /// Transmit queued bytes; returns how many went out
    async fn flush(&mut self) -> usize;
}

/// Pump lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpState {
    /// Stack not yet initialized
    Uninitialized,
    /// Servicing the bus
    Running,
    /// Budget spent (tests only)
    Halted,
}

#[cfg(feature = "embedded")]
impl defmt::Format for PumpState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Uninitialized => defmt::write!(f, "UNINIT"),
            Self::Running => defmt::write!(f, "RUNNING"),
            Self::Halted => defmt::write!(f, "HALTED"),
        }
    }
}

/// Pump counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Completed service/flush/pause cycles
    pub cycles: u32,
    /// Bus events handled
    pub events: u32,
    /// Bytes transmitted
    pub bytes_flushed: u32,
}

/// USB device pump task body
pub struct UsbPump<S: DeviceStack, D: DelayNs> {
    stack: S,
    pacer: Pacer<D>,
    state: PumpState,
    stats: PumpStats,
}

impl<S: DeviceStack, D: DelayNs> UsbPump<S, D> {
    /// Create a pump that has not touched the stack yet
    #[must_use]
    pub fn new(stack: S, delay: D, config: &RelayConfig) -> Self {
        Self {
            stack,
            pacer: Pacer::new(delay, config.pump_yield_us),
            state: PumpState::Uninitialized,
            stats: PumpStats::default(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> PumpState {
        self.state
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> PumpStats {
        self.stats
    }

    /// The driven stack
    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Initialize the stack and enter `Running`
    ///
    /// Async so it can only run once an executor polls it. Calling it again
    /// while running is a no-op.
    pub async fn start(&mut self) -> Result<(), UsbError> {
        if self.state == PumpState::Uninitialized {
            self.stack.init().inspect_err(|e| error!("pump: init failed: {}", e))?;
            self.state = PumpState::Running;
            info!("pump: running, yield {}us", self.pacer.interval_us());
        }
        Ok(())
    }

    /// One service/flush/pause cycle; false unless `Running`
    pub async fn cycle(&mut self) -> bool {
        if self.state != PumpState::Running {
            return false;
        }

        let events = self.stack.service().await;
        let flushed = self.stack.flush().await;

        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        self.stats.events = self
            .stats
            .events
            .saturating_add(u32::try_from(events).unwrap_or(u32::MAX));
        self.stats.bytes_flushed = self
            .stats
            .bytes_flushed
            .saturating_add(u32::try_from(flushed).unwrap_or(u32::MAX));

        self.pacer.pause().await;
        true
    }

    /// Start, then cycle until the budget is spent
    ///
    /// With [`Budget::Unbounded`] this only returns on init failure.
    pub async fn run(&mut self, mut budget: Budget) -> Result<PumpState, UsbError> {
        self.start().await?;
        while budget.consume() {
            self.cycle().await;
        }
        self.state = PumpState::Halted;
        Ok(self.state)
    }
}
