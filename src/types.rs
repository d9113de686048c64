//! Shared types used across the relay firmware
//!
//! This module defines the small value types and error enums that cross
//! module boundaries: write reports, read timeouts, task budgets and
//! priorities.

use core::fmt;

/// Outcome of a non-blocking channel write
///
/// The channel never blocks a producer. Bytes that did not fit are
/// reported here instead of disappearing silently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct WriteReport {
    /// Bytes copied into the channel
    pub accepted: usize,
    /// Bytes refused because the channel was full
    pub rejected: usize,
}

impl WriteReport {
    /// Build a report for a write of `requested` bytes of which `accepted` fit
    #[must_use]
    pub const fn new(requested: usize, accepted: usize) -> Self {
        Self {
            accepted,
            rejected: requested - accepted,
        }
    }

    /// True when every requested byte was accepted
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.rejected == 0
    }

    /// Total number of bytes the caller asked to write
    #[must_use]
    pub const fn requested(&self) -> usize {
        self.accepted + self.rejected
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for WriteReport {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Write({}/{})", self.accepted, self.requested());
    }
}

/// How long a channel reader may block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadTimeout {
    /// Never block; fail immediately when nothing is buffered
    Immediate,
    /// Block for at most this many microseconds
    Micros(u32),
    /// Block until data arrives
    Forever,
}

impl ReadTimeout {
    /// Timeout in milliseconds
    #[must_use]
    pub const fn from_millis(ms: u32) -> Self {
        Self::Micros(ms.saturating_mul(1000))
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ReadTimeout {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Immediate => defmt::write!(f, "immediate"),
            Self::Micros(us) => defmt::write!(f, "{}us", us),
            Self::Forever => defmt::write!(f, "forever"),
        }
    }
}

/// A blocking read gave up before any byte arrived
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadTimedOut;

impl fmt::Display for ReadTimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel read timed out")
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ReadTimedOut {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ReadTimedOut");
    }
}

/// Channel construction and control errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelError {
    /// Trigger level exceeds the channel capacity
    TriggerLevel {
        /// Requested trigger level
        requested: usize,
        /// Channel capacity
        capacity: usize,
    },
    /// Zero-capacity channels cannot carry data
    ZeroCapacity,
    /// A reader is blocked on the channel
    ReaderWaiting,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerLevel {
                requested,
                capacity,
            } => write!(
                f,
                "trigger level {requested} exceeds channel capacity {capacity}"
            ),
            Self::ZeroCapacity => f.write_str("channel capacity is zero"),
            Self::ReaderWaiting => f.write_str("a reader is blocked on the channel"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for ChannelError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::TriggerLevel {
                requested,
                capacity,
            } => defmt::write!(f, "TriggerLevel({}>{})", requested, capacity),
            Self::ZeroCapacity => defmt::write!(f, "ZeroCapacity"),
            Self::ReaderWaiting => defmt::write!(f, "ReaderWaiting"),
        }
    }
}

/// Errors reported by the USB serial collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsbError {
    /// Host has not asserted DTR
    NotConnected,
    /// Transmit FIFO has no room; retry after the pump flushes
    TxFull,
    /// Endpoint is disabled (bus reset or unplug)
    Disabled,
    /// Device stack failed to come up
    InitFailed,
}

impl UsbError {
    /// Whether retrying the same operation later can succeed
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TxFull)
    }
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("host not connected"),
            Self::TxFull => f.write_str("transmit buffer full"),
            Self::Disabled => f.write_str("endpoint disabled"),
            Self::InitFailed => f.write_str("device stack init failed"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for UsbError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::NotConnected => defmt::write!(f, "NotConnected"),
            Self::TxFull => defmt::write!(f, "TxFull"),
            Self::Disabled => defmt::write!(f, "Disabled"),
            Self::InitFailed => defmt::write!(f, "InitFailed"),
        }
    }
}

/// Fixed task priority
///
/// Larger values are more urgent. Priorities are assigned at compile time
/// and never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(u8);

impl TaskPriority {
    /// Housekeeping tier (consumer, heartbeat)
    pub const LOW: Self = Self(1);
    /// Inbound byte capture tier
    pub const MEDIUM: Self = Self(2);
    /// USB protocol tier
    pub const HIGH: Self = Self(3);

    /// Create a priority from its numeric level
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// Numeric level (larger is more urgent)
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for TaskPriority {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "P{}", self.0);
    }
}

/// How many cycles a task body may run
///
/// Firmware tasks run `Unbounded`. Tests hand out a finite number of
/// cycles so the loop reaches its terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Budget {
    /// Run forever
    Unbounded,
    /// Run this many more cycles
    Cycles(u32),
}

impl Budget {
    /// Take one cycle from the budget; false once it is spent
    pub fn consume(&mut self) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Cycles(0) => false,
            Self::Cycles(n) => {
                *n -= 1;
                true
            }
        }
    }

    /// Check if no cycles are left
    #[must_use]
    pub const fn is_spent(&self) -> bool {
        matches!(self, Self::Cycles(0))
    }
}

/// Status LED state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LedState {
    /// LED is off
    #[default]
    Off,
    /// LED is on
    On,
}

impl LedState {
    /// Toggle the LED state
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }

    /// Check if the LED is lit
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for LedState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Off => defmt::write!(f, "OFF"),
            Self::On => defmt::write!(f, "ON"),
        }
    }
}
