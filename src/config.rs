//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the relay firmware.
//! Buffer sizes, yield intervals, task priorities, USB identifiers and pin
//! names are centralized here. [`RelayConfig`] carries the tunable subset
//! into the tasks at runtime.

use crate::types::{ReadTimeout, TaskPriority};

/// System clock frequency (STM32G474 @ 170MHz)
pub const SYSTEM_CLOCK_HZ: u32 = 170_000_000;

/// Byte channel capacity between ingress and consumer
pub const CHANNEL_CAPACITY: usize = 1024;

/// Bytes that must be buffered before a blocked reader is woken
pub const CHANNEL_TRIGGER_LEVEL: usize = 1;

/// Largest chunk the ingress task moves per USB read
pub const CDC_CHUNK_LEN: usize = 64;

/// USB CDC ACM packet size
pub const USB_CDC_PACKET_SIZE: u16 = 64;

/// Control endpoint packet size
pub const USB_EP0_PACKET_SIZE: u8 = 64;

/// Receive FIFO inside the CDC layer
pub const USB_RX_FIFO_LEN: usize = 64;

/// Transmit FIFO inside the CDC layer
pub const USB_TX_FIFO_LEN: usize = 64;

/// USB pump yield interval in microseconds
pub const PUMP_YIELD_US: u32 = 1_000;

/// Longest the pump waits on the bus before flushing again
pub const PUMP_POLL_WINDOW_US: u32 = 1_000;

/// Ingress task yield interval in microseconds
pub const INGRESS_YIELD_US: u32 = 1_000;

/// Echo retry back-off in microseconds
pub const ECHO_RETRY_US: u32 = 1_000;

/// Transmit attempts per byte before the echo gives up on it
pub const ECHO_RETRY_LIMIT: u8 = 8;

/// Heartbeat LED half-period in milliseconds
pub const HEARTBEAT_PERIOD_MS: u32 = 250;

/// USB VID (use test VID for development)
pub const USB_VID: u16 = 0x1209;

/// USB PID (get from pid.codes for production)
pub const USB_PID: u16 = 0x0001;

/// Bus power draw advertised to the host in mA
pub const USB_MAX_POWER_MA: u16 = 100;

/// Priority of the USB device pump
pub const PUMP_PRIORITY: TaskPriority = TaskPriority::HIGH;

/// Priority of the CDC ingress task
pub const INGRESS_PRIORITY: TaskPriority = TaskPriority::MEDIUM;

/// Priority of the echo consumer
pub const CONSUMER_PRIORITY: TaskPriority = TaskPriority::LOW;

/// Priority of the heartbeat blinker
pub const HEARTBEAT_PRIORITY: TaskPriority = TaskPriority::LOW;

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the Nucleo-G474RE board

    /// Status LED (directly on MCU)
    pub const LED_STATUS: &str = "PA5";

    /// USB D+ (handled by USB peripheral)
    pub const USB_DP: &str = "PA12";

    /// USB D- (handled by USB peripheral)
    pub const USB_DM: &str = "PA11";
}

/// Interrupt lines lent to the preemptive executors
pub mod executors {
    //! Unused peripheral interrupts that drive the interrupt executors

    /// Interrupt executing the USB pump tier
    pub const HIGH_IRQ: &str = "UART4";

    /// Interrupt executing the ingress tier
    pub const MEDIUM_IRQ: &str = "UART5";

    /// NVIC priority of the pump tier (lower number preempts)
    pub const HIGH_NVIC_PRIORITY: u8 = 6;

    /// NVIC priority of the ingress tier
    pub const MEDIUM_NVIC_PRIORITY: u8 = 7;
}

/// Invalid [`RelayConfig`] field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunk size is zero or above [`CDC_CHUNK_LEN`]
    ChunkSize(usize),
    /// Chunk does not fit the channel
    ChunkExceedsChannel {
        /// Configured chunk size
        chunk: usize,
        /// Channel capacity
        capacity: usize,
    },
}

#[cfg(feature = "embedded")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ChunkSize(n) => defmt::write!(f, "ChunkSize({})", n),
            Self::ChunkExceedsChannel { chunk, capacity } => {
                defmt::write!(f, "ChunkExceedsChannel({}>{})", chunk, capacity);
            }
        }
    }
}

/// Runtime tunables injected into the relay tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bytes read from USB per ingress call
    pub chunk_size: usize,
    /// Pump yield between cycles (µs)
    pub pump_yield_us: u32,
    /// Bound on a single pump service wait (µs)
    pub pump_poll_window_us: u32,
    /// Ingress yield between cycles (µs)
    pub ingress_yield_us: u32,
    /// Echo back-off between transmit retries (µs)
    pub echo_retry_us: u32,
    /// Transmit attempts per byte
    pub echo_retry_limit: u8,
    /// How long the consumer blocks on the channel
    pub consumer_timeout: ReadTimeout,
    /// Heartbeat half-period (ms)
    pub heartbeat_period_ms: u32,
}

impl RelayConfig {
    /// Firmware defaults built from the compile-time constants
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: CDC_CHUNK_LEN,
            pump_yield_us: PUMP_YIELD_US,
            pump_poll_window_us: PUMP_POLL_WINDOW_US,
            ingress_yield_us: INGRESS_YIELD_US,
            echo_retry_us: ECHO_RETRY_US,
            echo_retry_limit: ECHO_RETRY_LIMIT,
            consumer_timeout: ReadTimeout::Forever,
            heartbeat_period_ms: HEARTBEAT_PERIOD_MS,
        }
    }

    /// Set the ingress chunk size
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set every task yield interval at once
    #[must_use]
    pub const fn with_yield_us(mut self, us: u32) -> Self {
        self.pump_yield_us = us;
        self.ingress_yield_us = us;
        self.echo_retry_us = us;
        self
    }

    /// Set the echo retry limit
    #[must_use]
    pub const fn with_retry_limit(mut self, limit: u8) -> Self {
        self.echo_retry_limit = limit;
        self
    }

    /// Set the consumer read timeout
    #[must_use]
    pub const fn with_consumer_timeout(mut self, timeout: ReadTimeout) -> Self {
        self.consumer_timeout = timeout;
        self
    }

    /// Check the configuration against a channel of `capacity` bytes
    pub const fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > CDC_CHUNK_LEN {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        if self.chunk_size > capacity {
            return Err(ConfigError::ChunkExceedsChannel {
                chunk: self.chunk_size,
                capacity,
            });
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for RelayConfig {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Relay(chunk={}, pump={}us, ingress={}us)",
            self.chunk_size,
            self.pump_yield_us,
            self.ingress_yield_us
        );
    }
}
