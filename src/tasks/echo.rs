//! Consumer/Echo Task
//!
//! Blocks on the byte channel and writes every byte back over USB.
//! A full transmit FIFO is retried after a short back-off; a closed port
//! drops the byte. Both outcomes are counted.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::channel::ByteChannel;
use crate::config::RelayConfig;
use crate::pacer::Pacer;
use crate::types::{Budget, ReadTimeout, UsbError};
use crate::usb::cdc::CdcEgress;

/// Result of one consumer cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoOutcome {
    /// Byte queued and flush requested
    Echoed(u8),
    /// Byte given up on
    Dropped(u8, UsbError),
    /// Read timed out with nothing buffered
    Idle,
}

/// Echo counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EchoStats {
    /// Bytes taken from the channel
    pub received: u32,
    /// Bytes handed to the USB layer
    pub echoed: u32,
    /// Transmit attempts repeated after `TxFull`
    pub retries: u32,
    /// Bytes given up on
    pub dropped: u32,
    /// Reads that timed out
    pub timeouts: u32,
}

/// Consumer task body
pub struct EchoTask<'c, E, M, D, const N: usize>
where
    E: CdcEgress,
    M: RawMutex,
    D: DelayNs,
{
    egress: E,
    channel: &'c ByteChannel<M, N>,
    pacer: Pacer<D>,
    timeout: ReadTimeout,
    retry_limit: u8,
    stats: EchoStats,
    halted: bool,
}

impl<'c, E, M, D, const N: usize> EchoTask<'c, E, M, D, N>
where
    E: CdcEgress,
    M: RawMutex,
    D: DelayNs,
{
    /// Create a consumer draining `channel` into `egress`
    #[must_use]
    pub fn new(egress: E, channel: &'c ByteChannel<M, N>, delay: D, config: &RelayConfig) -> Self {
        Self {
            egress,
            channel,
            pacer: Pacer::new(delay, config.echo_retry_us),
            timeout: config.consumer_timeout,
            retry_limit: config.echo_retry_limit.max(1),
            stats: EchoStats::default(),
            halted: false,
        }
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> EchoStats {
        self.stats
    }

    /// Check if the budget ran out
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Wait for one byte and echo it
    pub async fn cycle(&mut self) -> EchoOutcome {
        let Ok(byte) = self.channel.read(self.timeout, self.pacer.delay_mut()).await else {
            self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
            return EchoOutcome::Idle;
        };
        self.stats.received = self.stats.received.wrapping_add(1);
        self.transmit(byte).await
    }

    /// Cycle until the budget is spent
    pub async fn run(&mut self, mut budget: Budget) -> EchoStats {
        while budget.consume() {
            self.cycle().await;
        }
        self.halted = true;
        self.stats
    }

    async fn transmit(&mut self, byte: u8) -> EchoOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match self.egress.write_bytes(&[byte]) {
                Ok(0) => Err(UsbError::TxFull),
                Ok(_) => self.egress.flush(),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.stats.echoed = self.stats.echoed.wrapping_add(1);
                    return EchoOutcome::Echoed(byte);
                }
                Err(e) if e.is_retryable() && attempts < self.retry_limit => {
                    self.stats.retries = self.stats.retries.wrapping_add(1);
                    self.pacer.pause().await;
                }
                Err(e) => {
                    self.stats.dropped = self.stats.dropped.wrapping_add(1);
                    debug!("echo: dropped byte {}: {}", byte, e);
                    return EchoOutcome::Dropped(byte, e);
                }
            }
        }
    }
}
