//! CDC Ingress Task
//!
//! Moves inbound USB bytes into the byte channel in bounded chunks.
//!
//! ```text
//! WaitConnected ──DTR──▶ Draining ──(no data | no room)──▶ WaitConnected
//! ```
//!
//! A hardware read is only issued when the channel has room for a whole
//! chunk, so nothing is lost at the channel boundary. Bytes left behind
//! stay in the CDC layer's FIFO; that FIFO can still overflow if this task
//! is starved for longer than the host takes to fill it.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;

use crate::channel::ByteChannel;
use crate::config::{RelayConfig, CDC_CHUNK_LEN};
use crate::pacer::Pacer;
use crate::types::Budget;
use crate::usb::cdc::CdcIngress;

/// Ingress lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressState {
    /// Host not connected, or nothing left to drain
    WaitConnected,
    /// Moving chunks into the channel
    Draining,
    /// Budget spent (tests only)
    Halted,
}

#[cfg(feature = "embedded")]
impl defmt::Format for IngressState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::WaitConnected => defmt::write!(f, "WAIT_CONNECTED"),
            Self::Draining => defmt::write!(f, "DRAINING"),
            Self::Halted => defmt::write!(f, "HALTED"),
        }
    }
}

/// Ingress counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngressStats {
    /// Completed cycles
    pub cycles: u32,
    /// Cycles skipped because DTR was low
    pub idle_cycles: u32,
    /// Hardware reads issued
    pub reads: u32,
    /// Bytes written into the channel
    pub forwarded: u32,
    /// Cycles that stopped with data pending for lack of channel space
    pub backpressured: u32,
    /// Bytes the channel refused
    pub dropped: u32,
}

/// CDC ingress task body
pub struct IngressTask<'c, U, M, D, const N: usize>
where
    U: CdcIngress,
    M: RawMutex,
    D: DelayNs,
{
    port: U,
    channel: &'c ByteChannel<M, N>,
    pacer: Pacer<D>,
    chunk_size: usize,
    buf: [u8; CDC_CHUNK_LEN],
    state: IngressState,
    stats: IngressStats,
}

impl<'c, U, M, D, const N: usize> IngressTask<'c, U, M, D, N>
where
    U: CdcIngress,
    M: RawMutex,
    D: DelayNs,
{
    /// Create an ingress task feeding `channel`
    ///
    /// The chunk size is clamped to at least one byte and at most
    /// `CDC_CHUNK_LEN` or the channel capacity, whichever is smaller. A chunk
    /// larger than the channel would never find room.
    #[must_use]
    pub fn new(port: U, channel: &'c ByteChannel<M, N>, delay: D, config: &RelayConfig) -> Self {
        Self {
            port,
            channel,
            pacer: Pacer::new(delay, config.ingress_yield_us),
            chunk_size: config.chunk_size.min(CDC_CHUNK_LEN).min(N).max(1),
            buf: [0; CDC_CHUNK_LEN],
            state: IngressState::WaitConnected,
            stats: IngressStats::default(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> IngressState {
        self.state
    }

    /// Counters so far
    #[must_use]
    pub const fn stats(&self) -> IngressStats {
        self.stats
    }

    /// Bytes requested per hardware read
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Drain what the channel can take, then yield
    pub async fn cycle(&mut self) {
        self.drain();
        self.stats.cycles = self.stats.cycles.wrapping_add(1);
        self.pacer.pause().await;
    }

    /// Cycle until the budget is spent
    pub async fn run(&mut self, mut budget: Budget) -> IngressState {
        while budget.consume() {
            self.cycle().await;
        }
        self.state = IngressState::Halted;
        self.state
    }

    fn drain(&mut self) {
        if !self.port.is_connected() {
            self.state = IngressState::WaitConnected;
            self.stats.idle_cycles = self.stats.idle_cycles.wrapping_add(1);
            return;
        }

        self.state = IngressState::Draining;
        let chunk = self.chunk_size;

        while self.port.bytes_available() > 0 && self.channel.space_available() >= chunk {
            let n = self.port.read_chunk(&mut self.buf[..chunk]);
            self.stats.reads = self.stats.reads.wrapping_add(1);
            if n == 0 {
                break;
            }

            let report = self.channel.try_write(&self.buf[..n]);
            self.stats.forwarded = self.stats.forwarded.saturating_add(count(report.accepted));
            if !report.is_complete() {
                self.stats.dropped = self.stats.dropped.saturating_add(count(report.rejected));
                warn!("ingress: channel refused {} bytes", report.rejected);
            }
        }

        if self.port.bytes_available() > 0 {
            self.stats.backpressured = self.stats.backpressured.wrapping_add(1);
            trace!(
                "ingress: {} bytes held back, channel space {}",
                self.port.bytes_available(),
                self.channel.space_available()
            );
        }

        self.state = IngressState::WaitConnected;
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
