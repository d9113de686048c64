//! Bounded Byte Channel
//!
//! Fixed-capacity FIFO of bytes shared by exactly one producer and one
//! consumer. Writes never block and report what did not fit; reads block
//! with an optional timeout until the trigger level is reached.
//!
//! ```text
//!  producer ──try_write──▶ [ ring (N bytes) ] ──read──▶ consumer
//!                                │
//!                   wakes reader once occupied >= trigger
//! ```
//!
//! All locking lives inside the channel. The raw mutex type decides the
//! scope: `CriticalSectionRawMutex` when producer and consumer run on
//! different interrupt priorities, `NoopRawMutex` when both share one
//! executor.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::Poll;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;
use embedded_hal_async::delay::DelayNs;
use heapless::Deque;

use crate::types::{ChannelError, ReadTimedOut, ReadTimeout, WriteReport};

struct ChannelState<const N: usize> {
    ring: Deque<u8, N>,
    trigger_level: usize,
    reader: WakerRegistration,
    reader_waiting: bool,
    dropped: u32,
}

impl<const N: usize> ChannelState<N> {
    const fn new() -> Self {
        Self {
            ring: Deque::new(),
            trigger_level: 1,
            reader: WakerRegistration::new(),
            reader_waiting: false,
            dropped: 0,
        }
    }

    fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.ring.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

/// Single-producer single-consumer byte stream with a wake-up trigger level
pub struct ByteChannel<M: RawMutex, const N: usize> {
    state: Mutex<M, RefCell<ChannelState<N>>>,
}

impl<M: RawMutex, const N: usize> ByteChannel<M, N> {
    /// Create an empty channel with trigger level 1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(ChannelState::new())),
        }
    }

    /// Create an empty channel with the given trigger level
    ///
    /// Fails for zero-capacity channels and for trigger levels above the
    /// capacity. A trigger level of zero behaves as one.
    pub fn with_trigger_level(trigger_level: usize) -> Result<Self, ChannelError> {
        let channel = Self::new();
        channel.set_trigger_level(trigger_level)?;
        Ok(channel)
    }

    /// Change the number of bytes that must be buffered to wake a blocked reader
    pub fn set_trigger_level(&self, trigger_level: usize) -> Result<(), ChannelError> {
        if N == 0 {
            return Err(ChannelError::ZeroCapacity);
        }
        if trigger_level > N {
            return Err(ChannelError::TriggerLevel {
                requested: trigger_level,
                capacity: N,
            });
        }
        self.with_state(|s| s.trigger_level = trigger_level.max(1));
        Ok(())
    }

    /// Copy as many bytes as fit without blocking
    ///
    /// The report carries both the accepted and the rejected count; rejected
    /// bytes are also added to [`dropped`](Self::dropped).
    pub fn try_write(&self, bytes: &[u8]) -> WriteReport {
        self.with_state(|s| {
            let mut accepted = 0;
            for &byte in bytes {
                if s.ring.push_back(byte).is_err() {
                    break;
                }
                accepted += 1;
            }

            let report = WriteReport::new(bytes.len(), accepted);
            if report.rejected > 0 {
                let rejected = u32::try_from(report.rejected).unwrap_or(u32::MAX);
                s.dropped = s.dropped.saturating_add(rejected);
                trace!("channel full, rejected {} bytes", report.rejected);
            }

            if accepted > 0 && s.ring.len() >= s.trigger_level {
                s.reader.wake();
            }
            report
        })
    }

    /// Read one byte, blocking up to `timeout`
    ///
    /// `delay` measures the timeout; it is not touched for
    /// [`ReadTimeout::Forever`] or [`ReadTimeout::Immediate`].
    pub async fn read<D: DelayNs>(
        &self,
        timeout: ReadTimeout,
        delay: &mut D,
    ) -> Result<u8, ReadTimedOut> {
        let mut byte = 0u8;
        self.read_into(core::slice::from_mut(&mut byte), timeout, delay)
            .await?;
        Ok(byte)
    }

    /// Read up to `buf.len()` bytes, blocking up to `timeout`
    ///
    /// Returns immediately when data is already buffered. A reader that had
    /// to wait wakes once the trigger level is reached; on timeout it takes
    /// whatever is buffered, failing only if that is nothing.
    pub async fn read_into<D: DelayNs>(
        &self,
        buf: &mut [u8],
        timeout: ReadTimeout,
        delay: &mut D,
    ) -> Result<usize, ReadTimedOut> {
        if buf.is_empty() {
            return Ok(0);
        }

        let n = self.with_state(|s| s.pop_into(buf));
        if n > 0 {
            return Ok(n);
        }

        match timeout {
            ReadTimeout::Immediate => Err(ReadTimedOut),
            ReadTimeout::Forever => Ok(self.wait_and_read(buf).await),
            ReadTimeout::Micros(us) => {
                let outcome = select(self.wait_and_read(buf), delay.delay_us(us)).await;
                match outcome {
                    Either::First(n) => Ok(n),
                    Either::Second(()) => match self.with_state(|s| s.pop_into(buf)) {
                        0 => Err(ReadTimedOut),
                        n => Ok(n),
                    },
                }
            }
        }
    }

    /// Take one byte if any is buffered
    pub fn try_read(&self) -> Option<u8> {
        self.with_state(|s| s.ring.pop_front())
    }

    /// Free space in bytes (racy snapshot)
    #[must_use]
    pub fn space_available(&self) -> usize {
        N - self.occupied()
    }

    /// Buffered bytes (racy snapshot)
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.with_state(|s| s.ring.len())
    }

    /// Total capacity in bytes
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Current trigger level
    #[must_use]
    pub fn trigger_level(&self) -> usize {
        self.with_state(|s| s.trigger_level)
    }

    /// Check if nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Check if no space is left
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.occupied() == N
    }

    /// Bytes rejected by [`try_write`](Self::try_write) since creation
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.with_state(|s| s.dropped)
    }

    /// Check if a reader is currently blocked
    #[must_use]
    pub fn has_waiting_reader(&self) -> bool {
        self.with_state(|s| s.reader_waiting)
    }

    /// Discard all buffered bytes
    ///
    /// Refused while a reader is blocked so it cannot miss a wake-up.
    pub fn reset(&self) -> Result<(), ChannelError> {
        self.with_state(|s| {
            if s.reader_waiting {
                return Err(ChannelError::ReaderWaiting);
            }
            s.ring.clear();
            Ok(())
        })
    }

    async fn wait_and_read(&self, buf: &mut [u8]) -> usize {
        let _waiting = WaitingReader(self);
        poll_fn(|cx| {
            self.with_state(|s| {
                if s.ring.len() >= s.trigger_level {
                    s.reader_waiting = false;
                    Poll::Ready(s.pop_into(buf))
                } else {
                    s.reader_waiting = true;
                    s.reader.register(cx.waker());
                    Poll::Pending
                }
            })
        })
        .await
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChannelState<N>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex, const N: usize> Default for ByteChannel<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the waiting flag when a blocked read completes or is dropped
struct WaitingReader<'a, M: RawMutex, const N: usize>(&'a ByteChannel<M, N>);

impl<M: RawMutex, const N: usize> Drop for WaitingReader<'_, M, N> {
    fn drop(&mut self) {
        self.0.with_state(|s| s.reader_waiting = false);
    }
}
