//! Bounded Byte Channel Tests
//!
//! Tests for the producer/consumer byte channel between ingress and echo.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test channel_tests

use std::cell::RefCell;
use std::rc::Rc;

use cdc_relay_firmware::channel::ByteChannel;
use cdc_relay_firmware::types::{ChannelError, ReadTimedOut, ReadTimeout};
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embedded_hal_async::delay::DelayNs;

/// Delay that completes at once and records every request in nanoseconds
#[derive(Clone, Default)]
struct FakeDelay(Rc<RefCell<Vec<u32>>>);

impl FakeDelay {
    fn calls(&self) -> usize {
        self.0.borrow().len()
    }

    fn last_us(&self) -> Option<u32> {
        self.0.borrow().last().map(|ns| ns / 1000)
    }
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().push(ns);
    }
}

/// Delay whose "time passing" is a producer writing into the channel
struct WriteDuringDelay<'a, const N: usize> {
    channel: &'a ByteChannel<NoopRawMutex, N>,
    bytes: &'a [u8],
}

impl<const N: usize> DelayNs for WriteDuringDelay<'_, N> {
    async fn delay_ns(&mut self, _ns: u32) {
        let _ = self.channel.try_write(self.bytes);
    }
}

// =============================================================================
// Write Tests
// =============================================================================

#[test]
fn fifo_order_across_writes() {
    let channel: ByteChannel<NoopRawMutex, 32> = ByteChannel::new();
    assert!(channel.try_write(b"abc").is_complete());
    assert!(channel.try_write(b"de").is_complete());
    assert!(channel.try_write(b"f").is_complete());

    let mut out = Vec::new();
    while let Some(byte) = channel.try_read() {
        out.push(byte);
    }
    assert_eq!(out, b"abcdef");
}

#[test]
fn overflow_truncates_at_capacity() {
    let channel: ByteChannel<NoopRawMutex, 10> = ByteChannel::new();
    let data: Vec<u8> = (0..64).collect();

    let report = channel.try_write(&data);
    assert_eq!(report.accepted, 10);
    assert_eq!(report.rejected, 54);
    assert_eq!(channel.occupied(), 10);
    assert!(channel.is_full());

    let mut buf = [0u8; 64];
    let mut delay = FakeDelay::default();
    let n = block_on(channel.read_into(&mut buf, ReadTimeout::Immediate, &mut delay)).unwrap();
    assert_eq!(&buf[..n], &data[..10]);
    assert!(channel.is_empty());
}

#[test]
fn write_to_full_channel_accepts_nothing() {
    let channel: ByteChannel<NoopRawMutex, 4> = ByteChannel::new();
    let _ = channel.try_write(b"1234");

    let report = channel.try_write(b"5");
    assert_eq!(report.accepted, 0);
    assert_eq!(report.rejected, 1);
    assert_eq!(channel.try_read(), Some(b'1'));
}

#[test]
fn accepted_never_exceeds_observed_space() {
    let channel: ByteChannel<NoopRawMutex, 100> = ByteChannel::new();
    let chunk = [0x55u8; 37];

    for round in 0..10 {
        let space = channel.space_available();
        let report = channel.try_write(&chunk);
        assert!(report.accepted <= space, "round {round}");
        assert!(channel.occupied() <= channel.capacity());
        if round % 3 == 0 {
            let _ = channel.try_read();
        }
    }
    // Reads in rounds 0, 3, 6 and 9 leave one byte free
    assert_eq!(channel.occupied(), 99);
}

#[test]
fn dropped_counter_accumulates() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let _ = channel.try_write(&[0; 10]);
    let _ = channel.try_write(&[0; 5]);
    assert_eq!(channel.dropped(), 7);
}

#[test]
fn empty_write_is_complete() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let report = channel.try_write(&[]);
    assert!(report.is_complete());
    assert_eq!(report.requested(), 0);
    assert!(channel.is_empty());
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn buffered_byte_returns_without_waiting() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let _ = channel.try_write(b"z");

    let mut delay = FakeDelay::default();
    let byte = block_on(channel.read(ReadTimeout::from_millis(10), &mut delay));
    assert_eq!(byte, Ok(b'z'));
    assert_eq!(delay.calls(), 0);
}

#[test]
fn read_returns_one_byte_per_call() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let _ = channel.try_write(b"xy");

    let mut delay = FakeDelay::default();
    assert_eq!(block_on(channel.read(ReadTimeout::Forever, &mut delay)), Ok(b'x'));
    assert_eq!(channel.occupied(), 1);
}

#[test]
fn immediate_read_on_empty_channel_fails() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let mut delay = FakeDelay::default();
    assert_eq!(
        block_on(channel.read(ReadTimeout::Immediate, &mut delay)),
        Err(ReadTimedOut)
    );
    assert_eq!(delay.calls(), 0);
}

#[test]
fn bounded_read_times_out_on_the_delay() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let mut delay = FakeDelay::default();

    let result = block_on(channel.read(ReadTimeout::Micros(2_500), &mut delay));
    assert_eq!(result, Err(ReadTimedOut));
    assert_eq!(delay.last_us(), Some(2_500));
    assert!(!channel.has_waiting_reader());
}

#[test]
fn timeout_below_trigger_returns_partial_data() {
    let channel: ByteChannel<NoopRawMutex, 16> = ByteChannel::with_trigger_level(4).unwrap();
    let mut delay = WriteDuringDelay {
        channel: &channel,
        bytes: b"ab",
    };

    let mut buf = [0u8; 8];
    let n = block_on(channel.read_into(&mut buf, ReadTimeout::Micros(100), &mut delay));
    assert_eq!(n, Ok(2));
    assert_eq!(&buf[..2], b"ab");
}

#[test]
fn read_into_empty_buffer_is_noop() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let mut delay = FakeDelay::default();
    assert_eq!(
        block_on(channel.read_into(&mut [], ReadTimeout::Forever, &mut delay)),
        Ok(0)
    );
}

// =============================================================================
// Trigger Level and Reset Tests
// =============================================================================

#[test]
fn trigger_level_zero_behaves_as_one() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::with_trigger_level(0).unwrap();
    assert_eq!(channel.trigger_level(), 1);
}

#[test]
fn trigger_level_above_capacity_rejected() {
    let result = ByteChannel::<NoopRawMutex, 8>::with_trigger_level(9);
    assert!(matches!(
        result,
        Err(ChannelError::TriggerLevel {
            requested: 9,
            capacity: 8
        })
    ));
}

#[test]
fn trigger_level_can_change() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    assert_eq!(channel.set_trigger_level(8), Ok(()));
    assert_eq!(channel.trigger_level(), 8);
    assert!(channel.set_trigger_level(20).is_err());
    assert_eq!(channel.trigger_level(), 8);
}

#[test]
fn reset_discards_buffered_bytes() {
    let channel: ByteChannel<NoopRawMutex, 8> = ByteChannel::new();
    let _ = channel.try_write(b"stale");
    assert_eq!(channel.reset(), Ok(()));
    assert!(channel.is_empty());
    assert_eq!(channel.space_available(), 8);
}

// =============================================================================
// Cross-Thread Tests
// =============================================================================

#[test]
fn bytes_cross_threads_in_order() {
    const TOTAL: usize = 2_000;
    let channel: ByteChannel<CriticalSectionRawMutex, 16> = ByteChannel::new();

    let received = std::thread::scope(|scope| {
        scope.spawn(|| {
            let data: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            let mut sent = 0;
            while sent < TOTAL {
                let end = (sent + 5).min(TOTAL);
                sent += channel.try_write(&data[sent..end]).accepted;
                std::thread::yield_now();
            }
        });

        let mut delay = FakeDelay::default();
        let mut received = Vec::with_capacity(TOTAL);
        while received.len() < TOTAL {
            let byte = block_on(channel.read(ReadTimeout::Forever, &mut delay)).unwrap();
            received.push(byte);
        }
        received
    });

    assert!(received.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));
    assert!(channel.is_empty());
}
