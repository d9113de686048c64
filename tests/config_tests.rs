//! Configuration and Constants Tests
//!
//! Tests to verify configuration values are valid and consistent.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test config_tests

use cdc_relay_firmware::config::*;
use cdc_relay_firmware::types::{ReadTimeout, TaskPriority};

// =============================================================================
// Clock Tests
// =============================================================================

#[test]
fn system_clock_valid() {
    // STM32G474 max clock is 170 MHz
    assert_eq!(SYSTEM_CLOCK_HZ, 170_000_000);
}

// =============================================================================
// Channel Configuration Tests
// =============================================================================

#[test]
fn channel_holds_several_chunks() {
    assert!(CHANNEL_CAPACITY >= 2 * CDC_CHUNK_LEN);
}

#[test]
fn trigger_level_within_capacity() {
    assert!(CHANNEL_TRIGGER_LEVEL >= 1);
    assert!(CHANNEL_TRIGGER_LEVEL <= CHANNEL_CAPACITY);
}

#[test]
fn chunk_matches_packet() {
    // One hardware read moves at most one full-speed packet
    assert_eq!(CDC_CHUNK_LEN, usize::from(USB_CDC_PACKET_SIZE));
    assert!(USB_RX_FIFO_LEN >= CDC_CHUNK_LEN);
}

// =============================================================================
// Task Configuration Tests
// =============================================================================

#[test]
fn priorities_ordered() {
    assert!(PUMP_PRIORITY > INGRESS_PRIORITY);
    assert!(INGRESS_PRIORITY > CONSUMER_PRIORITY);
    assert!(INGRESS_PRIORITY > HEARTBEAT_PRIORITY);
    assert_eq!(PUMP_PRIORITY, TaskPriority::new(3));
}

#[test]
fn heartbeat_period() {
    assert_eq!(HEARTBEAT_PERIOD_MS, 250);
}

#[test]
fn yields_are_short() {
    // A yield longer than a frame (1 ms) would starve the host's polls
    assert!(PUMP_YIELD_US <= 1_000);
    assert!(PUMP_POLL_WINDOW_US <= 1_000);
    assert!(INGRESS_YIELD_US <= 1_000);
}

#[test]
fn retry_limit_nonzero() {
    assert!(ECHO_RETRY_LIMIT >= 1);
}

// =============================================================================
// USB Configuration Tests
// =============================================================================

#[test]
fn usb_vid_valid() {
    // 0x1209 is the test/hobbyist VID from pid.codes
    assert_eq!(USB_VID, 0x1209);
}

#[test]
fn usb_pid_valid() {
    assert!(USB_PID != 0x0000);
}

#[test]
fn usb_packet_size_valid() {
    // CDC packet size must be 8, 16, 32, or 64 for full-speed USB
    assert!(matches!(USB_CDC_PACKET_SIZE, 8 | 16 | 32 | 64));
    assert!(matches!(USB_EP0_PACKET_SIZE, 8 | 16 | 32 | 64));
}

#[test]
fn usb_power_within_bus_limit() {
    assert!(USB_MAX_POWER_MA <= 500);
}

#[test]
fn pin_assignments() {
    assert_eq!(pins::LED_STATUS, "PA5");
    assert_eq!(pins::USB_DP, "PA12");
    assert_eq!(pins::USB_DM, "PA11");
    assert_ne!(executors::HIGH_IRQ, executors::MEDIUM_IRQ);
}

#[test]
fn executor_nvic_levels_ordered() {
    // Lower number preempts; both must fit the G4's four priority bits
    assert!(executors::HIGH_NVIC_PRIORITY < executors::MEDIUM_NVIC_PRIORITY);
    assert!(executors::MEDIUM_NVIC_PRIORITY <= 15);
}

// =============================================================================
// Runtime Configuration Tests
// =============================================================================

#[test]
fn default_config_is_valid() {
    let config = RelayConfig::default();
    assert_eq!(config.validate(CHANNEL_CAPACITY), Ok(()));
    assert_eq!(config.chunk_size, CDC_CHUNK_LEN);
    assert_eq!(config.consumer_timeout, ReadTimeout::Forever);
}

#[test]
fn zero_chunk_rejected() {
    let config = RelayConfig::default().with_chunk_size(0);
    assert_eq!(config.validate(CHANNEL_CAPACITY), Err(ConfigError::ChunkSize(0)));
}

#[test]
fn oversized_chunk_rejected() {
    let config = RelayConfig::default().with_chunk_size(CDC_CHUNK_LEN + 1);
    assert_eq!(
        config.validate(CHANNEL_CAPACITY),
        Err(ConfigError::ChunkSize(CDC_CHUNK_LEN + 1))
    );
}

#[test]
fn chunk_larger_than_channel_rejected() {
    let config = RelayConfig::default();
    assert_eq!(
        config.validate(32),
        Err(ConfigError::ChunkExceedsChannel {
            chunk: 64,
            capacity: 32
        })
    );
}

#[test]
fn builder_sets_fields() {
    let config = RelayConfig::new()
        .with_yield_us(0)
        .with_retry_limit(2)
        .with_consumer_timeout(ReadTimeout::from_millis(5));
    assert_eq!(config.pump_yield_us, 0);
    assert_eq!(config.ingress_yield_us, 0);
    assert_eq!(config.echo_retry_us, 0);
    assert_eq!(config.echo_retry_limit, 2);
    assert_eq!(config.consumer_timeout, ReadTimeout::Micros(5_000));
    // Poll window is not a yield
    assert_eq!(config.pump_poll_window_us, PUMP_POLL_WINDOW_US);
}
