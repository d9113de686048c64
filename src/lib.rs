//! USB CDC Relay Firmware Library
//!
//! This library provides the core of an STM32G474 firmware that exposes a
//! USB CDC virtual serial port and echoes every received byte back to the
//! host through a bounded byte channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  USB IRQ ─▶ Device Pump (P3) ─▶ CDC RX FIFO                  │
//! │                                   │                          │
//! │                     CDC Ingress (P2) ── try_write ─┐         │
//! │                                                    ▼         │
//! │                                           Bounded Byte Channel│
//! │                                                    │ read    │
//! │  Device Pump (P3) ◀─ CDC TX FIFO ◀── Echo Consumer (P1)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │   embassy-rs interrupt executors (P3, P2) + thread mode (P1) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Injected handles**: the channel and serial port are created once in
//!   `main` and passed by reference; no task reaches for globals
//! - **State machines over loops**: every task body runs one `cycle` at a
//!   time so host tests can bound it
//! - **No silent loss**: channel writes report rejected bytes, transmit
//!   failures surface as [`types::UsbError`]
//! - **No unsafe in library code**: all unsafe isolated in the binary's
//!   interrupt glue

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(async_fn_in_trait)]

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;
#[cfg(feature = "embedded")]
pub use embassy_usb;

#[macro_use]
mod fmt;

/// Bounded Byte Channel
///
/// The single handoff point between ingress and consumer.
pub mod channel;

/// Timed yield used by every polling task
pub mod pacer;

/// Relay task bodies
///
/// USB pump, CDC ingress, echo consumer and heartbeat.
pub mod tasks;

/// USB Subsystem
///
/// CDC ACM serial port and, in firmware builds, the embassy-usb device.
pub mod usb;

/// Task table and start-up checks
pub mod bootstrap;

/// Shared types used across modules
pub mod types;

/// System configuration and constants
pub mod config;

/// Prelude module for common imports
#[cfg(feature = "embedded")]
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::types::*;

    // Embassy
    pub use embassy_time::{Delay, Duration, Instant, Timer};

    // Error handling
    pub use core::result::Result;

    // Logging
    pub use defmt::{debug, error, info, trace, warn};
}
