//! USB Subsystem
//!
//! Provides USB functionality for the relay:
//! - CDC ACM serial port FIFOs and line state
//! - embassy-usb device construction (firmware builds)

pub mod cdc;

#[cfg(feature = "embedded")]
pub mod device;
