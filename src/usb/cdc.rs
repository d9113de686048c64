//! USB CDC ACM (Serial) Port
//!
//! The CDC layer's own receive and transmit FIFOs plus the host line
//! state. The device pump fills the RX FIFO and drains the TX FIFO; the
//! relay tasks only see the [`CdcIngress`] and [`CdcEgress`] views.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use heapless::Deque;

use crate::types::UsbError;

/// Inbound half of the serial port, as seen by the ingress task
pub trait CdcIngress {
    /// Host has asserted DTR
    fn is_connected(&self) -> bool;

    /// Bytes waiting in the receive FIFO
    fn bytes_available(&self) -> usize;

    /// Move up to `buf.len()` received bytes into `buf`
    fn read_chunk(&mut self, buf: &mut [u8]) -> usize;
}

/// Outbound half of the serial port, as seen by the consumer
pub trait CdcEgress {
    /// Queue bytes for transmission, possibly fewer than offered
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, UsbError>;

    /// Ask the pump to put queued bytes on the wire
    fn flush(&mut self) -> Result<(), UsbError>;
}

struct PortState<const RX: usize, const TX: usize> {
    rx: Deque<u8, RX>,
    tx: Deque<u8, TX>,
    signals: ControlSignals,
    line_coding: LineCoding,
    rx_overflow: u32,
}

/// Serial port shared between the USB pump and the relay tasks
pub struct SerialPort<M: RawMutex, const RX: usize, const TX: usize> {
    state: Mutex<M, RefCell<PortState<RX, TX>>>,
    flush_request: Signal<M, ()>,
}

impl<M: RawMutex, const RX: usize, const TX: usize> SerialPort<M, RX, TX> {
    /// Create a disconnected port with empty FIFOs
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(PortState {
                rx: Deque::new(),
                tx: Deque::new(),
                signals: ControlSignals {
                    dtr: false,
                    rts: false,
                },
                line_coding: LineCoding::DEFAULT,
                rx_overflow: 0,
            })),
            flush_request: Signal::new(),
        }
    }

    /// Update DTR/RTS as reported by the host
    ///
    /// Dropping DTR discards unsent output so a new session starts clean.
    pub fn set_control_signals(&self, signals: ControlSignals) {
        self.with_state(|s| {
            if s.signals.connected() != signals.connected() {
                if signals.connected() {
                    info!("cdc: host connected");
                } else {
                    info!("cdc: host disconnected, discarding {} tx bytes", s.tx.len());
                    s.tx.clear();
                }
            }
            s.signals = signals;
        });
    }

    /// Current DTR/RTS state
    #[must_use]
    pub fn control_signals(&self) -> ControlSignals {
        self.with_state(|s| s.signals)
    }

    /// Record the line coding last set by the host
    pub fn set_line_coding(&self, line_coding: LineCoding) {
        self.with_state(|s| s.line_coding = line_coding);
    }

    /// Line coding last set by the host
    #[must_use]
    pub fn line_coding(&self) -> LineCoding {
        self.with_state(|s| s.line_coding)
    }

    /// Hand received bytes to the port; returns how many fit
    ///
    /// Bytes that do not fit are lost and counted in
    /// [`rx_overflow`](Self::rx_overflow).
    pub fn deliver_rx(&self, bytes: &[u8]) -> usize {
        self.with_state(|s| {
            let mut accepted = 0;
            for &byte in bytes {
                if s.rx.push_back(byte).is_err() {
                    break;
                }
                accepted += 1;
            }
            let lost = bytes.len() - accepted;
            if lost > 0 {
                s.rx_overflow = s
                    .rx_overflow
                    .saturating_add(u32::try_from(lost).unwrap_or(u32::MAX));
                warn!("cdc: rx fifo overflow, lost {} bytes", lost);
            }
            accepted
        })
    }

    /// Free space in the receive FIFO
    #[must_use]
    pub fn rx_space(&self) -> usize {
        self.with_state(|s| RX - s.rx.len())
    }

    /// Bytes lost because the receive FIFO was full
    #[must_use]
    pub fn rx_overflow(&self) -> u32 {
        self.with_state(|s| s.rx_overflow)
    }

    /// Bytes queued for transmission
    #[must_use]
    pub fn tx_pending(&self) -> usize {
        self.with_state(|s| s.tx.len())
    }

    /// Copy queued bytes into `buf` without removing them
    pub fn peek_tx(&self, buf: &mut [u8]) -> usize {
        self.with_state(|s| {
            let mut n = 0;
            for (slot, &byte) in buf.iter_mut().zip(s.tx.iter()) {
                *slot = byte;
                n += 1;
            }
            n
        })
    }

    /// Remove `n` bytes that were sent after [`peek_tx`](Self::peek_tx)
    pub fn consume_tx(&self, n: usize) {
        self.with_state(|s| {
            for _ in 0..n {
                if s.tx.pop_front().is_none() {
                    break;
                }
            }
        });
    }

    /// Remove up to `buf.len()` queued bytes into `buf`
    pub fn take_tx(&self, buf: &mut [u8]) -> usize {
        let n = self.peek_tx(buf);
        self.consume_tx(n);
        n
    }

    /// Wait until a task asks for a flush
    pub async fn wait_flush_request(&self) {
        self.flush_request.wait().await;
    }

    /// Check for a pending flush request without waiting
    #[must_use]
    pub fn flush_requested(&self) -> bool {
        self.flush_request.signaled()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PortState<RX, TX>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<M: RawMutex, const RX: usize, const TX: usize> Default for SerialPort<M, RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const RX: usize, const TX: usize> CdcIngress for &SerialPort<M, RX, TX> {
    fn is_connected(&self) -> bool {
        self.with_state(|s| s.signals.connected())
    }

    fn bytes_available(&self) -> usize {
        self.with_state(|s| s.rx.len())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> usize {
        self.with_state(|s| {
            let mut n = 0;
            for slot in buf.iter_mut() {
                match s.rx.pop_front() {
                    Some(byte) => {
                        *slot = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            n
        })
    }
}

impl<M: RawMutex, const RX: usize, const TX: usize> CdcEgress for &SerialPort<M, RX, TX> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, UsbError> {
        self.with_state(|s| {
            if !s.signals.connected() {
                return Err(UsbError::NotConnected);
            }
            if bytes.is_empty() {
                return Ok(0);
            }
            if s.tx.is_full() {
                return Err(UsbError::TxFull);
            }
            let mut n = 0;
            for &byte in bytes {
                if s.tx.push_back(byte).is_err() {
                    break;
                }
                n += 1;
            }
            Ok(n)
        })
    }

    fn flush(&mut self) -> Result<(), UsbError> {
        if !self.with_state(|s| s.signals.connected()) {
            return Err(UsbError::NotConnected);
        }
        self.flush_request.signal(());
        Ok(())
    }
}

/// Line coding (baud rate, etc.)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCoding {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 1.5, 2)
    pub stop_bits: StopBits,
    /// Parity
    pub parity: Parity,
}

impl LineCoding {
    /// 115200 8N1
    pub const DEFAULT: Self = Self {
        baud_rate: 115_200,
        data_bits: 8,
        stop_bits: StopBits::One,
        parity: Parity::None,
    };
}

impl Default for LineCoding {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for LineCoding {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{} baud, {} bits", self.baud_rate, self.data_bits);
    }
}

/// Stop bits configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// One and a half stop bits
    OnePointFive,
    /// Two stop bits
    Two,
}

/// Parity configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
    /// Mark parity
    Mark,
    /// Space parity
    Space,
}

/// DTR/RTS control signals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlSignals {
    /// Data Terminal Ready
    pub dtr: bool,
    /// Request To Send
    pub rts: bool,
}

impl ControlSignals {
    /// Signals of a terminal that opened the port
    pub const CONNECTED: Self = Self {
        dtr: true,
        rts: true,
    };

    /// Check if host is connected (DTR set)
    ///
    /// Most but not all terminal programs raise DTR when opening the port.
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.dtr
    }
}

/// USB device descriptor strings
pub struct UsbStrings {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Product name
    pub product: &'static str,
    /// Serial number
    pub serial: &'static str,
}

impl Default for UsbStrings {
    fn default() -> Self {
        Self {
            manufacturer: "CDC Relay Project",
            product: "CDC Echo Relay",
            serial: "123456",
        }
    }
}

/// USB device info for descriptor
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vid: u16,
    /// Product ID
    pub pid: u16,
    /// Device release number
    pub device_release: u16,
}

impl Default for UsbDeviceInfo {
    fn default() -> Self {
        Self {
            vid: crate::config::USB_VID,
            pid: crate::config::USB_PID,
            device_release: 0x0100,
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for UsbDeviceInfo {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "USB({:04X}:{:04X})", self.vid, self.pid);
    }
}
