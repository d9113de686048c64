//! embassy-usb device stack
//!
//! Builds the CDC ACM device and adapts its class endpoints to the
//! [`DeviceStack`] the pump drives. Everything here runs inside the pump
//! task; no other task touches the endpoints.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration};
use embassy_usb::class::cdc_acm::{self, CdcAcmClass, State};
use embassy_usb::driver::{Driver, EndpointError};
use embassy_usb::{Builder, Config, UsbDevice};

use super::cdc::{ControlSignals, LineCoding, Parity, SerialPort, StopBits, UsbDeviceInfo, UsbStrings};
use crate::config::{USB_CDC_PACKET_SIZE, USB_EP0_PACKET_SIZE, USB_MAX_POWER_MA};
use crate::tasks::pump::DeviceStack;
use crate::types::UsbError;

const PACKET_LEN: usize = USB_CDC_PACKET_SIZE as usize;

/// CDC ACM state
pub struct CdcState<'d> {
    state: State<'d>,
}

impl<'d> Default for CdcState<'d> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> CdcState<'d> {
    /// Create new CDC state
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::new(),
        }
    }

    /// Get reference to state for class creation
    pub fn state_mut(&mut self) -> &mut State<'d> {
        &mut self.state
    }
}

/// Descriptor and control buffers the device borrows for its lifetime
pub struct UsbResources<'d> {
    config_descriptor: [u8; 256],
    bos_descriptor: [u8; 256],
    msos_descriptor: [u8; 256],
    control_buf: [u8; 64],
    cdc: CdcState<'d>,
}

impl<'d> UsbResources<'d> {
    /// Zeroed buffers and fresh class state
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_descriptor: [0; 256],
            bos_descriptor: [0; 256],
            msos_descriptor: [0; 256],
            control_buf: [0; 64],
            cdc: CdcState::new(),
        }
    }
}

impl<'d> Default for UsbResources<'d> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the CDC ACM device
///
/// The returned [`UsbDevice`] must be run alongside the pump in the pump
/// task; the [`CdcStack`] is the pump's view of the data endpoints.
pub fn build<'d, D, M, const RX: usize, const TX: usize>(
    driver: D,
    resources: &'d mut UsbResources<'d>,
    port: &'d SerialPort<M, RX, TX>,
    poll_window_us: u32,
) -> (UsbDevice<'d, D>, CdcStack<'d, D, M, RX, TX>)
where
    D: Driver<'d>,
    M: RawMutex,
{
    let info = UsbDeviceInfo::default();
    let strings = UsbStrings::default();

    let mut config = Config::new(info.vid, info.pid);
    config.device_release = info.device_release;
    config.manufacturer = Some(strings.manufacturer);
    config.product = Some(strings.product);
    config.serial_number = Some(strings.serial);
    config.max_power = USB_MAX_POWER_MA;
    config.max_packet_size_0 = USB_EP0_PACKET_SIZE;

    // Windows needs IADs for a composite CDC function
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;

    let UsbResources {
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
        cdc,
    } = resources;

    let mut builder = Builder::new(
        driver,
        config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let class = CdcAcmClass::new(&mut builder, cdc.state_mut(), USB_CDC_PACKET_SIZE);
    let device = builder.build();

    info!("usb: {} built", info);

    (
        device,
        CdcStack {
            class,
            port,
            poll_window: Duration::from_micros(u64::from(poll_window_us)),
            packet: [0; PACKET_LEN],
        },
    )
}

/// CDC data endpoints bridged onto a [`SerialPort`]
pub struct CdcStack<'d, D: Driver<'d>, M: RawMutex, const RX: usize, const TX: usize> {
    class: CdcAcmClass<'d, D>,
    port: &'d SerialPort<M, RX, TX>,
    poll_window: Duration,
    packet: [u8; PACKET_LEN],
}

impl<'d, D: Driver<'d>, M: RawMutex, const RX: usize, const TX: usize> CdcStack<'d, D, M, RX, TX> {
    fn sync_line_state(&mut self) {
        self.port.set_control_signals(ControlSignals {
            dtr: self.class.dtr(),
            rts: self.class.rts(),
        });
        self.port.set_line_coding(line_coding(&self.class.line_coding()));
    }

    fn max_packet(&self) -> usize {
        usize::from(self.class.max_packet_size()).min(PACKET_LEN)
    }

    fn endpoint_lost(&mut self) {
        warn!("usb: data endpoint disabled");
        self.port.set_control_signals(ControlSignals::default());
    }
}

impl<'d, D: Driver<'d>, M: RawMutex, const RX: usize, const TX: usize> DeviceStack
    for CdcStack<'d, D, M, RX, TX>
{
    fn init(&mut self) -> Result<(), UsbError> {
        if usize::from(self.class.max_packet_size()) > PACKET_LEN {
            error!("usb: packet size {} exceeds buffer", self.class.max_packet_size());
            return Err(UsbError::InitFailed);
        }
        self.port.set_control_signals(ControlSignals::default());
        Ok(())
    }

    async fn service(&mut self) -> usize {
        self.sync_line_state();
        let port = self.port;
        let max = self.max_packet();

        // Only pull a packet when the FIFO can take all of it; otherwise the
        // endpoint NAKs and the host keeps the data.
        let events = if port.rx_space() >= max {
            let outcome = with_timeout(
                self.poll_window,
                select(
                    self.class.read_packet(&mut self.packet[..max]),
                    port.wait_flush_request(),
                ),
            )
            .await;

            match outcome {
                Ok(Either::First(Ok(n))) => {
                    port.deliver_rx(&self.packet[..n]);
                    trace!("usb: rx packet {} bytes", n);
                    1
                }
                Ok(Either::First(Err(EndpointError::Disabled))) => {
                    self.endpoint_lost();
                    1
                }
                Ok(Either::First(Err(EndpointError::BufferOverflow))) => {
                    warn!("usb: rx packet larger than {} bytes", max);
                    1
                }
                Ok(Either::Second(())) => 1,
                Err(_) => 0,
            }
        } else {
            match with_timeout(self.poll_window, port.wait_flush_request()).await {
                Ok(()) => 1,
                Err(_) => 0,
            }
        };

        self.sync_line_state();
        events
    }

    async fn flush(&mut self) -> usize {
        if !self.class.dtr() {
            return 0;
        }

        let max = self.max_packet();
        let mut sent = 0;
        let mut last_len = 0;
        loop {
            let n = self.port.peek_tx(&mut self.packet[..max]);
            if n == 0 {
                break;
            }
            match with_timeout(self.poll_window, self.class.write_packet(&self.packet[..n])).await {
                Ok(Ok(())) => {
                    self.port.consume_tx(n);
                    sent += n;
                    last_len = n;
                }
                Ok(Err(EndpointError::Disabled)) => {
                    self.endpoint_lost();
                    return sent;
                }
                Ok(Err(EndpointError::BufferOverflow)) => {
                    warn!("usb: tx packet rejected");
                    return sent;
                }
                // Host is not reading; keep the bytes for the next cycle
                Err(_) => return sent,
            }
        }

        // A full-size packet needs a ZLP to end the transfer
        if sent > 0 && last_len == max {
            if let Ok(Err(e)) = with_timeout(self.poll_window, self.class.write_packet(&[])).await {
                warn!("usb: zlp failed: {}", e);
            }
        }
        sent
    }
}

fn line_coding(coding: &cdc_acm::LineCoding) -> LineCoding {
    LineCoding {
        baud_rate: coding.data_rate(),
        data_bits: coding.data_bits(),
        stop_bits: match coding.stop_bits() {
            cdc_acm::StopBits::One => StopBits::One,
            cdc_acm::StopBits::OnePointFive => StopBits::OnePointFive,
            cdc_acm::StopBits::Two => StopBits::Two,
        },
        parity: match coding.parity_type() {
            cdc_acm::ParityType::None => Parity::None,
            cdc_acm::ParityType::Odd => Parity::Odd,
            cdc_acm::ParityType::Even => Parity::Even,
            cdc_acm::ParityType::Mark => Parity::Mark,
            cdc_acm::ParityType::Space => Parity::Space,
        },
    }
}
