//! CDC Relay Main Application
//!
//! Entry point for the STM32G474 USB CDC echo firmware.
//! Allocates the byte channel, starts one executor per priority tier and
//! spawns the relay tasks.

#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::{InterruptExecutor, SpawnError, Spawner};
use embassy_futures::select::{select, Either};
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::usb::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals, Config};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Delay;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use cdc_relay_firmware::bootstrap::{self, BootError, TaskDescriptor, TaskRole, TASKS};
use cdc_relay_firmware::channel::ByteChannel;
use cdc_relay_firmware::config::{
    executors, RelayConfig, CHANNEL_CAPACITY, CHANNEL_TRIGGER_LEVEL, USB_RX_FIFO_LEN,
    USB_TX_FIFO_LEN,
};
use cdc_relay_firmware::tasks::echo::EchoTask;
use cdc_relay_firmware::tasks::heartbeat::Heartbeat;
use cdc_relay_firmware::tasks::ingress::IngressTask;
use cdc_relay_firmware::tasks::pump::UsbPump;
use cdc_relay_firmware::types::Budget;
use cdc_relay_firmware::usb::cdc::SerialPort;
use cdc_relay_firmware::usb::device::{self, UsbResources};

// Bind interrupt handlers
bind_interrupts!(struct Irqs {
    USB_LP => usb::InterruptHandler<peripherals::USB>;
});

type RelayChannel = ByteChannel<CriticalSectionRawMutex, CHANNEL_CAPACITY>;
type RelayPort = SerialPort<CriticalSectionRawMutex, USB_RX_FIFO_LEN, USB_TX_FIFO_LEN>;

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();
static EXECUTOR_MEDIUM: InterruptExecutor = InterruptExecutor::new();

static CHANNEL: StaticCell<RelayChannel> = StaticCell::new();
static PORT: StaticCell<RelayPort> = StaticCell::new();
static USB_RESOURCES: StaticCell<UsbResources<'static>> = StaticCell::new();

#[interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[interrupt]
unsafe fn UART5() {
    unsafe { EXECUTOR_MEDIUM.on_interrupt() }
}

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("CDC Relay Firmware v{}", env!("CARGO_PKG_VERSION"));

    let p = embassy_stm32::init(clock_config());
    info!("Peripherals initialized");

    let config = RelayConfig::default();
    if let Err(e) = bootstrap::validate(&TASKS) {
        bootstrap::halt(e);
    }
    if let Err(e) = config.validate(CHANNEL_CAPACITY) {
        bootstrap::halt(e.into());
    }

    // The channel exists before any task does
    let channel: &'static RelayChannel = match RelayChannel::with_trigger_level(CHANNEL_TRIGGER_LEVEL) {
        Ok(channel) => match CHANNEL.try_init(channel) {
            Some(channel) => channel,
            None => bootstrap::halt(BootError::ChannelTaken),
        },
        Err(e) => bootstrap::halt(e.into()),
    };
    let port: &'static RelayPort = PORT.init(RelayPort::new());
    info!(
        "Byte channel: {} bytes, trigger level {}",
        channel.capacity(),
        channel.trigger_level()
    );

    // Status LED (PA5 on Nucleo boards)
    let led = Output::new(p.PA5, Level::Low, Speed::Low);

    // USB pump tier
    let usbd = descriptor(TaskRole::UsbPump);
    interrupt::UART4.set_priority(nvic_priority(usbd));
    let high = EXECUTOR_HIGH.start(interrupt::UART4);
    spawned(usbd, high.spawn(usbd_boot(p.USB, p.PA12, p.PA11, port, config)));

    // Ingress tier
    let cdc = descriptor(TaskRole::CdcIngress);
    interrupt::UART5.set_priority(nvic_priority(cdc));
    let medium = EXECUTOR_MEDIUM.start(interrupt::UART5);
    spawned(cdc, medium.spawn(cdc_task(port, channel, config)));

    // Consumer and heartbeat share thread mode
    spawned(
        descriptor(TaskRole::Consumer),
        spawner.spawn(cmd_recv_task(port, channel, config)),
    );
    spawned(descriptor(TaskRole::Heartbeat), spawner.spawn(hb_task(led, config)));
    info!("Tasks spawned, scheduler running");
}

/// Moves the pump onto its executor
///
/// The device stack is not `Send`, so it cannot cross from `main`; this
/// task re-spawns the pump from inside the high-priority executor.
#[embassy_executor::task]
async fn usbd_boot(
    usb: peripherals::USB,
    dp: peripherals::PA12,
    dm: peripherals::PA11,
    port: &'static RelayPort,
    config: RelayConfig,
) {
    let spawner = Spawner::for_current_executor().await;
    spawned(
        descriptor(TaskRole::UsbPump),
        spawner.spawn(usbd_task(usb, dp, dm, port, config)),
    );
}

/// USB device pump - owns the device stack for its whole life
#[embassy_executor::task]
async fn usbd_task(
    usb: peripherals::USB,
    dp: peripherals::PA12,
    dm: peripherals::PA11,
    port: &'static RelayPort,
    config: RelayConfig,
) {
    // Built here rather than in main: the USB interrupt needs the
    // executors to be running.
    let driver = Driver::new(usb, Irqs, dp, dm);
    let Some(resources) = USB_RESOURCES.try_init(UsbResources::new()) else {
        bootstrap::halt(BootError::UsbResourcesTaken);
    };
    let (mut device, stack) = device::build(driver, resources, port, config.pump_poll_window_us);

    let mut pump = UsbPump::new(stack, Delay, &config);
    match select(device.run(), pump.run(Budget::Unbounded)).await {
        Either::First(never) => never,
        Either::Second(Ok(state)) => defmt::panic!("usbd task stopped in {}", state),
        Either::Second(Err(e)) => bootstrap::halt(e.into()),
    }
}

/// CDC ingress - moves host bytes into the channel
#[embassy_executor::task]
async fn cdc_task(port: &'static RelayPort, channel: &'static RelayChannel, config: RelayConfig) {
    let mut ingress = IngressTask::new(port, channel, Delay, &config);
    let state = ingress.run(Budget::Unbounded).await;
    defmt::panic!("cdc task stopped in {}", state);
}

/// Consumer - echoes channel bytes back to the host
#[embassy_executor::task]
async fn cmd_recv_task(port: &'static RelayPort, channel: &'static RelayChannel, config: RelayConfig) {
    let mut echo = EchoTask::new(port, channel, Delay, &config);
    let stats = echo.run(Budget::Unbounded).await;
    defmt::panic!("cmdRecv task stopped after {} bytes", stats.echoed);
}

/// Heartbeat task - blinks LED to show system is running
#[embassy_executor::task]
async fn hb_task(led: Output<'static>, config: RelayConfig) {
    let mut heartbeat = Heartbeat::new(led, Delay, &config);
    let state = heartbeat.run(Budget::Unbounded).await;
    defmt::panic!("hb task stopped with LED {}", state);
}

fn clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::{mux, Hsi48Config};
        // USB runs from HSI48 trimmed by the host's SOF packets
        config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: true });
        config.rcc.mux.clk48sel = mux::Clk48sel::HSI48;
    }
    config
}

fn descriptor(role: TaskRole) -> &'static TaskDescriptor {
    match TASKS.iter().find(|t| t.role == role) {
        Some(task) => task,
        None => bootstrap::halt(BootError::Role(role)),
    }
}

/// NVIC priority of the interrupt executor a task runs on
fn nvic_priority(task: &TaskDescriptor) -> Priority {
    match task.tier().nvic_level() {
        Some(executors::HIGH_NVIC_PRIORITY) => Priority::P6,
        Some(executors::MEDIUM_NVIC_PRIORITY) => Priority::P7,
        _ => bootstrap::halt(BootError::NotInterruptTier(task.name)),
    }
}

fn spawned(task: &TaskDescriptor, result: Result<(), SpawnError>) {
    if result.is_err() {
        bootstrap::halt(BootError::Spawn(task.name));
    }
    info!("Spawned {=str} ({})", task.name, task.priority);
}
