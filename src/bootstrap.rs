//! Scheduler Bootstrap
//!
//! The static task table and the rules the firmware's `main` enforces
//! before starting the executors: priority ordering, one task per role,
//! unique names. Any violation, and any failure to allocate static storage
//! or spawn a task, is fatal.
//!
//! | Task      | Role       | Priority | Executor                |
//! |-----------|------------|----------|-------------------------|
//! | `usbd`    | USB pump   | 3        | interrupt (`UART4`, P6) |
//! | `cdc`     | ingress    | 2        | interrupt (`UART5`, P7) |
//! | `cmdRecv` | consumer   | 1        | thread mode             |
//! | `hb`      | heartbeat  | 1        | thread mode             |

use core::fmt;

use crate::config::{
    executors, ConfigError, CONSUMER_PRIORITY, HEARTBEAT_PRIORITY, INGRESS_PRIORITY,
    PUMP_PRIORITY,
};
use crate::types::{ChannelError, TaskPriority, UsbError};

/// What a task does
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskRole {
    /// Status LED blinker
    Heartbeat,
    /// USB device pump
    UsbPump,
    /// CDC ingress
    CdcIngress,
    /// Channel consumer / echo
    Consumer,
}

impl TaskRole {
    /// Every role the firmware must run
    pub const ALL: [Self; 4] = [Self::Heartbeat, Self::UsbPump, Self::CdcIngress, Self::Consumer];
}

#[cfg(feature = "embedded")]
impl defmt::Format for TaskRole {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Heartbeat => defmt::write!(f, "heartbeat"),
            Self::UsbPump => defmt::write!(f, "usb-pump"),
            Self::CdcIngress => defmt::write!(f, "cdc-ingress"),
            Self::Consumer => defmt::write!(f, "consumer"),
        }
    }
}

/// Executor a priority tier runs on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorTier {
    /// Interrupt executor with the most urgent NVIC priority
    InterruptHigh,
    /// Interrupt executor preempting thread mode
    InterruptMedium,
    /// Thread-mode executor
    Thread,
}

impl ExecutorTier {
    /// Tier for a task priority
    #[must_use]
    pub const fn for_priority(priority: TaskPriority) -> Self {
        if priority.level() >= PUMP_PRIORITY.level() {
            Self::InterruptHigh
        } else if priority.level() >= INGRESS_PRIORITY.level() {
            Self::InterruptMedium
        } else {
            Self::Thread
        }
    }

    /// NVIC priority of the interrupt backing this tier
    ///
    /// Thread mode has none: every enabled interrupt preempts it.
    #[must_use]
    pub const fn nvic_level(self) -> Option<u8> {
        match self {
            Self::InterruptHigh => Some(executors::HIGH_NVIC_PRIORITY),
            Self::InterruptMedium => Some(executors::MEDIUM_NVIC_PRIORITY),
            Self::Thread => None,
        }
    }

    /// Whether work on this tier interrupts work on `other`
    #[must_use]
    pub const fn preempts(self, other: Self) -> bool {
        match (self.nvic_level(), other.nvic_level()) {
            (Some(mine), Some(theirs)) => mine < theirs,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Static description of one task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Task name
    pub name: &'static str,
    /// What it does
    pub role: TaskRole,
    /// Fixed priority
    pub priority: TaskPriority,
}

impl TaskDescriptor {
    /// Describe a task
    #[must_use]
    pub const fn new(name: &'static str, role: TaskRole, priority: TaskPriority) -> Self {
        Self {
            name,
            role,
            priority,
        }
    }

    /// Executor this task is spawned on
    #[must_use]
    pub const fn tier(&self) -> ExecutorTier {
        ExecutorTier::for_priority(self.priority)
    }
}

/// The firmware's task set
pub static TASKS: [TaskDescriptor; 4] = [
    TaskDescriptor::new("hb", TaskRole::Heartbeat, HEARTBEAT_PRIORITY),
    TaskDescriptor::new("usbd", TaskRole::UsbPump, PUMP_PRIORITY),
    TaskDescriptor::new("cdc", TaskRole::CdcIngress, INGRESS_PRIORITY),
    TaskDescriptor::new("cmdRecv", TaskRole::Consumer, CONSUMER_PRIORITY),
];

/// Fatal start-up failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    /// Byte channel could not be created
    Channel(ChannelError),
    /// Channel storage was already taken
    ChannelTaken,
    /// USB descriptor buffers were already taken
    UsbResourcesTaken,
    /// Relay configuration rejected
    Config(ConfigError),
    /// Task could not be spawned
    Spawn(&'static str),
    /// Task needs an interrupt executor but sits in thread mode
    NotInterruptTier(&'static str),
    /// Task table breaks the priority ordering
    PriorityOrder {
        /// Task that must be more urgent
        higher: &'static str,
        /// Task that must be less urgent
        lower: &'static str,
    },
    /// Two tasks share a name
    DuplicateName(&'static str),
    /// A role is missing or appears twice
    Role(TaskRole),
    /// USB device stack failed
    Usb(UsbError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "byte channel: {e}"),
            Self::ChannelTaken => f.write_str("byte channel already allocated"),
            Self::UsbResourcesTaken => f.write_str("usb descriptor buffers already allocated"),
            Self::Config(e) => write!(f, "config: {e:?}"),
            Self::Spawn(name) => write!(f, "failed to spawn task {name}"),
            Self::NotInterruptTier(name) => write!(f, "task {name} has no interrupt executor"),
            Self::PriorityOrder { higher, lower } => {
                write!(f, "task {higher} must outrank {lower}")
            }
            Self::DuplicateName(name) => write!(f, "duplicate task name {name}"),
            Self::Role(role) => write!(f, "task table must hold exactly one {role:?}"),
            Self::Usb(e) => write!(f, "usb: {e}"),
        }
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for BootError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Channel(e) => defmt::write!(f, "Channel({})", e),
            Self::ChannelTaken => defmt::write!(f, "ChannelTaken"),
            Self::UsbResourcesTaken => defmt::write!(f, "UsbResourcesTaken"),
            Self::Config(e) => defmt::write!(f, "Config({})", e),
            Self::Spawn(name) => defmt::write!(f, "Spawn({=str})", name),
            Self::NotInterruptTier(name) => defmt::write!(f, "NotInterruptTier({=str})", name),
            Self::PriorityOrder { higher, lower } => {
                defmt::write!(f, "PriorityOrder({=str}>{=str})", higher, lower);
            }
            Self::DuplicateName(name) => defmt::write!(f, "DuplicateName({=str})", name),
            Self::Role(role) => defmt::write!(f, "Role({})", role),
            Self::Usb(e) => defmt::write!(f, "Usb({})", e),
        }
    }
}

impl From<ChannelError> for BootError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<ConfigError> for BootError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<UsbError> for BootError {
    fn from(e: UsbError) -> Self {
        Self::Usb(e)
    }
}

/// Check a task table before anything is spawned
///
/// Every role must appear exactly once, names must be unique, and the
/// pump must outrank ingress, which must outrank the consumer and the
/// heartbeat.
pub fn validate(tasks: &[TaskDescriptor]) -> Result<(), BootError> {
    for role in TaskRole::ALL {
        if tasks.iter().filter(|t| t.role == role).count() != 1 {
            return Err(BootError::Role(role));
        }
    }

    for (i, a) in tasks.iter().enumerate() {
        if tasks[i + 1..].iter().any(|b| b.name == a.name) {
            return Err(BootError::DuplicateName(a.name));
        }
    }

    let find = |role| tasks.iter().find(|t| t.role == role);
    let (Some(pump), Some(ingress), Some(consumer), Some(heartbeat)) = (
        find(TaskRole::UsbPump),
        find(TaskRole::CdcIngress),
        find(TaskRole::Consumer),
        find(TaskRole::Heartbeat),
    ) else {
        return Err(BootError::Role(TaskRole::UsbPump));
    };

    let ordering = [(pump, ingress), (ingress, consumer), (ingress, heartbeat)];
    for (higher, lower) in ordering {
        if higher.priority <= lower.priority {
            return Err(BootError::PriorityOrder {
                higher: higher.name,
                lower: lower.name,
            });
        }
    }
    Ok(())
}

/// Stop the system after a fatal start-up failure
///
/// A relay with no channel or a missing task has no valid behavior, so
/// there is no degraded mode.
pub fn halt(err: BootError) -> ! {
    error!("boot failed: {}", err);
    panic!("boot failed: {:?}", err)
}
