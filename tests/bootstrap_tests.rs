//! Scheduler Bootstrap Tests
//!
//! Tests for the task table, start-up validation and the mapping from
//! task priority to NVIC preemption.
//! Run with: cargo test --target x86_64-unknown-linux-gnu --no-default-features --features std --test bootstrap_tests

use cdc_relay_firmware::bootstrap::{
    halt, validate, BootError, ExecutorTier, TaskDescriptor, TaskRole, TASKS,
};
use cdc_relay_firmware::config::{executors, ConfigError};
use cdc_relay_firmware::types::{ChannelError, TaskPriority, UsbError};

fn task(name: &'static str) -> &'static TaskDescriptor {
    TASKS.iter().find(|t| t.name == name).unwrap()
}

// =============================================================================
// Task Table Tests
// =============================================================================

#[test]
fn firmware_task_table_is_valid() {
    assert_eq!(validate(&TASKS), Ok(()));
}

#[test]
fn task_names_and_priorities() {
    assert_eq!(task("hb").priority, TaskPriority::new(1));
    assert_eq!(task("usbd").priority, TaskPriority::new(3));
    assert_eq!(task("cdc").priority, TaskPriority::new(2));
    assert_eq!(task("cmdRecv").priority, TaskPriority::new(1));
}

#[test]
fn every_role_present_once() {
    for role in TaskRole::ALL {
        assert_eq!(TASKS.iter().filter(|t| t.role == role).count(), 1);
    }
}

#[test]
fn tiers_follow_priority() {
    assert_eq!(task("usbd").tier(), ExecutorTier::InterruptHigh);
    assert_eq!(task("cdc").tier(), ExecutorTier::InterruptMedium);
    assert_eq!(task("cmdRecv").tier(), ExecutorTier::Thread);
    assert_eq!(task("hb").tier(), ExecutorTier::Thread);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn ingress_outranking_pump_rejected() {
    let mut tasks = TASKS;
    tasks[1].priority = TaskPriority::MEDIUM;
    tasks[2].priority = TaskPriority::HIGH;
    assert_eq!(
        validate(&tasks),
        Err(BootError::PriorityOrder {
            higher: "usbd",
            lower: "cdc"
        })
    );
}

#[test]
fn consumer_equal_to_ingress_rejected() {
    let mut tasks = TASKS;
    tasks[3].priority = TaskPriority::MEDIUM;
    assert_eq!(
        validate(&tasks),
        Err(BootError::PriorityOrder {
            higher: "cdc",
            lower: "cmdRecv"
        })
    );
}

#[test]
fn duplicate_name_rejected() {
    let mut tasks = TASKS;
    tasks[3].name = "hb";
    assert_eq!(validate(&tasks), Err(BootError::DuplicateName("hb")));
}

#[test]
fn missing_role_rejected() {
    let tasks = &TASKS[..3];
    assert_eq!(validate(tasks), Err(BootError::Role(TaskRole::Consumer)));
}

#[test]
fn repeated_role_rejected() {
    let mut tasks = TASKS;
    tasks[0].role = TaskRole::Consumer;
    assert_eq!(validate(&tasks), Err(BootError::Role(TaskRole::Heartbeat)));
}

// =============================================================================
// Preemption Tests
// =============================================================================

fn nvic(name: &'static str) -> Option<u8> {
    task(name).tier().nvic_level()
}

#[test]
fn interrupt_tiers_use_configured_nvic_levels() {
    assert_eq!(nvic("usbd"), Some(executors::HIGH_NVIC_PRIORITY));
    assert_eq!(nvic("cdc"), Some(executors::MEDIUM_NVIC_PRIORITY));
}

#[test]
fn pump_has_more_urgent_nvic_level_than_ingress() {
    let (Some(pump), Some(ingress)) = (nvic("usbd"), nvic("cdc")) else {
        panic!("pump and ingress must run on interrupt executors");
    };
    // Lower NVIC number preempts
    assert!(pump < ingress);
}

#[test]
fn consumer_and_heartbeat_have_no_nvic_level() {
    assert_eq!(nvic("cmdRecv"), None);
    assert_eq!(nvic("hb"), None);
}

#[test]
fn preemption_order_pump_ingress_consumer() {
    let pump = task("usbd").tier();
    let ingress = task("cdc").tier();
    let consumer = task("cmdRecv").tier();
    let heartbeat = task("hb").tier();

    assert!(pump.preempts(ingress));
    assert!(pump.preempts(consumer));
    assert!(ingress.preempts(consumer));
    assert!(ingress.preempts(heartbeat));

    assert!(!ingress.preempts(pump));
    assert!(!consumer.preempts(ingress));
    assert!(!consumer.preempts(pump));
}

#[test]
fn tier_never_preempts_itself() {
    for tier in [
        ExecutorTier::InterruptHigh,
        ExecutorTier::InterruptMedium,
        ExecutorTier::Thread,
    ] {
        assert!(!tier.preempts(tier), "{tier:?}");
    }
}

#[test]
fn every_task_tier_preempts_in_priority_order() {
    for a in &TASKS {
        for b in &TASKS {
            if a.priority > b.priority {
                assert!(a.tier().preempts(b.tier()), "{} over {}", a.name, b.name);
            }
        }
    }
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn boot_errors_convert() {
    assert_eq!(
        BootError::from(ChannelError::ZeroCapacity),
        BootError::Channel(ChannelError::ZeroCapacity)
    );
    assert_eq!(
        BootError::from(ConfigError::ChunkSize(0)),
        BootError::Config(ConfigError::ChunkSize(0))
    );
    assert_eq!(
        BootError::from(UsbError::InitFailed),
        BootError::Usb(UsbError::InitFailed)
    );
}

#[test]
fn boot_errors_display() {
    assert_eq!(
        BootError::Spawn("cdc").to_string(),
        "failed to spawn task cdc"
    );
    assert_eq!(
        BootError::Usb(UsbError::InitFailed).to_string(),
        "usb: device stack init failed"
    );
}

#[test]
fn static_allocation_errors_are_distinct_from_spawn() {
    assert_eq!(
        BootError::UsbResourcesTaken.to_string(),
        "usb descriptor buffers already allocated"
    );
    assert_ne!(BootError::UsbResourcesTaken, BootError::Spawn("usbd"));
    assert_ne!(BootError::UsbResourcesTaken, BootError::ChannelTaken);
}

#[test]
fn thread_task_has_no_interrupt_executor() {
    assert_eq!(
        BootError::NotInterruptTier("cmdRecv").to_string(),
        "task cmdRecv has no interrupt executor"
    );
}

#[test]
#[should_panic(expected = "boot failed")]
fn halt_never_returns() {
    halt(BootError::ChannelTaken);
}
