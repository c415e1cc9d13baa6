use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub events: u64,
    pub liveness_failures: u64,
    pub connections_lost: u64,
    pub reconnects: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_SUCCESS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static EVENTS: AtomicU64 = AtomicU64::new(0);
static LIVENESS_FAILURES: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_LOST: AtomicU64 = AtomicU64::new(0);
static RECONNECTS: AtomicU64 = AtomicU64::new(0);

pub fn record_command() {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_command_success(duration: Duration) {
    COMMAND_SUCCESS.fetch_add(1, Ordering::Relaxed);
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
}

pub fn record_command_failure() {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_event() {
    EVENTS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_liveness_failure() {
    LIVENESS_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_lost() {
    CONNECTIONS_LOST.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reconnect() {
    RECONNECTS.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_success: COMMAND_SUCCESS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        events: EVENTS.load(Ordering::Relaxed),
        liveness_failures: LIVENESS_FAILURES.load(Ordering::Relaxed),
        connections_lost: CONNECTIONS_LOST.load(Ordering::Relaxed),
        reconnects: RECONNECTS.load(Ordering::Relaxed),
    }
}
