/**
 * HEALTH - Runtime counters for the presence daemon
 *
 * ROLE: one cheap, cloneable tracker shared by the ingestion loop, the
 * command channel and the HTTP surface. Writers only touch atomics; the
 * link status string sits behind a short parking_lot lock.
 *
 * EXPOSED: `GET /system/health` serializes `KernelHealth`.
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::frame::DecoderStats;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub link_status: String,
    pub frames_decoded: u64,
    pub bytes_discarded: u64,
    pub bad_footers: u64,
    pub read_errors: u64,
    pub transitions: u64,
    pub commands_ok: u64,
    pub commands_failed: u64,
    pub memory_usage_mb: f32,
}

#[derive(Debug, Default)]
struct Counters {
    frames_decoded: AtomicU64,
    bytes_discarded: AtomicU64,
    bad_footers: AtomicU64,
    read_errors: AtomicU64,
    transitions: AtomicU64,
    commands_ok: AtomicU64,
    commands_failed: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
    link_status: Arc<parking_lot::Mutex<String>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            link_status: Arc::new(parking_lot::Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_link(&self, status: &str) {
        *self.link_status.lock() = status.to_string();
    }

    /// Mirrors the decoder's running totals.
    pub fn record_decoder(&self, stats: DecoderStats) {
        let c = &self.counters;
        c.frames_decoded.store(stats.frames_decoded, Ordering::Relaxed);
        c.bytes_discarded.store(stats.bytes_discarded, Ordering::Relaxed);
        c.bad_footers.store(stats.bad_footers, Ordering::Relaxed);
    }

    pub fn increment_read_errors(&self) {
        self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_transitions(&self, n: u64) {
        self.counters.transitions.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_command(&self, ok: bool) {
        let counter = if ok {
            &self.counters.commands_ok
        } else {
            &self.counters.commands_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self) -> KernelHealth {
        let c = &self.counters;
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            link_status: self.link_status.lock().clone(),
            frames_decoded: c.frames_decoded.load(Ordering::Relaxed),
            bytes_discarded: c.bytes_discarded.load(Ordering::Relaxed),
            bad_footers: c.bad_footers.load(Ordering::Relaxed),
            read_errors: c.read_errors.load(Ordering::Relaxed),
            transitions: c.transitions.load(Ordering::Relaxed),
            commands_ok: c.commands_ok.load(Ordering::Relaxed),
            commands_failed: c.commands_failed.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}
