use crate::frame::DropReason;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct RconMetrics {
    frames_total: AtomicU64,
    bytes_total: AtomicU64,
    drops: [AtomicU64; DropReason::ALL.len()],
    commands_sent: AtomicU64,
    retransmits: AtomicU64,
    acks_sent: AtomicU64,
    heartbeats_sent: AtomicU64,
    send_timeouts: AtomicU64,
    reconnects: AtomicU64,
}

impl Default for RconMetrics {
    fn default() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
            drops: std::array::from_fn(|_| AtomicU64::new(0)),
            commands_sent: AtomicU64::new(0),
            retransmits: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
            heartbeats_sent: AtomicU64::new(0),
            send_timeouts: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }
}

impl RconMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, bytes: usize) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_drop(&self, reason: DropReason) {
        self.drops[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_command(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent.load(Ordering::Relaxed)
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits.load(Ordering::Relaxed)
    }

    pub fn acks_sent(&self) -> u64 {
        self.acks_sent.load(Ordering::Relaxed)
    }

    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }

    pub fn send_timeouts(&self) -> u64 {
        self.send_timeouts.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn drops_total(&self) -> u64 {
        self.drops.iter().map(|counter| counter.load(Ordering::Relaxed)).sum()
    }

    pub fn drops_snapshot(&self) -> Vec<(&'static str, u64)> {
        DropReason::ALL
            .iter()
            .map(|reason| (reason.as_str(), self.drops[reason.index()].load(Ordering::Relaxed)))
            .collect()
    }
}
