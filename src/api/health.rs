//! Shared health state for the /health endpoint.
//! Updated by the uplink handler and RegistryWriter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared health metrics. Updated by core components, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// Reports applied to the registry (inserted or replaced).
    pub reports_received: AtomicU64,
    /// Reports rejected as malformed.
    pub reports_rejected: AtomicU64,
    /// Reports dropped as older than the stored row.
    pub reports_ignored_stale: AtomicU64,
    /// Approximate count of records queued for DB write.
    pub write_queue_pending: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_reports_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reports_rejected(&self) {
        self.reports_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reports_ignored_stale(&self) {
        self.reports_ignored_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_queue_pending(&self) {
        self.write_queue_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_write_queue_pending(&self) {
        self.write_queue_pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn reports_received(&self) -> u64 {
        self.reports_received.load(Ordering::Relaxed)
    }

    pub fn reports_rejected(&self) -> u64 {
        self.reports_rejected.load(Ordering::Relaxed)
    }

    pub fn reports_ignored_stale(&self) -> u64 {
        self.reports_ignored_stale.load(Ordering::Relaxed)
    }

    pub fn write_queue_pending(&self) -> u64 {
        self.write_queue_pending.load(Ordering::Relaxed)
    }
}
