use crate::access::reconciler::ReconcileReport;
use crate::utils::time::current_timestamp;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    pub authorized_requests: AtomicU64,
    pub denied_requests: AtomicU64,
    pub unauthenticated_requests: AtomicU64,
    pub successful_logins: AtomicU64,
    pub failed_logins: AtomicU64,
    pub throttled_logins: AtomicU64,
    pub reconciliations: AtomicU64,
    pub grants_inserted: AtomicU64,
    pub grants_deleted: AtomicU64,
    pub grant_conflicts: AtomicU64,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub authorized_requests: u64,
    pub denied_requests: u64,
    pub unauthenticated_requests: u64,
    pub deny_rate: f64,
    pub successful_logins: u64,
    pub failed_logins: u64,
    pub throttled_logins: u64,
    pub reconciliations: u64,
    pub grants_inserted: u64,
    pub grants_deleted: u64,
    pub grant_conflicts: u64,
    pub registered_users: usize,
    pub stored_grants: usize,
    pub active_tokens: usize,
    pub uptime_seconds: i64,
}

/// Gauges read from the stores at snapshot time
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreGauges {
    pub users: usize,
    pub grants: usize,
    pub tokens: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            authorized_requests: AtomicU64::new(0),
            denied_requests: AtomicU64::new(0),
            unauthenticated_requests: AtomicU64::new(0),
            successful_logins: AtomicU64::new(0),
            failed_logins: AtomicU64::new(0),
            throttled_logins: AtomicU64::new(0),
            reconciliations: AtomicU64::new(0),
            grants_inserted: AtomicU64::new(0),
            grants_deleted: AtomicU64::new(0),
            grant_conflicts: AtomicU64::new(0),
            start_time: current_timestamp(),
        }
    }

    pub fn increment_authorized(&self) {
        self.authorized_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.denied_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unauthenticated(&self) {
        self.unauthenticated_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_logins(&self) {
        self.successful_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_logins(&self) {
        self.failed_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_throttled(&self) {
        self.throttled_logins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicts(&self) {
        self.grant_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconcile(&self, report: &ReconcileReport) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
        self.grants_inserted
            .fetch_add(report.inserted as u64, Ordering::Relaxed);
        self.grants_deleted
            .fetch_add(report.deleted as u64, Ordering::Relaxed);
    }

    /// Counters plus derived values such as the deny rate and uptime.
    pub fn get_snapshot(&self, gauges: StoreGauges) -> MetricsSnapshot {
        let authorized_requests = self.authorized_requests.load(Ordering::Relaxed);
        let denied_requests = self.denied_requests.load(Ordering::Relaxed);
        let unauthenticated_requests = self.unauthenticated_requests.load(Ordering::Relaxed);

        // Share of guarded requests that were turned away
        let guarded = authorized_requests + denied_requests + unauthenticated_requests;
        let deny_rate = if guarded > 0 {
            ((denied_requests + unauthenticated_requests) as f64 / guarded as f64) * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            authorized_requests,
            denied_requests,
            unauthenticated_requests,
            deny_rate,
            successful_logins: self.successful_logins.load(Ordering::Relaxed),
            failed_logins: self.failed_logins.load(Ordering::Relaxed),
            throttled_logins: self.throttled_logins.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            grants_inserted: self.grants_inserted.load(Ordering::Relaxed),
            grants_deleted: self.grants_deleted.load(Ordering::Relaxed),
            grant_conflicts: self.grant_conflicts.load(Ordering::Relaxed),
            registered_users: gauges.users,
            stored_grants: gauges.grants,
            active_tokens: gauges.tokens,
            uptime_seconds: current_timestamp() - self.start_time,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
