use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Counts failed logins per client address in a fixed window.
///
/// Once an address reaches `max_failures` inside the window it is locked out
/// until the window started by its first failure has passed.
pub struct LoginThrottle {
    failures: DashMap<IpAddr, (AtomicU32, AtomicI64)>,
    max_failures: u32,
    window_secs: i64,
}

impl LoginThrottle {
    pub fn new(max_failures: u32, window_secs: u64) -> Self {
        Self {
            failures: DashMap::new(),
            max_failures,
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn is_locked(&self, ip: IpAddr, current_time: i64) -> bool {
        match self.failures.get(&ip) {
            Some(entry) => {
                let (count, window_start) = entry.value();
                current_time - window_start.load(Ordering::Relaxed) < self.window_secs
                    && count.load(Ordering::Relaxed) >= self.max_failures
            }
            None => false,
        }
    }

    /// Record a failed attempt. Returns the failure count in the current window.
    pub fn record_failure(&self, ip: IpAddr, current_time: i64) -> u32 {
        let entry = self
            .failures
            .entry(ip)
            .or_insert_with(|| (AtomicU32::new(0), AtomicI64::new(current_time)));

        let (count, window_start) = entry.value();
        if current_time - window_start.load(Ordering::Relaxed) >= self.window_secs {
            window_start.store(current_time, Ordering::Relaxed);
            count.store(1, Ordering::Relaxed);
            return 1;
        }

        count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Forget an address after a successful login
    pub fn reset(&self, ip: IpAddr) {
        self.failures.remove(&ip);
    }

    pub fn cleanup_old_entries(&self, current_time: i64) {
        let window = self.window_secs;
        self.failures.retain(|_, (_, window_start)| {
            current_time - window_start.load(Ordering::Relaxed) < window
        });
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}
