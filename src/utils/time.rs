use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// True once more than `ttl` seconds have passed since `issued_at`.
/// A `None` ttl never expires.
pub fn is_expired(issued_at: i64, ttl: Option<u64>, now: i64) -> bool {
    match ttl {
        Some(ttl) => now.saturating_sub(issued_at) > i64::try_from(ttl).unwrap_or(i64::MAX),
        None => false,
    }
}
