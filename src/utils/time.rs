use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall clock in milliseconds since the epoch, `0` if the clock is before it.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Milliseconds as carried in handshake fields, saturating at `i32::MAX`.
pub(crate) fn duration_to_ms_i32(d: Duration) -> i32 {
    d.as_millis().min(i32::MAX as u128) as i32
}

/// Inverse of [`duration_to_ms_i32`]; negative values become zero.
pub(crate) fn ms_i32_to_duration(ms: i32) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
