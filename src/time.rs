use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. All registry timestamps use this unit.
pub type UnixMillis = u64;

pub fn now_ms() -> UnixMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
