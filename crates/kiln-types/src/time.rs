use std::time::{SystemTime, UNIX_EPOCH};

/// Logical change timestamp: milliseconds since the Unix epoch at write
/// time. Only used to break ties between changes sharing a key and
/// platform; the change log is not required to be time-sorted.
pub type Tick = u64;

/// Current wall-clock tick.
pub fn tick_now() -> Tick {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
