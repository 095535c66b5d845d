use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub(crate) fn get_duration_since_epoch() -> Duration {
    // a clock before 1970 reads as the epoch itself
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// return millisecond
pub(crate) fn timestamp_millis() -> u64 {
    get_duration_since_epoch().as_millis() as u64
}

/// Render a duration the way blocking queries expect it, e.g. `20s` or `1500ms`
pub(crate) fn wait_param(wait: Duration) -> String {
    if wait.subsec_millis() == 0 {
        format!("{}s", wait.as_secs())
    } else {
        format!("{}ms", wait.as_millis())
    }
}
