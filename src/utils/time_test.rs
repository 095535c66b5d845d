use std::thread::sleep;
use std::time::Duration;

use crate::utils::time::get_duration_since_epoch;
use crate::utils::time::timestamp_millis;
use crate::utils::time::wait_param;

#[test]
fn test_timestamp_millis() {
    let t1 = timestamp_millis();
    sleep(Duration::from_millis(10));
    let t2 = timestamp_millis();

    // Ensure time is moving forward
    assert!(t2 > t1);
}

#[test]
fn test_get_duration_since_epoch() {
    let duration = get_duration_since_epoch();
    // Should be a reasonable value (somewhere between 1970 and now)
    assert!(duration.as_secs() > 1609459200); // Greater than 2021-01-01
}

#[test]
fn test_wait_param() {
    assert_eq!(wait_param(Duration::from_secs(20)), "20s");
    assert_eq!(wait_param(Duration::ZERO), "0s");
    assert_eq!(wait_param(Duration::from_millis(1500)), "1500ms");
}
