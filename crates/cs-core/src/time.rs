//! Wall clock in milliseconds, used for heartbeat timestamps and idle checks

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is behind it
pub fn unix_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}

/// How long ago `stamp` (from [`unix_millis`]) was. Stamps in the future count as now.
pub fn millis_since(stamp: u64) -> u64 {
    unix_millis().saturating_sub(stamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_millis_since_past_stamp() {
        let stamp = unix_millis();
        std::thread::sleep(Duration::from_millis(15));
        assert!(millis_since(stamp) >= 15);
    }

    #[test]
    fn test_millis_since_future_stamp() {
        assert_eq!(millis_since(unix_millis() + 60_000), 0);
    }
}
