//! Durations in config files are bare integers
//!
//! Use with `#[serde(with = "...")]`: `duration_secs` for timeouts,
//! `duration_millis` for retry and backoff delays.

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timings {
        #[serde(with = "super::duration_secs")]
        connect_timeout: Duration,
        #[serde(with = "super::duration_millis")]
        retry_delay: Duration,
    }

    #[test]
    fn test_toml_integers() {
        let timings: Timings = toml::from_str("connect_timeout = 45\nretry_delay = 750\n").unwrap();
        assert_eq!(timings.connect_timeout, Duration::from_secs(45));
        assert_eq!(timings.retry_delay, Duration::from_millis(750));

        let written = toml::to_string(&timings).unwrap();
        assert!(written.contains("connect_timeout = 45"));
        assert!(written.contains("retry_delay = 750"));
    }

    #[test]
    fn test_sub_second_truncated() {
        let timings = Timings {
            connect_timeout: Duration::from_millis(2_900),
            retry_delay: Duration::from_micros(1_500),
        };
        let json = serde_json::to_string(&timings).unwrap();
        assert_eq!(json, r#"{"connect_timeout":2,"retry_delay":1}"#);
    }
}
