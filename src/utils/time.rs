use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;

/// Deserialize unix milliseconds into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = i64::deserialize(deserializer)?;
    from_unix_millis(millis).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime as unix milliseconds
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(unix_millis(datetime))
}

/// Milliseconds since the unix epoch, truncated toward zero.
pub fn unix_millis(datetime: &OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Inverse of [`unix_millis`].
pub fn from_unix_millis(millis: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
}

/// The current UTC time at the millisecond precision kept in storage.
pub fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn millis_round_trip() {
        let when = datetime!(2024-05-01 12:30:45.123 UTC);
        let millis = unix_millis(&when);
        assert_eq!(millis, 1_714_566_645_123);
        assert_eq!(from_unix_millis(millis).unwrap(), when);
    }

    #[test]
    fn sub_millisecond_precision_is_dropped() {
        let when = datetime!(2024-05-01 12:30:45.123456 UTC);
        assert_eq!(unix_millis(&when), 1_714_566_645_123);
    }

    #[test]
    fn now_has_no_sub_millisecond_part() {
        let now = now_millis();
        assert_eq!(now.nanosecond() % 1_000_000, 0);
        assert_eq!(from_unix_millis(unix_millis(&now)).unwrap(), now);
    }
}
