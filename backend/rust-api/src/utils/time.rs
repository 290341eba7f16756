use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// BSON dates carry millisecond precision; sub-millisecond parts are dropped.
pub fn chrono_to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

/// Whole seconds between two instants, zero when `end` precedes `start`.
pub fn elapsed_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_seconds()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn elapsed_never_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_seconds(now, now + Duration::seconds(95)), 95);
        assert_eq!(elapsed_seconds(now, now - Duration::seconds(5)), 0);
    }

    #[test]
    fn bson_conversion_keeps_millis() {
        let now = Utc::now();
        assert_eq!(chrono_to_bson(now).timestamp_millis(), now.timestamp_millis());
    }
}
