pub mod certificate;
pub mod course;
pub mod order;
pub mod progress;
pub mod quiz;
pub mod quiz_attempt;
pub mod user;

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime.
// Persisted documents go through these; response views carry plain chrono values.
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bson::DateTime::from_millis(date.timestamp_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("datetime out of range"))
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&bson::DateTime::from_millis(d.timestamp_millis())),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        opt_bson_dt
            .map(|dt| {
                DateTime::from_timestamp_millis(dt.timestamp_millis())
                    .ok_or_else(|| D::Error::custom("datetime out of range"))
            })
            .transpose()
    }
}

/// Fresh document identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use mongodb::bson::{self, Bson};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "super::bson_datetime_as_chrono")]
        at: chrono::DateTime<Utc>,
        #[serde(default, with = "super::bson_datetime_as_chrono_option")]
        maybe: Option<chrono::DateTime<Utc>>,
    }

    #[test]
    fn datetimes_are_stored_as_bson_dates() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let value = Stamped { at, maybe: None };
        let doc = bson::to_document(&value).unwrap();
        assert!(matches!(doc.get("at"), Some(Bson::DateTime(_))));

        let back: Stamped = bson::from_document(doc).unwrap();
        assert_eq!(back, value);
    }
}
