//! Serde helpers for the backend's timestamps.
//!
//! The API emits RFC 3339 timestamps for some fields and offset-less local date-times
//! (`2024-05-01T12:30:00.123`) for others.  Both are accepted; offset-less values are taken to
//! be UTC.  Serialization always produces RFC 3339.

use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parse either an RFC 3339 timestamp or an offset-less local date-time assumed to be UTC.
pub fn parse(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    match OffsetDateTime::parse(s, &Rfc3339) {
        Ok(datetime) => Ok(datetime),
        Err(_) => {
            let local = PrimitiveDateTime::parse(
                s,
                format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
                ),
            )?;
            Ok(local.assume_utc())
        }
    }
}

/// Deserialize a timestamp string into an OffsetDateTime.
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string.
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// The same conversions for optional fields.
pub mod option {
    use super::*;

    /// Deserialize an optional timestamp; `null` and a missing field both become `None`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }

    /// Serialize an optional timestamp as RFC 3339 or `null`.
    pub fn serialize<S>(datetime: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match datetime {
            Some(datetime) => super::serialize(datetime, serializer),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_rfc3339() {
        assert_eq!(
            parse("2024-05-01T12:30:00+02:00").unwrap(),
            datetime!(2024-05-01 10:30:00 UTC)
        );
    }

    #[test]
    fn parses_local_datetime_as_utc() {
        assert_eq!(
            parse("2024-05-01T12:30:00").unwrap(),
            datetime!(2024-05-01 12:30:00 UTC)
        );
        assert_eq!(
            parse("2024-05-01T12:30:00.250").unwrap(),
            datetime!(2024-05-01 12:30:00.25 UTC)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("yesterday").is_err());
    }
}
