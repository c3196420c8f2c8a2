//! Timestamp format shared by ledgers and cache.
//!
//! Timestamps are UTC with microsecond precision, written as RFC 3339 with
//! exactly six fractional digits and a `Z` suffix, e.g.
//! `2026-10-18T09:30:00.000000Z`. The fixed width keeps textual order equal
//! to chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Returns the current time at the stored precision.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp in the stored format.
#[must_use]
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses any RFC 3339 timestamp into UTC.
pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serializes in the stored format.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(ts))
    }

    /// Deserializes any RFC 3339 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse(&s).map_err(D::Error::custom)
    }

    /// Serde adapter for `Option<DateTime<Utc>>` fields.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        /// Serializes `None` as `null`.
        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::super::format(ts)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes `null` or an RFC 3339 string.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) if !s.is_empty() => super::super::parse(&s).map(Some).map_err(D::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
