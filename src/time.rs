//! Expiry timestamps for versioned content.
//!
//! Seed packs and flows may carry a `deprecated_after` timestamp. Once the
//! reference time passes it, the content must not be used.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContentError;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses an ISO-8601 timestamp.
///
/// Accepts a trailing `Z`, explicit offsets, naive date-times and bare dates.
/// Naive values are interpreted as UTC; bare dates as midnight UTC.
///
/// # Errors
///
/// Returns `ContentError::InvalidTimestamp` if no accepted form matches.
///
/// # Examples
///
/// ```
/// use lessonflow::time::parse_timestamp;
///
/// let zulu = parse_timestamp("2030-01-01T00:00:00Z").unwrap();
/// let naive = parse_timestamp("2030-01-01T00:00:00").unwrap();
/// assert_eq!(zulu, naive);
/// ```
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ContentError> {
    let value = raw.trim();
    let invalid = || ContentError::InvalidTimestamp {
        value: raw.to_string(),
    };
    if value.is_empty() {
        return Err(invalid());
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // RFC 3339 requires the `T`; ISO-8601 readers commonly accept a space.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value.replacen(' ', "T", 1)) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(midnight.and_utc());
    }

    Err(invalid())
}

/// Optional end-of-life timestamp carried by versioned content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expiry(Option<DateTime<Utc>>);

impl Expiry {
    /// Content that never expires.
    #[must_use]
    pub const fn never() -> Self {
        Self(None)
    }

    /// Content that expires after `at`.
    #[must_use]
    pub const fn at(at: DateTime<Utc>) -> Self {
        Self(Some(at))
    }

    /// Parses an optional raw `deprecated_after` value.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::InvalidTimestamp` for unparseable text.
    pub fn parse(raw: Option<&str>) -> Result<Self, ContentError> {
        match raw {
            Some(raw) if !raw.trim().is_empty() => parse_timestamp(raw).map(Self::at),
            _ => Ok(Self::never()),
        }
    }

    /// The expiry instant, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Check whether `reference` is strictly after the deadline.
    #[must_use]
    pub fn is_expired_at(&self, reference: DateTime<Utc>) -> bool {
        self.0.is_some_and(|deadline| reference > deadline)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(deadline) => write!(f, "{}", deadline.to_rfc3339()),
            None => write!(f, "never"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_zulu_and_offset() {
        let zulu = parse_timestamp("2025-06-01T12:00:00Z").unwrap();
        let offset = parse_timestamp("2025-06-01T14:00:00+02:00").unwrap();
        assert_eq!(zulu, offset);
        assert_eq!(zulu, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let naive = parse_timestamp("2025-06-01T12:00:00").unwrap();
        assert_eq!(naive, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());

        let spaced = parse_timestamp("2025-06-01 12:00:00.250").unwrap();
        assert_eq!(spaced.timestamp_millis() % 1000, 250);
    }

    #[test]
    fn test_parse_bare_date() {
        let date = parse_timestamp("2025-06-01").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_timestamp("next tuesday").unwrap_err();
        assert!(matches!(err, ContentError::InvalidTimestamp { .. }));
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let deadline = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let expiry = Expiry::at(deadline);
        assert!(!expiry.is_expired_at(deadline));
        assert!(expiry.is_expired_at(deadline + Duration::seconds(1)));
        assert!(!Expiry::never().is_expired_at(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_expiry_parse_absent() {
        assert_eq!(Expiry::parse(None).unwrap(), Expiry::never());
        assert_eq!(Expiry::parse(Some("  ")).unwrap(), Expiry::never());
    }
}
