//! Replay protection
//!
//! Checks the signing time (`Date` header or `(created)` parameter) against
//! an explicit "now". The clock is injected so tests can pin time.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("missing")]
    Missing,

    #[error("not RFC 2616 compliant date: {0:?}")]
    Invalid(String),

    #[error("not valid ASCII")]
    NotAscii,

    #[error("Signed request date outside acceptable time window")]
    OutOfWindow,
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Accepted HTTP-date layouts once the weekday token is stripped:
/// IMF-fixdate, RFC 850 and asctime.
const HTTP_DATE_FORMATS: [&str; 3] = [
    "%d %b %Y %H:%M:%S GMT",
    "%d-%b-%y %H:%M:%S GMT",
    "%b %d %H:%M:%S %Y",
];

/// Parse an RFC 2616 HTTP-date.
///
/// The weekday name is required but not cross-checked against the date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let (weekday, rest) = normalized.split_once(' ')?;
    let weekday = weekday.trim_end_matches(',');
    if weekday.is_empty() || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    HTTP_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(rest, format).ok())
        .map(|naive| naive.and_utc())
}

/// Freshness window check
#[derive(Debug, Clone, Copy)]
pub struct FreshnessGuard {
    window: Duration,
}

impl FreshnessGuard {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Check a `Date` header value
    pub fn check(&self, date_header: Option<&str>, now: DateTime<Utc>) -> Result<(), DateError> {
        let raw = date_header.ok_or(DateError::Missing)?;
        let date = parse_http_date(raw).ok_or_else(|| DateError::Invalid(raw.to_string()))?;
        self.check_instant(date, now)
    }

    /// Check hs2019 `created`/`expires` parameters (unix seconds)
    pub fn check_created(
        &self,
        created: i64,
        expires: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), DateError> {
        let created = Utc
            .timestamp_opt(created, 0)
            .single()
            .ok_or_else(|| DateError::Invalid(created.to_string()))?;
        self.check_instant(created, now)?;

        if let Some(expires) = expires {
            let expires = Utc
                .timestamp_opt(expires, 0)
                .single()
                .ok_or_else(|| DateError::Invalid(expires.to_string()))?;
            if expires < now {
                return Err(DateError::OutOfWindow);
            }
        }

        Ok(())
    }

    fn check_instant(&self, signed_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), DateError> {
        if (now - signed_at).abs() > self.window {
            return Err(DateError::OutOfWindow);
        }
        Ok(())
    }
}
