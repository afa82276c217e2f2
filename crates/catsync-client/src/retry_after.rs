//! `Retry-After` header parsing
//!
//! The catalog service sends `Retry-After` with rate-limit (429) and
//! overload (503) responses, either as delay seconds or as an HTTP date.

use std::time::Duration;

use tracing::warn;

/// Longest wait honoured from an HTTP-date `Retry-After`
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Parses a `Retry-After` value into a wait duration
///
/// Accepts integer seconds (`"30"`) or an RFC 2822 HTTP date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Dates in the past, dates more than
/// an hour ahead and unparseable values yield `default`.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Some(secs) = u64::try_from(wait.num_seconds())
            .ok()
            .filter(|&s| s > 0 && s <= MAX_RETRY_AFTER_SECS)
        {
            return Duration::from_secs(secs);
        }
    }

    warn!(value, "Could not use Retry-After header, falling back to default");
    default
}
