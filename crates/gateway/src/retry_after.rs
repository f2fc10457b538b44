//! Parsing header `Retry-After` dari response 429.
//!
//! Dua bentuk yang diterima:
//! - delay-seconds: integer non-negatif (`"120"`)
//! - HTTP-date dalam tiga format RFC 9110:
//!   - IMF-fixdate: `"Sun, 06 Nov 1994 08:49:37 GMT"`
//!   - RFC 850 (obsolete): `"Sunday, 06-Nov-94 08:49:37 GMT"`
//!   - asctime (obsolete): `"Sun Nov  6 08:49:37 1994"`
//!
//! Nilai lain (negatif, pecahan, string acak) → `None` (tidak ada hint).
//! HTTP-date di masa lalu → `Some(Duration::ZERO)`.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format obsolete yang tetap wajib diterima recipient. Keduanya selalu GMT.
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Parse `Retry-After` relatif terhadap `now`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let at = parse_http_date(value)?;
    let wait_ms = at.signed_duration_since(now).num_milliseconds();
    Some(Duration::from_millis(wait_ms.max(0) as u64))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    [RFC850_FORMAT, ASCTIME_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse `Retry-After` dari header map response.
pub fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap()
    }

    #[test]
    fn test_integer_seconds() {
        assert_eq!(parse_retry_after("120", fixed_now()), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 3 ", fixed_now()), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0", fixed_now()), Some(Duration::ZERO));
    }

    #[test]
    fn test_http_date_future() {
        let d = parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", fixed_now());
        assert_eq!(d, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_http_date_past_is_zero() {
        let d = parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", fixed_now());
        assert_eq!(d, Some(Duration::ZERO));
    }

    #[test]
    fn test_http_date_obsolete_formats() {
        let now = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 0).unwrap();
        let expected = Some(Duration::from_secs(37));

        assert_eq!(parse_retry_after("Sun, 06 Nov 1994 08:49:37 GMT", now), expected);
        assert_eq!(parse_retry_after("Sunday, 06-Nov-94 08:49:37 GMT", now), expected);
        assert_eq!(parse_retry_after("Sun Nov  6 08:49:37 1994", now), expected);
    }

    #[test]
    fn test_http_date_obsolete_past_is_zero() {
        let now = Utc.with_ymd_and_hms(1994, 11, 6, 9, 0, 0).unwrap();
        assert_eq!(parse_retry_after("Sunday, 06-Nov-94 08:49:37 GMT", now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("Sun Nov  6 08:49:37 1994", now), Some(Duration::ZERO));
    }

    #[test]
    fn test_malformed_is_none() {
        assert_eq!(parse_retry_after("", fixed_now()), None);
        assert_eq!(parse_retry_after("-5", fixed_now()), None);
        assert_eq!(parse_retry_after("1.5", fixed_now()), None);
        assert_eq!(parse_retry_after("soon", fixed_now()), None);
        assert_eq!(parse_retry_after("99999999999999999999999", fixed_now()), None);
    }

    #[test]
    fn test_from_headers() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_from_headers(&headers), None);

        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_from_headers(&headers), Some(Duration::from_secs(7)));
    }
}
