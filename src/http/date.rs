//! IMF-fixdate parsing and formatting.
//!
//! HTTP date fields (`Date`, `Expires`, `Last-Modified`,
//! `If-Modified-Since`) use the fixed format of RFC 7231 Sec 7.1.1.1,
//! always in UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::ParseError;

/// The HTTP time format, used for both parsing and formatting.
pub const HTTP_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Parse an IMF-fixdate string such as `Wed, 28 Feb 2018 20:51:55 GMT`.
pub fn parse_http_date(s: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(s, HTTP_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseError::DateFormat)
}

/// Format a time point as an IMF-fixdate string.
pub fn format_http_date(t: DateTime<Utc>) -> String {
    t.format(HTTP_TIME_FORMAT).to_string()
}
