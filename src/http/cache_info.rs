//! Cache-relevant metadata extracted from HTTP messages.
//!
//! Implements the freshness model of RFC 7234:
//! - `no-store`: the response must not be stored at all
//! - `no-cache`: the response may be stored but must be revalidated
//! - `private`: the response must not be stored by a shared cache
//! - `max-age` / `s-maxage`: explicit freshness lifetime in seconds
//!
//! Any per-field parse failure is treated as if the field were absent.

use chrono::{DateTime, TimeDelta, Utc};
use std::num::IntErrorKind;

use super::date::parse_http_date;
use super::message::HttpMessage;
use super::ParseError;
use crate::constants::MAX_DELTA_SECONDS;

/// Caching metadata computed from a response (RFC 7234 Sec 4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCacheInfo {
    /// The Date header field. Required; extraction fails without it.
    pub date_value: DateTime<Utc>,
    /// When the request was sent to the origin.
    pub request_time: DateTime<Utc>,
    /// When the response was received from the origin.
    pub response_time: DateTime<Utc>,
    /// The Last-Modified header field, when present and well-formed.
    pub last_modified: Option<DateTime<Utc>>,
    /// RFC 7234 Sec 4.2.3
    pub corrected_initial_age: TimeDelta,
    /// RFC 7234 Sec 4.2.1; zero when no lifetime was derivable, which
    /// makes the entry immediately stale.
    pub freshness_lifetime: TimeDelta,
    /// RFC 7232 Sec 2.3; empty when absent.
    pub etag: String,
    /// `no-cache` in Cache-Control: stored responses need validation.
    pub no_cache: bool,
    /// `no-store` in Cache-Control: the response must not be stored.
    pub no_store: bool,
    /// `private` in Cache-Control.
    pub private: bool,
}

impl ResponseCacheInfo {
    /// Extract caching metadata from a parsed response.
    ///
    /// Returns `None` when the message carries no usable `Date` field,
    /// in which case the response is not cacheable.
    pub fn from_message(
        msg: &HttpMessage,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
    ) -> Option<Self> {
        let mut age_value = TimeDelta::zero();
        let mut cache_control = String::new();
        let mut date_value = None;
        let mut expires = None;
        let mut etag = String::new();
        let mut last_modified = None;

        for h in &msg.header_lines {
            match h.key.as_str() {
                "Age" => {
                    if let Ok(d) = parse_delta_seconds(&h.value) {
                        age_value = d;
                    }
                }
                "Cache-Control" => cache_control = h.value.clone(),
                "Date" => {
                    if let Ok(t) = parse_http_date(&h.value) {
                        date_value = Some(t);
                    }
                }
                "Etag" => etag = h.value.clone(),
                "Expires" => {
                    if let Ok(t) = parse_http_date(&h.value) {
                        expires = Some(t);
                    }
                }
                "Last-Modified" => {
                    if let Ok(t) = parse_http_date(&h.value) {
                        last_modified = Some(t);
                    }
                }
                _ => {}
            }
        }

        let date_value = date_value?;

        // RFC 7234 Sec 4.2.3
        let apparent_age = (response_time - date_value).max(TimeDelta::zero());
        let response_delay = response_time - request_time;
        let corrected_age_value = age_value + response_delay;

        let mut info = ResponseCacheInfo {
            date_value,
            request_time,
            response_time,
            last_modified,
            corrected_initial_age: apparent_age.max(corrected_age_value),
            freshness_lifetime: TimeDelta::zero(),
            etag,
            no_cache: false,
            no_store: false,
            private: false,
        };
        info.apply_cache_control(&cache_control, expires);
        Some(info)
    }

    fn apply_cache_control(&mut self, cache_control: &str, expires: Option<DateTime<Utc>>) {
        let mut max_age = None;
        let mut s_maxage = None;

        for field in cache_control.split(',') {
            let field = field.trim_start();
            if field == "no-cache" {
                self.no_cache = true;
            } else if field == "no-store" {
                self.no_store = true;
            } else if field == "private" {
                self.private = true;
            } else if let Some(v) = field.strip_prefix("max-age=") {
                if let Ok(d) = parse_delta_seconds(v) {
                    max_age = Some(d);
                }
            } else if let Some(v) = field.strip_prefix("s-maxage=") {
                if let Ok(d) = parse_delta_seconds(v) {
                    s_maxage = Some(d);
                }
            }
        }

        // RFC 7234 Sec 4.2.1
        self.freshness_lifetime = if let Some(d) = s_maxage {
            d
        } else if let Some(d) = max_age {
            d
        } else if let Some(e) = expires {
            e - self.date_value
        } else if let Some(lm) = self.last_modified {
            // heuristic freshness
            (self.response_time - lm) / 10
        } else {
            TimeDelta::zero()
        };
    }

    /// Current age of the stored response (RFC 7234 Sec 4.2.3).
    pub fn current_age(&self, now: DateTime<Utc>) -> TimeDelta {
        let resident_time = now - self.response_time;
        self.corrected_initial_age + resident_time
    }

    /// Whether the stored response has outlived its freshness lifetime.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.current_age(now) >= self.freshness_lifetime
    }

    /// The instant at which the entry stops being fresh.
    pub fn expire_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.current_age(now) + self.freshness_lifetime
    }
}

/// Caching-relevant fields of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCacheInfo {
    /// The If-Modified-Since header field, when present and well-formed.
    pub if_modified_since: Option<DateTime<Utc>>,
    /// The If-None-Match header field; empty when absent.
    pub if_none_match: String,
    /// `no-cache` in the request's Cache-Control.
    pub no_cache: bool,
}

impl RequestCacheInfo {
    /// Extract caching metadata from a parsed request. Malformed fields
    /// are treated as absent.
    pub fn from_message(msg: &HttpMessage) -> Self {
        let mut info = Self::default();
        for h in &msg.header_lines {
            match h.key.as_str() {
                "Cache-Control" => {
                    for field in h.value.split(',') {
                        if field.trim_start() == "no-cache" {
                            info.no_cache = true;
                        }
                    }
                }
                "If-Modified-Since" => {
                    if let Ok(t) = parse_http_date(&h.value) {
                        info.if_modified_since = Some(t);
                    }
                }
                "If-None-Match" => info.if_none_match = h.value.clone(),
                _ => {}
            }
        }
        info
    }
}

/// Parse an unsigned delta-seconds value (RFC 7234 Sec 1.2.1).
///
/// Values too large to matter are clamped to a finite sentinel instead of
/// rejected, so `max-age=99999999999` behaves as "effectively forever".
pub fn parse_delta_seconds(s: &str) -> Result<TimeDelta, ParseError> {
    match s.parse::<u64>() {
        Ok(v) => Ok(TimeDelta::seconds(
            v.min(MAX_DELTA_SECONDS as u64) as i64
        )),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
            Ok(TimeDelta::seconds(MAX_DELTA_SECONDS))
        }
        Err(_) => Err(ParseError::DeltaSeconds),
    }
}
