//! HTTP/1.x message handling.
//!
//! This module contains everything that understands HTTP bytes:
//! - `HttpUrl`: request-target parsing with scheme/port defaulting
//! - `HttpMessage`: start line, ordered header lines, raw body
//! - `Parser`: the incremental START -> HEADER -> BODY -> ACCEPT machine
//! - `ResponseCacheInfo` / `RequestCacheInfo`: RFC 7234 metadata extraction

pub mod cache_info;
pub mod date;
pub mod message;
pub mod parser;
pub mod url;

pub use cache_info::{RequestCacheInfo, ResponseCacheInfo};
pub use message::{Header, HttpMessage};
pub use parser::{BodyFormat, Need, Parser, ParserState};
pub use url::{HttpUrl, Scheme};

use std::fmt;

/// Errors raised while parsing HTTP constructs.
///
/// Per-field failures inside cache-info extraction are swallowed by the
/// caller (the field is treated as absent); everything else surfaces as a
/// 400 or 502 depending on which side produced the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Start line does not have three fields
    StartLine,
    /// Header line has no colon
    HeaderColon,
    /// Header line has a space before the colon (RFC 7230 Sec 3.2.4)
    HeaderSpace,
    /// Response status code is not three characters
    StatusCode,
    /// Date field does not match the IMF-fixdate format
    DateFormat,
    /// Delta-seconds field is not an unsigned decimal
    DeltaSeconds,
    /// URL port is not a number
    UrlPort,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            ParseError::StartLine => "invalid start line (need 3 fields)",
            ParseError::HeaderColon => "invalid header line (no colon)",
            ParseError::HeaderSpace => "invalid header line (space before colon)",
            ParseError::StatusCode => "invalid status code",
            ParseError::DateFormat => "invalid date format",
            ParseError::DeltaSeconds => "invalid delta-second format",
            ParseError::UrlPort => "invalid port in URL",
        };
        f.write_str(what)
    }
}

impl std::error::Error for ParseError {}
