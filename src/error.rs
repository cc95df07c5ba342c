// Error types module

use std::fmt;

use crate::http::ParseError;

/// Centralized error type for the proxy.
///
/// Categorizes failures into the channels the connection drivers care
/// about:
/// - Parse: malformed HTTP start line, header, or date/delta field
/// - Io: socket, DNS, and connect failures, including normal EOF
/// - Config: configuration file or validation errors
/// - Internal: anything else reported by the runtime
#[derive(Debug)]
pub enum ProxyError {
    /// Malformed HTTP construct
    Parse(ParseError),
    /// Socket/DNS/connect failure, or EOF surfaced by a read
    Io(std::io::Error),
    /// Configuration errors (invalid YAML, unreadable file, etc.)
    Config(String),
    /// Unexpected proxy errors
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Parse(e) => write!(f, "{}", e),
            ProxyError::Io(e) => write!(f, "{}", e),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Parse(e) => Some(e),
            ProxyError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for ProxyError {
    fn from(err: ParseError) -> Self {
        ProxyError::Parse(err)
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(err)
    }
}

impl ProxyError {
    /// An error representing the peer closing the connection.
    pub fn closed() -> Self {
        ProxyError::Io(std::io::ErrorKind::UnexpectedEof.into())
    }

    /// True when the error is a normal end-of-stream rather than a fault.
    ///
    /// EOF is logged as a note and never answered with a 502.
    pub fn is_closed(&self) -> bool {
        matches!(self, ProxyError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
