//! Request-target URL parsing.

use std::fmt;
use std::str::FromStr;

use super::ParseError;

/// Protocol named in a URL's scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// No or unrecognized scheme (e.g. the authority form used by CONNECT)
    None,
    Http,
    Https,
}

/// A parsed request target.
///
/// Recognizes a leading `http://` / `https://` (case-insensitive), then
/// splits the remainder at the first `:` or `/`. A missing port defaults to
/// 80 for HTTP and 443 otherwise; a missing path defaults to `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl HttpUrl {
    /// The `host:port` form used for name resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn default_port(scheme: Scheme) -> u16 {
        match scheme {
            Scheme::Http => 80,
            _ => 443,
        }
    }
}

impl FromStr for HttpUrl {
    type Err = ParseError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let lower = url.to_ascii_lowercase();
        let (scheme, rest) = if lower.starts_with("http://") {
            (Scheme::Http, &url[7..])
        } else if lower.starts_with("https://") {
            (Scheme::Https, &url[8..])
        } else {
            (Scheme::None, url)
        };

        let parse_port = |s: &str| s.parse::<u16>().map_err(|_| ParseError::UrlPort);

        match rest.find([':', '/']) {
            Some(pos) => {
                let host = rest[..pos].to_string();
                if rest.as_bytes()[pos] == b':' {
                    let after = &rest[pos + 1..];
                    match after.find('/') {
                        Some(slash) => Ok(HttpUrl {
                            scheme,
                            host,
                            port: parse_port(&after[..slash])?,
                            path: after[slash..].to_string(),
                        }),
                        None => Ok(HttpUrl {
                            scheme,
                            host,
                            port: parse_port(after)?,
                            path: "/".to_string(),
                        }),
                    }
                } else {
                    Ok(HttpUrl {
                        scheme,
                        host,
                        port: Self::default_port(scheme),
                        path: rest[pos..].to_string(),
                    })
                }
            }
            None => Ok(HttpUrl {
                scheme,
                host: rest.to_string(),
                port: Self::default_port(scheme),
                path: "/".to_string(),
            }),
        }
    }
}

impl fmt::Display for HttpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpUrl{{protocol = {:?}, host = \"{}\", port = {}, path = \"{}\"}}",
            self.scheme, self.host, self.port, self.path
        )
    }
}
