//! HTTP message representation.

use bytes::{BufMut, Bytes, BytesMut};

/// One header line. Keys are stored in canonical form (see [`canonicalize`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A parsed HTTP request or response.
///
/// The start line always has exactly three fields. Header lines preserve
/// insertion order. The body holds raw bytes; for chunked messages the
/// chunk framing itself is kept verbatim so the message can be forwarded
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMessage {
    pub start_line: [String; 3],
    pub header_lines: Vec<Header>,
    pub body: Vec<u8>,
}

impl HttpMessage {
    pub fn new(start_line: [&str; 3]) -> Self {
        Self {
            start_line: start_line.map(str::to_string),
            header_lines: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Clear all fields so the buffer can hold the next message.
    pub fn clear(&mut self) {
        for field in &mut self.start_line {
            field.clear();
        }
        self.header_lines.clear();
        self.body.clear();
    }

    /// The start line as it appears on the wire, without the CRLF.
    pub fn start_line_text(&self) -> String {
        self.start_line.join(" ")
    }

    /// Value of the first header with the given canonical key.
    pub fn find_header(&self, key: &str) -> Option<&str> {
        self.header_lines
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    /// Replace the value of the first header with the given key, or append
    /// a new header line if none exists.
    pub fn replace_header(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.header_lines.iter_mut().find(|h| h.key == key) {
            Some(h) => h.value = value,
            None => self.header_lines.push(Header::new(key, value)),
        }
    }

    /// Drop every header line whose key is in `keys`.
    pub fn remove_headers(&mut self, keys: &[&str]) {
        self.header_lines.retain(|h| !keys.contains(&h.key.as_str()));
    }

    /// Serialize to wire form: start line, header lines, blank line, body.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        buf.put_slice(self.start_line_text().as_bytes());
        buf.put_slice(b"\r\n");
        for h in &self.header_lines {
            buf.put_slice(h.key.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(h.value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

/// Canonicalize a header key: an alphabetic character at the start or
/// right after a non-alphabetic one is uppercased, every other alphabetic
/// character is lowercased. `content-length` and `CONTENT-LENGTH` both
/// become `Content-Length`.
pub fn canonicalize(key: &str) -> String {
    let mut first = true;
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphabetic() {
                let mapped = if first {
                    ch.to_ascii_uppercase()
                } else {
                    ch.to_ascii_lowercase()
                };
                first = false;
                mapped
            } else {
                first = true;
                ch
            }
        })
        .collect()
}
