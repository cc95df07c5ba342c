//! Incremental HTTP/1.x message parser.
//!
//! The parser is a pure step machine: it holds no reference to any input
//! source. The connection driver asks [`Parser::need`] what to read next
//! (a CRLF-terminated line, an exact byte count, or drain-to-EOF) and
//! feeds the result back through [`Parser::put_line`] / [`Parser::put_body`].
//! Parsed fields accumulate in an [`HttpMessage`] owned by the caller.

use super::message::{canonicalize, Header, HttpMessage};
use super::ParseError;

/// Parser position within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserState {
    Start,
    Header,
    Body,
    Accept,
}

/// How the message body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// Close-delimited: everything until EOF is body
    Plain,
    /// Content-Length framing
    Length,
    /// Transfer-Encoding: chunked; the raw chunk framing is kept in the body
    Chunked,
}

/// What the parser wants next from the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    /// A line terminated by LF (start line, header line, or chunk header)
    Line,
    /// At most this many more body bytes
    Bytes(usize),
    /// Everything until EOF (close-delimited body)
    Drain,
    /// Nothing; the message is complete
    Done,
}

#[derive(Debug)]
pub struct Parser {
    state: ParserState,
    pub format: BodyFormat,
    pub content_length: usize,
    /// Bytes still owed for the Content-Length body or the current chunk
    /// (chunk data plus its trailing CRLF).
    remaining: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Start,
            format: BodyFormat::Plain,
            content_length: 0,
            remaining: 0,
        }
    }

    pub fn status(&self) -> ParserState {
        self.state
    }

    /// Prepare for the next message. The associated message buffer is
    /// cleared separately by the caller.
    pub fn reset(&mut self) {
        self.state = ParserState::Start;
        self.format = BodyFormat::Plain;
        self.content_length = 0;
        self.remaining = 0;
    }

    /// What input the next parse step requires.
    pub fn need(&self) -> Need {
        match self.state {
            ParserState::Start | ParserState::Header => Need::Line,
            ParserState::Accept => Need::Done,
            ParserState::Body => match self.format {
                BodyFormat::Plain => Need::Drain,
                BodyFormat::Length => Need::Bytes(self.remaining),
                BodyFormat::Chunked => {
                    if self.remaining == 0 {
                        Need::Line
                    } else {
                        Need::Bytes(self.remaining)
                    }
                }
            },
        }
    }

    /// Feed one line, as read from the wire (the trailing LF, and CR if
    /// any, still attached).
    pub fn put_line(&mut self, msg: &mut HttpMessage, line: &[u8]) -> Result<(), ParseError> {
        match self.state {
            ParserState::Start => self.put_start_line(msg, line),
            ParserState::Header => self.put_header(msg, line),
            ParserState::Body => {
                self.put_chunk_header(msg, line);
                Ok(())
            }
            ParserState::Accept => Ok(()),
        }
    }

    /// Feed body bytes. The caller must not feed more than the current
    /// [`Need::Bytes`] count; excess is ignored for accounting.
    pub fn put_body(&mut self, msg: &mut HttpMessage, data: &[u8]) {
        msg.body.extend_from_slice(data);
        match self.format {
            BodyFormat::Plain => {}
            BodyFormat::Length => {
                self.remaining = self.remaining.saturating_sub(data.len());
                if self.remaining == 0 {
                    self.state = ParserState::Accept;
                }
            }
            BodyFormat::Chunked => {
                // remaining == 0 means the next chunk header line follows
                self.remaining = self.remaining.saturating_sub(data.len());
            }
        }
    }

    /// Signal end of input. A close-delimited body completes; a truncated
    /// sized body is accepted as-is. Incomplete headers are left for the
    /// driver to report.
    pub fn on_eof(&mut self) {
        if self.state == ParserState::Body {
            self.state = ParserState::Accept;
        }
    }

    fn put_start_line(&mut self, msg: &mut HttpMessage, line: &[u8]) -> Result<(), ParseError> {
        let line = trim_line_ending(line);
        let text = String::from_utf8_lossy(line);
        let mut rest = text.as_ref();
        for i in 0..2 {
            let pos = rest.find(' ').ok_or(ParseError::StartLine)?;
            msg.start_line[i] = rest[..pos].to_string();
            rest = &rest[pos + 1..];
        }
        // the third field may itself contain spaces (e.g. "Not Found")
        msg.start_line[2] = rest.to_string();
        self.state = ParserState::Header;
        Ok(())
    }

    fn put_header(&mut self, msg: &mut HttpMessage, line: &[u8]) -> Result<(), ParseError> {
        let line = trim_line_ending(line);
        if line.is_empty() {
            return self.end_of_headers(msg);
        }
        let pos = line
            .iter()
            .position(|&b| b == b':' || b == b' ')
            .ok_or(ParseError::HeaderColon)?;
        if line[pos] == b' ' {
            // RFC 7230 Sec 3.2.4
            return Err(ParseError::HeaderSpace);
        }
        let key = canonicalize(&String::from_utf8_lossy(&line[..pos]));
        let value = String::from_utf8_lossy(&line[pos + 1..])
            .trim_matches([' ', '\t'])
            .to_string();

        if key == "Content-Length" {
            if let Ok(n) = value.parse::<usize>() {
                self.format = BodyFormat::Length;
                self.content_length = n;
                msg.body.reserve(n);
            }
        } else if key == "Transfer-Encoding" && value.contains("chunked") {
            self.format = BodyFormat::Chunked;
        }
        msg.header_lines.push(Header { key, value });
        Ok(())
    }

    fn end_of_headers(&mut self, msg: &mut HttpMessage) -> Result<(), ParseError> {
        if self.has_body(msg)? {
            self.state = ParserState::Body;
            if self.format == BodyFormat::Length {
                self.remaining = self.content_length;
                if self.remaining == 0 {
                    self.state = ParserState::Accept;
                }
            }
        } else {
            self.state = ParserState::Accept;
        }
        Ok(())
    }

    /// Responses are recognized by their protocol token in the first
    /// start-line field; 1xx, 204 and 304 have no body regardless of
    /// framing headers. Requests have a body only when announced.
    fn has_body(&self, msg: &HttpMessage) -> Result<bool, ParseError> {
        let proto = &msg.start_line[0];
        if proto == "HTTP/1.0" || proto == "HTTP/1.1" {
            let status = &msg.start_line[1];
            if status.len() != 3 {
                return Err(ParseError::StatusCode);
            }
            Ok(!(status.starts_with('1') || status == "204" || status == "304"))
        } else {
            Ok((self.format == BodyFormat::Length && self.content_length > 0)
                || self.format == BodyFormat::Chunked)
        }
    }

    fn put_chunk_header(&mut self, msg: &mut HttpMessage, line: &[u8]) {
        // the raw framing is preserved so the body forwards unchanged
        msg.body.extend_from_slice(line);
        let stripped = trim_line_ending(line);
        if stripped.is_empty() {
            self.state = ParserState::Accept;
            return;
        }
        let digits: Vec<u8> = stripped
            .iter()
            .copied()
            .take_while(u8::is_ascii_hexdigit)
            .collect();
        let size = usize::from_str_radix(&String::from_utf8_lossy(&digits), 16).unwrap_or(0);
        if size > 0 {
            // chunk data plus its trailing CRLF
            self.remaining = size + 2;
        }
    }
}

/// Strip one trailing LF and, if present before it, one CR.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
