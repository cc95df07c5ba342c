//! Read/write machinery shared by the client and origin sides.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::http::{HttpMessage, Need, Parser, ParserState};
use crate::logging::RequestId;

/// One side of a proxied exchange: a socket, a parser, and the message
/// buffer the parser fills.
///
/// The buffered reader persists across messages, so pipelined bytes of
/// the next request survive between [`Connection::read_message`] calls.
pub(crate) struct Connection {
    pub stream: BufReader<TcpStream>,
    pub parser: Parser,
    pub message: HttpMessage,
    pub id: RequestId,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufReader::new(stream),
            parser: Parser::new(),
            message: HttpMessage::default(),
            id: RequestId::NONE,
        }
    }

    /// Read one complete HTTP message, resetting the parser and message
    /// buffer first.
    ///
    /// A truncated body is tolerated (the message completes with what
    /// arrived); EOF before the body is reached surfaces as a closed-
    /// connection error, and the caller inspects the parser state to
    /// tell a clean close from truncated headers.
    pub async fn read_message(&mut self) -> Result<(), ProxyError> {
        self.parser.reset();
        self.message.clear();
        let mut line = Vec::with_capacity(128);
        let mut chunk = [0u8; 8192];
        loop {
            match self.parser.need() {
                Need::Line => {
                    line.clear();
                    let n = self.stream.read_until(b'\n', &mut line).await?;
                    if n == 0 {
                        if self.parser.status() == ParserState::Body {
                            // mid-body EOF: keep what we have
                            self.parser.on_eof();
                            continue;
                        }
                        return Err(ProxyError::closed());
                    }
                    self.parser.put_line(&mut self.message, &line)?;
                }
                Need::Bytes(n) => {
                    let want = n.min(chunk.len());
                    let read = self.stream.read(&mut chunk[..want]).await?;
                    if read == 0 {
                        self.parser.on_eof();
                    } else {
                        self.parser.put_body(&mut self.message, &chunk[..read]);
                    }
                }
                Need::Drain => {
                    let read = self.stream.read(&mut chunk).await?;
                    if read == 0 {
                        self.parser.on_eof();
                    } else {
                        self.parser.put_body(&mut self.message, &chunk[..read]);
                    }
                }
                Need::Done => return Ok(()),
            }
        }
    }

    /// Serialize a message and write it out in full.
    pub async fn write_message(&mut self, message: &HttpMessage) -> Result<(), ProxyError> {
        let bytes = message.to_bytes();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
