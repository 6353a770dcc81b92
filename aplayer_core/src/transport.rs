//! Transport seam between the loader and the module server.
//!
//! The loader never talks to a socket directly; it goes through
//! [`ServerTransport`] so tests can substitute a recording mock. The real
//! implementation is a line-oriented TCP client: one command line out, one
//! response line back, payload newlines escaped so a message is always a
//! single line.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("server connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("server i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("server closed the connection")]
    Closed,
}

/// One synchronous command round-trip. The loader serializes all calls for
/// a given session through this, so implementations need no internal
/// pipelining.
pub trait ServerTransport: Send {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError>;
}

/// Line-based TCP transport to a running module server.
pub struct LineTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl LineTransport {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).map_err(TransportError::Connect)?;
        let _ = stream.set_nodelay(true);
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }
}

impl ServerTransport for LineTransport {
    fn send_command(&mut self, command: &str) -> Result<String, TransportError> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;

        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(unescape_payload(&line))
    }
}

/// Escape a payload so it fits on one wire line. Used by the server side;
/// the client unescapes on receive.
pub fn escape_payload(payload: &str) -> String {
    payload.replace('\\', "\\\\").replace('\n', "\\n")
}

pub fn unescape_payload(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
