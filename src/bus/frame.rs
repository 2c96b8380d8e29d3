//! STOMP 1.2 frame model and `tokio_util` codec.
//!
//! Wire layout: `COMMAND\n(header:value\n)*\n<body>\0`. Heart-beat EOLs
//! between frames are skipped by the decoder. Bodies are delimited by the
//! `content-length` header when present, otherwise by the first NUL octet.

use std::fmt;
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on a buffered, still-incomplete frame.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// STOMP frame commands used by the client and broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are exempt from escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while decoding or encoding STOMP frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    #[error("invalid content-length: {0:?}")]
    BadContentLength(String),

    #[error("frame body is not terminated by NUL")]
    MissingTerminator,

    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    /// Headers in wire order; the first occurrence of a name wins.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Builder-style header append.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builder-style body replacement.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for STOMP 1.2 with heart-beating disabled.
    pub fn connect(host: &str, login: &str, passcode: &str) -> Self {
        Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("login", login)
            .with_header("passcode", passcode)
            .with_header("heart-beat", "0,0")
    }

    /// SEND frame with a text body.
    pub fn send(destination: &str, body: impl Into<Vec<u8>>) -> Self {
        Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_body(body)
    }

    /// SUBSCRIBE frame with automatic acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// UNSUBSCRIBE frame.
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// Best-effort description of an ERROR frame.
    pub fn error_message(&self) -> String {
        let summary = self.header("message").unwrap_or("broker error");
        let detail = String::from_utf8_lossy(&self.body);
        let detail = detail.trim();
        if detail.is_empty() {
            summary.to_string()
        } else {
            format!("{summary}: {detail}")
        }
    }
}

/// Codec for STOMP frames over a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        skip_heartbeats(src);
        if src.is_empty() {
            return Ok(None);
        }

        let Some((header_len, body_start)) = find_header_end(src) else {
            if src.len() > MAX_FRAME_BYTES {
                return Err(FrameError::FrameTooLarge);
            }
            return Ok(None);
        };

        let head = std::str::from_utf8(&src[..header_len]).map_err(|_| FrameError::InvalidUtf8)?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::BadContentLength(v.clone()))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if len > MAX_FRAME_BYTES {
                    return Err(FrameError::FrameTooLarge);
                }
                let end = body_start + len;
                if src.len() <= end {
                    if end > MAX_FRAME_BYTES {
                        return Err(FrameError::FrameTooLarge);
                    }
                    src.reserve(end + 1 - src.len());
                    return Ok(None);
                }
                if src[end] != 0 {
                    return Err(FrameError::MissingTerminator);
                }
                end
            }
            None => match src[body_start..].iter().position(|&b| b == 0) {
                Some(offset) => body_start + offset,
                None => {
                    if src.len() > MAX_FRAME_BYTES {
                        return Err(FrameError::FrameTooLarge);
                    }
                    return Ok(None);
                }
            },
        };

        let body = src[body_start..body_end].to_vec();
        src.advance(body_end + 1);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let escape_headers = frame.command.escapes_headers();
        dst.reserve(frame.body.len() + 64);
        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &frame.headers {
            if escape_headers {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}

fn skip_heartbeats(src: &mut BytesMut) {
    loop {
        match src.first() {
            Some(b'\n') => src.advance(1),
            Some(b'\r') if src.get(1) == Some(&b'\n') => src.advance(2),
            _ => break,
        }
    }
}

/// Returns `(header_len, body_start)` once the blank line ending the
/// headers has been buffered.
fn find_header_end(src: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\n' {
            match src.get(i + 1) {
                Some(b'\n') => return Some((i, i + 2)),
                Some(b'\r') if src.get(i + 2) == Some(&b'\n') => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, FrameError> {
    if !s.contains('\\') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}
