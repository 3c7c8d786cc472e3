//! Network command protocol.
//!
//! One request per TCP connection: the client sends a single line of at
//! most `REQUEST_BYTES` bytes, the responder queues the matching keypad
//! commands for the sampler and answers with the current panel status,
//! then closes the connection. A client that stalls past the read
//! timeout is answered with whatever it sent by then.
//!
//! | Request | Commands queued | Response |
//! |---------|-----------------|----------|
//! | `star`, `pound`, `stay`, `away`, `idle` | that key | text |
//! | `tag` | idle | JSON |
//! | 1..=4 decimal digits | one key per digit, left to right | text |
//! | anything else | idle | text |
//!
//! Text response: `"<led>, <z1>, <z2>, <z3>, <z4>,"`.
//! JSON response: `{"obsTime":N,"zoneAct":[32],"zoneDeAct":[32]}` and a newline.
//!
//! A queued command only means the sampler will transmit it; nothing
//! confirms the panel acted on it. The socket is plain TCP: put TLS and
//! access control in front of it.

use keybus_common::codec::keys::{Key, encode};
use keybus_common::consts::{MAX_REQUEST_DIGITS, ZONE_COUNT};
use keybus_common::link::{FrameProducer, QueueError};
use keybus_common::status::{StatusReader, StatusSnapshot};
use serde::Serialize;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest request read from a connection.
pub const REQUEST_BYTES: usize = 15;

/// Default time a client gets to send its request line.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Responder failure.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// Socket error.
    #[error("responder I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The command queue is full; later keys of the request were dropped.
    #[error("command queue full, {queued} of {requested} keys queued")]
    QueueFull {
        /// Keys queued before the queue filled.
        queued: usize,
        /// Keys in the request.
        requested: usize,
    },

    /// JSON rendering failed.
    #[error("JSON response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Response encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Comma-separated status lines.
    #[default]
    Text,
    /// Zone timestamps as JSON.
    Json,
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Keys to transmit, in order.
    pub keys: heapless::Vec<Key, MAX_REQUEST_DIGITS>,
    /// Response encoding.
    pub format: ResponseFormat,
    /// False when the input fell back to idle.
    pub recognized: bool,
}

impl Request {
    fn single(key: Key, format: ResponseFormat, recognized: bool) -> Self {
        let mut keys = heapless::Vec::new();
        // Capacity is at least one.
        let _ = keys.push(key);
        Self {
            keys,
            format,
            recognized,
        }
    }
}

const KEYWORDS: [(&str, Key); 5] = [
    ("star", Key::Star),
    ("pound", Key::Pound),
    ("stay", Key::Stay),
    ("away", Key::Away),
    ("idle", Key::Idle),
];

/// Parse one request line. Never fails: unknown input means idle.
pub fn parse_request(line: &str) -> Request {
    let line = line.trim();

    if let Some((_, key)) = KEYWORDS.iter().find(|(word, _)| line.starts_with(word)) {
        return Request::single(*key, ResponseFormat::Text, true);
    }
    if line.starts_with("tag") {
        return Request::single(Key::Idle, ResponseFormat::Json, true);
    }

    let digits = (1..=MAX_REQUEST_DIGITS).contains(&line.len())
        && line.bytes().all(|b| b.is_ascii_digit());
    if digits {
        let keys = line
            .bytes()
            .filter_map(|b| Key::digit(b - b'0'))
            .collect::<heapless::Vec<Key, MAX_REQUEST_DIGITS>>();
        return Request {
            keys,
            format: ResponseFormat::Text,
            recognized: true,
        };
    }

    debug!(request = line, "unrecognized request; sending idle");
    Request::single(Key::Idle, ResponseFormat::Text, false)
}

/// Queue the request's keys. Stops at the first full-queue rejection.
///
/// # Errors
/// `ResponderError::QueueFull` with the number of keys that made it.
pub fn submit(commands: &mut FrameProducer, request: &Request) -> Result<usize, ResponderError> {
    for (queued, key) in request.keys.iter().enumerate() {
        if let Err(QueueError::Full { .. }) = commands.push(encode(*key)) {
            return Err(ResponderError::QueueFull {
                queued,
                requested: request.keys.len(),
            });
        }
    }
    Ok(request.keys.len())
}

#[derive(Serialize)]
struct JsonStatus<'a> {
    #[serde(rename = "obsTime")]
    obs_time: u64,
    #[serde(rename = "zoneAct")]
    zone_act: &'a [u64; ZONE_COUNT],
    #[serde(rename = "zoneDeAct")]
    zone_deact: &'a [u64; ZONE_COUNT],
}

/// Render `snapshot` in `format`.
///
/// # Errors
/// `ResponderError::Json` if serialization fails.
pub fn render_response(
    snapshot: &StatusSnapshot,
    format: ResponseFormat,
) -> Result<String, ResponderError> {
    match format {
        ResponseFormat::Text => Ok(snapshot.status_line()),
        ResponseFormat::Json => {
            let mut out = serde_json::to_string(&JsonStatus {
                obs_time: snapshot.obs_time,
                zone_act: &snapshot.activated,
                zone_deact: &snapshot.deactivated,
            })?;
            out.push('\n');
            Ok(out)
        }
    }
}

/// TCP command server.
#[derive(Debug)]
pub struct Responder {
    listener: TcpListener,
    commands: FrameProducer,
    status: StatusReader,
    read_timeout: Duration,
}

impl Responder {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// `ResponderError::Io` if the address cannot be bound.
    pub fn bind(
        addr: SocketAddr,
        commands: FrameProducer,
        status: StatusReader,
    ) -> Result<Self, ResponderError> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "responder listening");
        Ok(Self {
            listener,
            commands,
            status,
            read_timeout: READ_TIMEOUT,
        })
    }

    /// Replace the per-connection read timeout. Zero is clamped to 1 ms.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ResponderError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve one request on `stream`.
    ///
    /// A full command queue is logged and still answered with the status.
    ///
    /// # Errors
    /// Stream I/O or JSON rendering failures.
    pub fn handle<S: Read + Write>(&mut self, mut stream: S) -> Result<Request, ResponderError> {
        let mut raw = Vec::with_capacity(REQUEST_BYTES);
        let read = BufReader::new(Read::by_ref(&mut stream).take(REQUEST_BYTES as u64))
            .read_until(b'\n', &mut raw);
        match read {
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                debug!(bytes = raw.len(), "request read timed out");
            }
            Err(e) => return Err(e.into()),
        }
        let request = parse_request(&String::from_utf8_lossy(&raw));

        match submit(&mut self.commands, &request) {
            Ok(n) => debug!(keys = n, "commands queued"),
            Err(e) => warn!("{e}"),
        }

        let response = render_response(&self.status.snapshot(), request.format)?;
        stream.write_all(response.as_bytes())?;
        stream.flush()?;
        Ok(request)
    }

    /// Accept connections forever, one at a time.
    pub fn serve(&mut self) -> ! {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_read_timeout(Some(self.read_timeout)) {
                        warn!(%peer, "cannot set read timeout: {e}");
                        continue;
                    }
                    if let Err(e) = self.handle(stream) {
                        warn!(%peer, "request failed: {e}");
                    }
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    }
}
