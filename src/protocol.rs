//! Control-channel request/reply machinery (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP commands terminated with `\r\n`
//! - Assembling single-line and multi-line replies
//! - Dispatching replies to a per-task handler until it settles
//! - The per-task idle timeout and the session `closed` flag
//!
//! Tasks are strictly serialized: `&mut self` on every entry point means
//! at most one request/reply exchange is in flight per channel, and the
//! next one starts only after the previous handler resolved or rejected.

use crate::error::{FtpError, FtpResult};
use crate::types::Reply;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

/// Abstraction over a plain TCP or TLS-wrapped read half.
pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Abstraction over a plain TCP or TLS-wrapped write half.
pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

/// What a task handler decides after seeing a reply.
pub enum TaskAction {
    /// The task is complete; resolve with this reply.
    Resolve,
    /// Not terminal (e.g. a preliminary reply); keep waiting.
    Wait,
    /// Send a follow-up command (e.g. PASS after 331) and keep waiting.
    Send(String),
    /// Reject with a protocol error built from this reply.
    Reject,
}

/// The control channel: owns the control socket and serializes
/// request/reply exchanges over it.
pub struct ControlChannel {
    reader: ReadHalf,
    writer: WriteHalf,
    /// Idle timeout per awaited reply. Zero disables the timer.
    timeout: Duration,
    closed: bool,
}

impl ControlChannel {
    /// Create a channel from a plain TCP stream.
    pub fn from_tcp(stream: TcpStream, timeout: Duration) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
            timeout,
            closed: false,
        }
    }

    /// Create a channel from a TLS-wrapped TCP stream.
    pub fn from_tls(stream: TlsStream<TcpStream>, timeout: Duration) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
            timeout,
            closed: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the session dead. Every later call fails with a
    /// client-closed error and no wire I/O happens.
    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Tear the channel apart for a TLS upgrade.
    pub(crate) fn into_halves(self) -> (ReadHalf, WriteHalf) {
        (self.reader, self.writer)
    }

    /// Send a raw command line (CRLF is appended here).
    ///
    /// Low-level injection point for handlers that must emit follow-ups.
    pub async fn send(&mut self, cmd: &str) -> FtpResult<()> {
        if self.closed {
            return Err(FtpError::closed());
        }
        log::trace!(">>> {}", mask_command(cmd));
        let line = format!("{}\r\n", cmd);
        let written = match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(line.as_bytes()).await,
            WriteHalf::Tls(w) => w.write_all(line.as_bytes()).await,
        };
        if let Err(e) = written {
            self.closed = true;
            return Err(FtpError::transport(format!("Control write: {}", e)));
        }
        Ok(())
    }

    /// Await the next complete reply, honoring the idle timer.
    ///
    /// Timeouts and transport errors mark the session closed before they
    /// propagate; so does a reply that cannot be framed, since the byte
    /// stream is unsynchronized after it.
    pub async fn read_reply(&mut self) -> FtpResult<Reply> {
        if self.closed {
            return Err(FtpError::closed());
        }
        let assemble = async {
            match &mut self.reader {
                ReadHalf::Plain(r) => assemble_reply(r).await,
                ReadHalf::Tls(r) => assemble_reply(r).await,
            }
        };
        let result = if self.timeout.is_zero() {
            assemble.await
        } else {
            match tokio::time::timeout(self.timeout, assemble).await {
                Ok(r) => r,
                Err(_) => Err(FtpError::timeout("Control connection idle timeout")),
            }
        };
        match result {
            Ok(reply) => {
                log::trace!(
                    "<<< {} {}",
                    reply.code,
                    reply.lines.last().map(String::as_str).unwrap_or("")
                );
                Ok(reply)
            }
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    /// Send a command and return the next reply, whatever its code.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<Reply> {
        self.send(cmd).await?;
        self.read_reply().await
    }

    /// Generalized task: optionally send a command, then feed every
    /// incoming reply to `handler` until it resolves or rejects.
    pub async fn handle<F>(&mut self, cmd: Option<&str>, mut handler: F) -> FtpResult<Reply>
    where
        F: FnMut(&Reply) -> TaskAction,
    {
        if self.closed {
            return Err(FtpError::closed());
        }
        if let Some(cmd) = cmd {
            self.send(cmd).await?;
        }
        loop {
            let reply = self.read_reply().await?;
            match handler(&reply) {
                TaskAction::Resolve => return Ok(reply),
                TaskAction::Wait => {}
                TaskAction::Send(follow_up) => self.send(&follow_up).await?,
                TaskAction::Reject => {
                    return Err(FtpError::protocol(reply.code, reply.text()));
                }
            }
        }
    }

    /// Send a command with the default handler: resolve on positive
    /// completion, keep waiting through preliminary replies, reject on
    /// anything else.
    pub async fn request(&mut self, cmd: &str) -> FtpResult<Reply> {
        self.handle(Some(cmd), |reply| {
            if reply.is_completion() {
                TaskAction::Resolve
            } else if reply.is_preliminary() {
                TaskAction::Wait
            } else {
                TaskAction::Reject
            }
        })
        .await
    }
}

/// Hide credentials from the command trace.
fn mask_command(cmd: &str) -> String {
    match cmd.split_once(' ') {
        Some(("PASS", _)) => "PASS ***".to_string(),
        _ => cmd.to_string(),
    }
}

/// Assemble one complete reply from the control byte stream.
///
/// Framing rule: a reply begins with three decimal digits. If the fourth
/// byte is `-` the reply is multi-line and continues until a line begins
/// with the same three digits followed by a space. The full body text is
/// preserved so upper layers can extract payloads (PWD path, SIZE
/// number, FEAT feature lines).
async fn assemble_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> FtpResult<Reply> {
    let first = read_line(reader).await?;
    let code = parse_code(&first)?;
    let mut lines = vec![first.clone()];

    let is_multi = first.len() >= 4 && first.as_bytes()[3] == b'-';
    if is_multi {
        let terminator = format!("{} ", code);
        loop {
            let next = read_line(reader).await?;
            let done = next.starts_with(&terminator);
            lines.push(next);
            if done {
                break;
            }
        }
    }

    Ok(Reply { code, lines })
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> FtpResult<String> {
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).await?;
    if n == 0 {
        return Err(FtpError::transport("Server closed control connection"));
    }
    Ok(buf.trim_end_matches(['\r', '\n']).to_string())
}

/// Parse and validate the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    let code = line
        .get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| FtpError::parse(format!("Invalid reply code in: '{}'", line)))?;
    if !(100..600).contains(&code) {
        return Err(FtpError::parse(format!("Reply code out of range: {}", code)));
    }
    Ok(code)
}
