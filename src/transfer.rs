//! Data-channel coordination and the transfer engine.
//!
//! Passive modes only (RFC 959 PASV + RFC 2428 EPSV): the server opens
//! a port and we connect to it. The opened socket mirrors the control
//! channel's TLS state — if the session captured TLS options at upgrade
//! time, every data socket is wrapped with them before use.
//!
//! The engine resolves a transfer only after the preliminary reply was
//! seen, the data socket is fully closed, and a positive completion
//! arrived on control. The pump always closes the data socket before
//! reading the completion reply, so a completion that raced ahead just
//! waits in the control socket's buffer until then.

use crate::error::{FtpError, FtpResult};
use crate::progress::{ProgressSink, TransferInfo};
use crate::protocol::{ControlChannel, TaskAction};
use crate::tls::{self, TlsOptions};
use crate::types::{Reply, TransferDirection};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;

/// Chunk size for streaming transfers (64 KiB). Progress is reported
/// once per chunk, never per byte.
const CHUNK_SIZE: usize = 65_536;

lazy_static! {
    static ref PASV_RE: Regex = Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").unwrap();
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d+)\|").unwrap();
}

// ─── Passive-mode strategies ─────────────────────────────────────────

/// A passive-mode negotiation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PassiveMode {
    /// Extended passive (RFC 2428) — IPv6-safe, reuses the control host.
    Epsv,
    /// Classic IPv4 passive (RFC 959).
    Pasv,
}

impl PassiveMode {
    pub(crate) fn command(self) -> &'static str {
        match self {
            PassiveMode::Epsv => "EPSV",
            PassiveMode::Pasv => "PASV",
        }
    }
}

/// Probe order at session init. The first strategy the server accepts
/// is cached on the client and used directly thereafter.
pub(crate) const PASSIVE_PROBE_ORDER: [PassiveMode; 2] = [PassiveMode::Epsv, PassiveMode::Pasv];

/// Abstraction over a plain or TLS-wrapped data socket. Transient:
/// created per transfer, consumed by exactly one transfer.
pub enum DataStream {
    Plain(TcpStream),
    Tls(tokio_native_tls::TlsStream<TcpStream>),
}

impl AsyncRead for DataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            DataStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DataStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DataStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DataStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Negotiate a data socket with the given strategy and connect to it,
/// mirroring the control channel's TLS state.
pub(crate) async fn open_passive(
    ctrl: &mut ControlChannel,
    mode: PassiveMode,
    host: &str,
    tls_options: Option<&TlsOptions>,
) -> FtpResult<DataStream> {
    let reply = ctrl.request(mode.command()).await?;

    let addr = match mode {
        PassiveMode::Epsv => {
            let port = parse_epsv_reply(&reply.text())?;
            format!("{}:{}", host, port)
        }
        PassiveMode::Pasv => parse_pasv_reply(&reply.text())?.to_string(),
    };

    let data_timeout = ctrl.timeout();
    let tcp = timed(data_timeout, "Data connect", TcpStream::connect(&addr))
        .await
        .map_err(|e| match e.kind {
            crate::error::FtpErrorKind::Timeout => e,
            _ => FtpError::transport(format!("Data connect to {}: {}", addr, e.message)),
        })?;
    tcp.set_nodelay(true).ok();

    match tls_options {
        Some(options) => Ok(DataStream::Tls(tls::wrap_data(tcp, host, options).await?)),
        None => Ok(DataStream::Plain(tcp)),
    }
}

/// Parse `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub(crate) fn parse_pasv_reply(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::parse(format!("Cannot parse PASV reply: {}", text)))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::parse("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

/// Parse `229 Entering Extended Passive Mode (|||port|)`.
pub(crate) fn parse_epsv_reply(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::parse(format!("Cannot parse EPSV reply: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::parse("EPSV port out of range"))
}

// ─── Transfer engine ─────────────────────────────────────────────────

/// Run an upload: send the full command line (`STOR path` / `APPE path`)
/// on control, wait for the preliminary reply, pump `source` into the
/// data socket, half-close it so the server observes EOF, then await the
/// positive completion.
///
/// `limit` caps the number of bytes sent (for byte-range uploads).
pub(crate) async fn upload<R>(
    ctrl: &mut ControlChannel,
    mut data: DataStream,
    command_line: &str,
    remote_path: &str,
    source: &mut R,
    limit: Option<u64>,
    progress: &mut dyn ProgressSink,
) -> FtpResult<(Reply, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    start_transfer(ctrl, command_line).await?;

    progress.start(&TransferInfo {
        name: remote_path.to_string(),
        direction: TransferDirection::Upload,
    });
    let pumped = pump_upload(ctrl.timeout(), &mut data, source, limit, progress).await;
    progress.stop();

    let transferred = match pumped {
        Ok(n) => n,
        Err(e) => {
            // Stream errors mid-transfer leave the session in an
            // unknown state; partial data may remain on the server.
            ctrl.mark_closed();
            return Err(e);
        }
    };
    drop(data);

    let done = await_completion(ctrl).await?;
    Ok((done, transferred))
}

/// Run a download: send the full command line (`RETR path`, or a listing
/// command), wait for the preliminary reply, pump the data socket into
/// `destination` until the server half-closes, flush, then await the
/// positive completion.
pub(crate) async fn download<W>(
    ctrl: &mut ControlChannel,
    mut data: DataStream,
    command_line: &str,
    remote_path: &str,
    destination: &mut W,
    progress: &mut dyn ProgressSink,
) -> FtpResult<(Reply, u64)>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    start_transfer(ctrl, command_line).await?;

    progress.start(&TransferInfo {
        name: remote_path.to_string(),
        direction: TransferDirection::Download,
    });
    let pumped = pump_download(ctrl.timeout(), &mut data, destination, progress).await;
    progress.stop();

    let transferred = match pumped {
        Ok(n) => n,
        Err(e) => {
            ctrl.mark_closed();
            return Err(e);
        }
    };
    drop(data);

    let done = await_completion(ctrl).await?;
    Ok((done, transferred))
}

/// Send the transfer command and accept its opening reply. Servers
/// disagree on ordering: some send the 150/125 before accepting the
/// data connection, some after, and a few skip straight to a 2xx.
async fn start_transfer(ctrl: &mut ControlChannel, command_line: &str) -> FtpResult<()> {
    let reply = ctrl.execute(command_line).await?;
    if !reply.is_preliminary() && !reply.is_completion() {
        return Err(FtpError::protocol(reply.code, reply.text()));
    }
    Ok(())
}

/// Await the 226/250 completion reply. Resolving only here — after the
/// data socket was dropped by the caller — keeps the next task from
/// being dispatched while bytes are still in flight.
async fn await_completion(ctrl: &mut ControlChannel) -> FtpResult<Reply> {
    ctrl.handle(None, |reply| {
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

async fn pump_upload<R>(
    data_timeout: Duration,
    data: &mut DataStream,
    source: &mut R,
    limit: Option<u64>,
    progress: &mut dyn ProgressSink,
) -> FtpResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = limit;
    let mut transferred: u64 = 0;

    loop {
        let want = match remaining {
            Some(0) => break,
            Some(r) => (r.min(CHUNK_SIZE as u64)) as usize,
            None => CHUNK_SIZE,
        };
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        timed(data_timeout, "Data write", data.write_all(&buf[..n])).await?;
        transferred += n as u64;
        if let Some(r) = &mut remaining {
            *r -= n as u64;
        }
        progress.update(transferred);
    }

    timed(data_timeout, "Data flush", data.flush()).await?;
    // Half-close the write side so the server observes EOF.
    timed(data_timeout, "Data shutdown", data.shutdown()).await?;
    Ok(transferred)
}

async fn pump_download<W>(
    data_timeout: Duration,
    data: &mut DataStream,
    destination: &mut W,
    progress: &mut dyn ProgressSink,
) -> FtpResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut transferred: u64 = 0;

    loop {
        let n = timed(data_timeout, "Data read", data.read(&mut buf)).await?;
        if n == 0 {
            break;
        }
        destination.write_all(&buf[..n]).await?;
        transferred += n as u64;
        progress.update(transferred);
    }

    destination.flush().await?;
    Ok(transferred)
}

/// Apply the session's idle timer to a data-socket operation.
/// A zero duration disables the timer.
async fn timed<T, F>(dur: Duration, what: &str, fut: F) -> FtpResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    if dur.is_zero() {
        return Ok(fut.await?);
    }
    match tokio::time::timeout(dur, fut).await {
        Ok(r) => Ok(r?),
        Err(_) => Err(FtpError::timeout(format!("{} timed out", what))),
    }
}
