//! TLS upgrade helpers for explicit FTPS (RFC 4217).
//!
//! The control socket is upgraded after a positive `AUTH TLS` reply;
//! the same captured [`TlsOptions`] are reused to wrap every passive
//! data socket opened for the rest of the session.

use crate::error::{FtpError, FtpResult};
use crate::protocol::{ControlChannel, ReadHalf, WriteHalf};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};

/// TLS parameters captured when the control channel is upgraded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// Server name for SNI and certificate verification. Falls back to
    /// the control-connection host when absent.
    pub domain: Option<String>,
    /// Accept self-signed / untrusted certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Skip hostname verification.
    #[serde(default)]
    pub accept_invalid_hostnames: bool,
}

/// Build a `TlsConnector` from the captured options.
pub fn build_connector(options: &TlsOptions) -> FtpResult<TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if options.accept_invalid_certs {
        builder.danger_accept_invalid_certs(true);
    }
    if options.accept_invalid_hostnames {
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build()?;
    Ok(TlsConnector::from(connector))
}

/// Upgrade an existing **plain** control channel to TLS.
///
/// Called after a positive `AUTH TLS` reply. Consumes the plain channel,
/// performs the handshake, and returns a new channel with the same
/// timeout policy.
pub async fn upgrade_control(
    channel: ControlChannel,
    host: &str,
    options: &TlsOptions,
) -> FtpResult<ControlChannel> {
    let timeout = channel.timeout();
    let tcp = reunite_plain(channel)?;

    let domain = options.domain.clone().unwrap_or_else(|| host.to_string());
    let connector = build_connector(options)?;
    let tls = connector
        .connect(&domain, tcp)
        .await
        .map_err(|e| FtpError::transport(format!("Control TLS handshake: {}", e)))?;

    Ok(ControlChannel::from_tls(tls, timeout))
}

/// Wrap a freshly opened passive data socket in TLS.
pub async fn wrap_data(
    tcp: TcpStream,
    host: &str,
    options: &TlsOptions,
) -> FtpResult<TlsStream<TcpStream>> {
    let domain = options.domain.clone().unwrap_or_else(|| host.to_string());
    let connector = build_connector(options)?;
    connector
        .connect(&domain, tcp)
        .await
        .map_err(|e| FtpError::transport(format!("Data TLS handshake: {}", e)))
}

/// Reunite the read + write halves back into a `TcpStream`.
/// Only works when both halves are plain.
fn reunite_plain(channel: ControlChannel) -> FtpResult<TcpStream> {
    let (reader, writer) = channel.into_halves();
    let rd = match reader {
        ReadHalf::Plain(br) => br.into_inner(),
        ReadHalf::Tls(_) => {
            return Err(FtpError::transport("Cannot upgrade: channel is already TLS"))
        }
    };
    let wr = match writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => {
            return Err(FtpError::transport("Cannot upgrade: channel is already TLS"))
        }
    };
    rd.reunite(wr)
        .map_err(|e| FtpError::transport(format!("Reunite failed: {}", e)))
}
