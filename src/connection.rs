//! TCP transport — establishes the FTP control connection.

use crate::error::{FtpError, FtpResult};
use crate::protocol::ControlChannel;
use crate::types::Reply;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Open the control connection and return a ready channel **plus** the
/// server welcome banner (a 220 completion, possibly preceded by 1xx
/// "please wait" replies which are skipped).
pub async fn open(
    host: &str,
    port: u16,
    idle_timeout: Duration,
) -> FtpResult<(ControlChannel, Reply)> {
    let addr = format!("{}:{}", host, port);

    let connect = TcpStream::connect(&addr);
    let tcp = if idle_timeout.is_zero() {
        connect.await
    } else {
        timeout(idle_timeout, connect)
            .await
            .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
    }
    .map_err(|e| FtpError::transport(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    log::info!("Connected to {}", addr);

    let mut channel = ControlChannel::from_tcp(tcp, idle_timeout);
    let welcome = loop {
        let reply = channel.read_reply().await?;
        if reply.is_preliminary() {
            continue;
        }
        if !reply.is_completion() {
            return Err(FtpError::protocol(reply.code, reply.text()));
        }
        break reply;
    };
    Ok((channel, welcome))
}
