//! # ftpkit — async FTP/FTPS client
//!
//! Implementation of the FTP protocol (RFC 959) client side, with
//! extensions:
//! - **RFC 4217** — explicit FTPS (AUTH TLS, PBSZ, PROT)
//! - **RFC 3659** — MLSD/MLST, SIZE, MDTM, REST
//! - **RFC 2389** — FEAT negotiation
//! - **RFC 2428** — EPSV extended passive mode
//!
//! Architecture:
//! - `types` — replies, options, listing entries
//! - `error` — categorised error type
//! - `protocol` — control channel: command/reply exchange, multi-line
//!   assembly, per-task handlers, idle timeout
//! - `connection` — TCP transport and welcome banner
//! - `tls` — explicit-FTPS upgrade for control and data sockets
//! - `transfer` — passive data channels and the byte-pumping engine
//! - `progress` — transfer progress sink
//! - `parser` — LIST/MLSD listing and MLSx timestamp parsing
//! - `client` — the [`FtpClient`] facade
//! - `dirops` — recursive directory mirror/clear helpers
//!
//! ```no_run
//! use ftpkit::{AccessOptions, FtpClient};
//!
//! # async fn example() -> ftpkit::FtpResult<()> {
//! let mut client = FtpClient::new();
//! client
//!     .access(&AccessOptions {
//!         host: "ftp.example.com".into(),
//!         user: "demo".into(),
//!         password: "password".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! for entry in client.list(None).await? {
//!     println!("{}", entry.name);
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod dirops;
pub mod error;
pub mod parser;
pub mod progress;
pub mod protocol;
pub mod tls;
pub mod transfer;
pub mod types;

pub use client::FtpClient;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use progress::{LogProgress, NoopProgress, ProgressSink, TransferInfo};
pub use tls::TlsOptions;
pub use transfer::PassiveMode;
pub use types::{
    AccessOptions, DownloadOptions, Features, FileInfo, FileKind, Reply, TransferDirection,
    UploadOptions,
};
