//! Shared types for the FTP client crate.

use crate::tls::TlsOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Replies ─────────────────────────────────────────────────────────

/// A single FTP reply (may be multi-line).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Full reply text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Whether this is a positive-preliminary reply (1xx).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Whether this is a positive-completion reply (2xx).
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Whether this is a positive-intermediate reply (3xx).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Whether this is a transient-negative reply (4xx).
    pub fn is_transient_negative(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// Whether this is a permanent-negative reply (5xx).
    pub fn is_permanent_negative(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Whether the reply body spans more than one line.
    pub fn is_multiline(&self) -> bool {
        self.lines.len() > 1
    }
}

// ─── Session configuration ───────────────────────────────────────────

/// Options for [`crate::FtpClient::access`] — the one-call session setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Upgrade the control channel via AUTH TLS before logging in.
    #[serde(default)]
    pub secure: bool,
    /// TLS parameters used for the control upgrade and every data socket.
    #[serde(default)]
    pub secure_options: TlsOptions,
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    21
}
fn default_user() -> String {
    "anonymous".into()
}
fn default_password() -> String {
    "guest".into()
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
            secure: false,
            secure_options: Default::default(),
        }
    }
}

/// Byte-range selection for uploads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    /// First byte of the local source to send.
    pub local_start: Option<u64>,
    /// Last byte of the local source to send, inclusive.
    pub local_end_inclusive: Option<u64>,
}

/// Offsets for downloads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    /// Remote byte offset to resume from (sent as `REST`).
    pub remote_start: u64,
    /// Local byte offset to start writing at.
    pub local_start: u64,
}

// ─── Directory listings ──────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry from a directory listing (parsed from LIST or MLSD output).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub kind: FileKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub link_target: Option<String>,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// FEAT capability map: command name → parameter hint (often empty).
pub type Features = HashMap<String, String>;

// ─── Transfers ───────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}
