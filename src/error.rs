//! Categorised error type for the FTP client.
//!
//! Five kinds, matching how failures propagate:
//! - `Protocol` — the server said no (4xx/5xx); the session stays usable.
//! - `Transport` — socket or TLS failure; the session is dead.
//! - `Timeout` — idle timer expired; the session is dead.
//! - `Parse` — a reply payload could not be interpreted; session usable.
//! - `Closed` — operation attempted after `close()`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FtpErrorKind {
    /// Negative reply (4xx/5xx) to a command whose handler did not
    /// tolerate it.
    Protocol,
    /// Socket I/O or TLS handshake failure. Fatal to the session.
    Transport,
    /// Idle timeout expired. Fatal to the session.
    Timeout,
    /// A reply whose payload could not be interpreted.
    Parse,
    /// The client was closed; no wire I/O was attempted.
    Closed,
}

pub type FtpResult<T> = Result<T, FtpError>;

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    /// Protocol error carrying the offending reply code.
    pub fn protocol(code: u16, msg: impl Into<String>) -> Self {
        Self {
            kind: FtpErrorKind::Protocol,
            message: msg.into(),
            code: Some(code),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Transport, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Parse, msg)
    }

    pub fn closed() -> Self {
        Self::new(FtpErrorKind::Closed, "Client is closed")
    }

    /// Whether this error ends the session (transport and timeout do,
    /// protocol and parse errors leave it usable).
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, FtpErrorKind::Transport | FtpErrorKind::Timeout)
    }

    /// Whether this is a 5xx protocol error — used by the passive-mode
    /// probe and the listing-command discovery to fall through to the
    /// next candidate.
    pub fn is_permanent_negative(&self) -> bool {
        self.kind == FtpErrorKind::Protocol
            && matches!(self.code, Some(c) if (500..600).contains(&c))
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message),
            None => write!(f, "[FTP {:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::transport(e.to_string())
        }
    }
}

impl From<native_tls::Error> for FtpError {
    fn from(e: native_tls::Error) -> Self {
        Self::transport(format!("TLS: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_negative() {
        assert!(FtpError::protocol(502, "Command not implemented").is_permanent_negative());
        assert!(!FtpError::protocol(450, "Try again").is_permanent_negative());
        assert!(!FtpError::timeout("idle").is_permanent_negative());
    }

    #[test]
    fn test_fatal() {
        assert!(FtpError::transport("reset").is_fatal());
        assert!(FtpError::timeout("idle").is_fatal());
        assert!(!FtpError::protocol(550, "No such file").is_fatal());
        assert!(!FtpError::parse("bad SIZE").is_fatal());
    }
}
