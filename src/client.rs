//! Stateful FTP client — owns the control channel and exposes session
//! operations.
//!
//! Lifecycle: `connect()` (or `access()`) → optional TLS upgrade →
//! `login()` → `use_default_settings()` → commands and transfers.
//! `close()` poisons the session; a later `connect()` starts a fresh one.
//!
//! The client also carries the two per-session policy cells: the passive
//! mode chosen by the first successful probe, and the listing command
//! that survived discovery.

use crate::connection;
use crate::error::{FtpError, FtpErrorKind, FtpResult};
use crate::parser;
use crate::progress::{NoopProgress, ProgressSink};
use crate::protocol::{ControlChannel, TaskAction};
use crate::tls::{self, TlsOptions};
use crate::transfer::{self, DataStream, PassiveMode, PASSIVE_PROBE_ORDER};
use crate::types::{
    AccessOptions, DownloadOptions, Features, FileInfo, Reply, UploadOptions,
};
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_list_candidates() -> Vec<String> {
    vec!["MLSD".into(), "LIST -a".into(), "LIST".into()]
}

/// An FTP/FTPS client session.
pub struct FtpClient {
    channel: Option<ControlChannel>,
    host: String,
    timeout: Duration,
    /// Captured by `use_tls`, mirrored onto every data socket.
    tls_options: Option<TlsOptions>,
    /// First passive strategy the server accepted; probed lazily.
    passive_mode: Option<PassiveMode>,
    /// Listing commands still in the running; shrinks to the winner.
    list_candidates: Vec<String>,
    features: Option<Features>,
    welcome: Option<Reply>,
    progress: Box<dyn ProgressSink>,
    bytes_uploaded: u64,
    bytes_downloaded: u64,
}

impl Default for FtpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FtpClient {
    /// Create a disconnected client with the default timeout.
    pub fn new() -> Self {
        Self {
            channel: None,
            host: String::new(),
            timeout: DEFAULT_TIMEOUT,
            tls_options: None,
            passive_mode: None,
            list_candidates: default_list_candidates(),
            features: None,
            welcome: None,
            progress: Box::new(NoopProgress),
            bytes_uploaded: 0,
            bytes_downloaded: 0,
        }
    }

    /// Set the idle timeout applied to every control reply and data
    /// socket operation. Zero disables the timer.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(channel) = &mut self.channel {
            channel.set_timeout(timeout);
        }
    }

    /// Install a progress sink for transfers. Listings never report.
    pub fn set_progress_sink(&mut self, sink: Box<dyn ProgressSink>) {
        self.progress = sink;
    }

    /// The welcome banner from the current session, if connected.
    pub fn welcome(&self) -> Option<&Reply> {
        self.welcome.as_ref()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    /// Whether the session is connected and usable.
    pub fn is_connected(&self) -> bool {
        matches!(&self.channel, Some(c) if !c.is_closed())
    }

    fn channel(&mut self) -> FtpResult<&mut ControlChannel> {
        match self.channel.as_mut() {
            Some(c) if !c.is_closed() => Ok(c),
            _ => Err(FtpError::closed()),
        }
    }

    // ─── Session lifecycle ───────────────────────────────────────

    /// Open the control connection and await the 220 welcome. Resets
    /// all per-session state (a second call starts a fresh session).
    pub async fn connect(&mut self, host: &str, port: u16) -> FtpResult<Reply> {
        self.channel = None;
        self.tls_options = None;
        self.passive_mode = None;
        self.list_candidates = default_list_candidates();
        self.features = None;
        self.welcome = None;
        self.bytes_uploaded = 0;
        self.bytes_downloaded = 0;

        let (channel, welcome) = connection::open(host, port, self.timeout).await?;
        self.channel = Some(channel);
        self.host = host.to_string();
        self.welcome = Some(welcome.clone());
        Ok(welcome)
    }

    /// Upgrade the control channel to TLS via `AUTH TLS` and record the
    /// options for later data-socket upgrades.
    pub async fn use_tls(&mut self, options: TlsOptions) -> FtpResult<Reply> {
        self.use_tls_with_command("AUTH TLS", options).await
    }

    /// Same as [`use_tls`](Self::use_tls) with a custom upgrade command
    /// (e.g. `AUTH SSL` for legacy servers).
    pub async fn use_tls_with_command(
        &mut self,
        command: &str,
        options: TlsOptions,
    ) -> FtpResult<Reply> {
        let reply = self.channel()?.request(command).await?;

        // A failed handshake leaves the channel consumed: session dead.
        let plain = self.channel.take().ok_or_else(FtpError::closed)?;
        let upgraded = tls::upgrade_control(plain, &self.host, &options).await?;
        self.channel = Some(upgraded);
        self.tls_options = Some(options);
        log::info!("Control channel upgraded to TLS");
        Ok(reply)
    }

    /// Log in with USER/PASS. Accepts a 230 straight after USER for
    /// servers that don't want a password; rejects a 332 ACCT demand.
    pub async fn login(&mut self, user: &str, password: &str) -> FtpResult<Reply> {
        log::info!("Login as {}", user);
        let pass_line = format!("PASS {}", password);
        self.channel()?
            .handle(Some(&format!("USER {}", user)), move |reply| {
                if reply.is_preliminary() {
                    TaskAction::Wait
                } else if reply.code == 331 {
                    TaskAction::Send(pass_line.clone())
                } else if reply.is_completion() {
                    TaskAction::Resolve
                } else {
                    TaskAction::Reject
                }
            })
            .await
    }

    /// Apply sensible session defaults: binary type, file structure,
    /// UTF-8, an MLST fact set, and data-channel protection when the
    /// session is secure. Safe to call repeatedly.
    pub async fn use_default_settings(&mut self) -> FtpResult<()> {
        self.channel()?.request("TYPE I").await?;
        self.send_ignoring_error("STRU F").await?;
        self.send_ignoring_error("OPTS UTF8 ON").await?;
        self.send_ignoring_error("OPTS MLST type;size;modify;unix.mode;unix.owner;unix.group;")
            .await?;
        if self.tls_options.is_some() {
            self.send_ignoring_error("PBSZ 0").await?;
            self.send_ignoring_error("PROT P").await?;
        }
        Ok(())
    }

    /// One-call session setup: connect, optional TLS, login, defaults.
    /// Resolves with the welcome banner.
    pub async fn access(&mut self, options: &AccessOptions) -> FtpResult<Reply> {
        let welcome = self.connect(&options.host, options.port).await?;
        if options.secure {
            self.use_tls(options.secure_options.clone()).await?;
        }
        self.login(&options.user, &options.password).await?;
        self.use_default_settings().await?;
        Ok(welcome)
    }

    /// Send QUIT (best effort) and poison the session. Every later
    /// operation fails with a client-closed error and no wire I/O.
    pub async fn close(&mut self) -> FtpResult<()> {
        if let Some(channel) = &mut self.channel {
            if !channel.is_closed() {
                let _ = channel.execute("QUIT").await;
                channel.mark_closed();
            }
        }
        self.channel = None;
        Ok(())
    }

    // ─── Simple commands ─────────────────────────────────────────

    /// Send a command, downgrading protocol errors to their reply so
    /// informational commands can fail without failing the caller.
    /// Transport and timeout errors still propagate.
    pub async fn send_ignoring_error(&mut self, command: &str) -> FtpResult<Reply> {
        match self.channel()?.request(command).await {
            Ok(reply) => Ok(reply),
            Err(e) if e.kind == FtpErrorKind::Protocol => Ok(Reply {
                code: e.code.unwrap_or(0),
                lines: e.message.lines().map(str::to_string).collect(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Current working directory, parsed from the quoted 257 payload.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let reply = self.channel()?.request("PWD").await?;
        parse_pwd(&reply.text())
    }

    /// Change the working directory.
    pub async fn cd(&mut self, path: &str) -> FtpResult<Reply> {
        let path = self.protect_whitespace(path).await?;
        self.channel()?.request(&format!("CWD {}", path)).await
    }

    /// Move to the parent directory.
    pub async fn cdup(&mut self) -> FtpResult<Reply> {
        self.channel()?.request("CDUP").await
    }

    /// Send a NOOP keepalive.
    pub async fn noop(&mut self) -> FtpResult<Reply> {
        self.channel()?.request("NOOP").await
    }

    /// Server system type (SYST payload).
    pub async fn system(&mut self) -> FtpResult<String> {
        let reply = self.channel()?.request("SYST").await?;
        Ok(payload(&reply).trim().to_string())
    }

    /// Capability map from FEAT, probed once per session. Servers that
    /// reject FEAT yield an empty map.
    pub async fn features(&mut self) -> FtpResult<Features> {
        if let Some(features) = &self.features {
            return Ok(features.clone());
        }
        let reply = self.send_ignoring_error("FEAT").await?;
        let features = parse_features(&reply);
        self.features = Some(features.clone());
        Ok(features)
    }

    /// Modification time of a remote file (MDTM).
    pub async fn last_mod(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        let path = self.protect_whitespace(path).await?;
        let reply = self.channel()?.request(&format!("MDTM {}", path)).await?;
        let text = payload(&reply);
        parser::parse_mlsx_time(text)
            .ok_or_else(|| FtpError::parse(format!("Cannot parse MDTM reply: {}", reply.text())))
    }

    /// Size of a remote file in bytes (SIZE).
    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let path = self.protect_whitespace(path).await?;
        let reply = self.channel()?.request(&format!("SIZE {}", path)).await?;
        payload(&reply)
            .trim()
            .parse::<u64>()
            .map_err(|_| FtpError::parse(format!("Cannot parse SIZE reply: {}", reply.text())))
    }

    /// Rename (or move) a file or directory: RNFR then RNTO.
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<Reply> {
        let from = self.protect_whitespace(from).await?;
        let to = self.protect_whitespace(to).await?;
        self.channel()?
            .handle(Some(&format!("RNFR {}", from)), |reply| {
                if reply.is_preliminary() {
                    TaskAction::Wait
                } else if reply.is_intermediate() || reply.is_completion() {
                    TaskAction::Resolve
                } else {
                    TaskAction::Reject
                }
            })
            .await?;
        self.channel()?.request(&format!("RNTO {}", to)).await
    }

    /// Delete a remote file.
    pub async fn remove(&mut self, path: &str) -> FtpResult<Reply> {
        let path = self.protect_whitespace(path).await?;
        self.channel()?.request(&format!("DELE {}", path)).await
    }

    /// Remove an empty remote directory.
    pub async fn remove_empty_dir(&mut self, path: &str) -> FtpResult<Reply> {
        let path = self.protect_whitespace(path).await?;
        self.channel()?.request(&format!("RMD {}", path)).await
    }

    /// Create a remote directory, returning the created path when the
    /// server quotes it in the 257 reply.
    pub async fn mkdir(&mut self, path: &str) -> FtpResult<String> {
        let path = self.protect_whitespace(path).await?;
        let reply = self.channel()?.request(&format!("MKD {}", path)).await?;
        Ok(parse_pwd(&reply.text()).unwrap_or(path))
    }

    // ─── Listings ────────────────────────────────────────────────

    /// List a remote directory (the working directory when `path` is
    /// `None`).
    ///
    /// Discovery: `MLSD`, `LIST -a`, `LIST` are tried in order; a 5xx
    /// reply falls through to the next candidate, anything else aborts.
    /// The first command that works becomes the sole candidate for the
    /// rest of the session.
    pub async fn list(&mut self, path: Option<&str>) -> FtpResult<Vec<FileInfo>> {
        let path = match path {
            Some(p) => Some(self.protect_whitespace(p).await?),
            None => None,
        };

        let candidates = self.list_candidates.clone();
        let mut last_err = None;
        for command in candidates {
            let command_line = match &path {
                Some(p) => format!("{} {}", command, p),
                None => command.clone(),
            };
            match self.retrieve_listing(&command_line).await {
                Ok(text) => {
                    self.list_candidates = vec![command];
                    return Ok(parser::parse_listing(&text));
                }
                Err(e) if e.is_permanent_negative() => {
                    log::debug!("Listing command {} rejected, trying next", command);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| FtpError::protocol(502, "No listing command accepted")))
    }

    /// Open a data connection, run one listing command, and collect the
    /// body. Listing bytes are never reported to the progress sink.
    async fn retrieve_listing(&mut self, command_line: &str) -> FtpResult<String> {
        let data = self.prepare_transfer().await?;
        let channel = self.channel.as_mut().ok_or_else(FtpError::closed)?;
        let mut body = Vec::new();
        let mut noop = NoopProgress;
        transfer::download(channel, data, command_line, command_line, &mut body, &mut noop)
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    // ─── Transfers ───────────────────────────────────────────────

    /// Upload from an async reader to a remote path (STOR).
    pub async fn upload_from<R>(&mut self, source: &mut R, remote_path: &str) -> FtpResult<Reply>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.store_stream(source, "STOR", remote_path, None).await
    }

    /// Append from an async reader to a remote path (APPE).
    pub async fn append_from<R>(&mut self, source: &mut R, remote_path: &str) -> FtpResult<Reply>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.store_stream(source, "APPE", remote_path, None).await
    }

    /// Upload a local file (STOR), honoring the byte range in `options`.
    pub async fn upload_file(
        &mut self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        options: UploadOptions,
    ) -> FtpResult<Reply> {
        let (mut file, limit) = open_upload_source(local_path.as_ref(), options).await?;
        self.store_stream(&mut file, "STOR", remote_path, limit).await
    }

    /// Append a local file to a remote path (APPE).
    pub async fn append_file(
        &mut self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        options: UploadOptions,
    ) -> FtpResult<Reply> {
        let (mut file, limit) = open_upload_source(local_path.as_ref(), options).await?;
        self.store_stream(&mut file, "APPE", remote_path, limit).await
    }

    async fn store_stream<R>(
        &mut self,
        source: &mut R,
        command: &str,
        remote_path: &str,
        limit: Option<u64>,
    ) -> FtpResult<Reply>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let remote = self.protect_whitespace(remote_path).await?;
        let data = self.prepare_transfer().await?;
        let channel = self.channel.as_mut().ok_or_else(FtpError::closed)?;
        let command_line = format!("{} {}", command, remote);

        let mut progress = std::mem::replace(&mut self.progress, Box::new(NoopProgress));
        let result = transfer::upload(
            channel,
            data,
            &command_line,
            &remote,
            source,
            limit,
            progress.as_mut(),
        )
        .await;
        self.progress = progress;

        let (reply, transferred) = result?;
        self.bytes_uploaded += transferred;
        Ok(reply)
    }

    /// Download a remote file into an async writer (RETR), resuming at
    /// `remote_start` via REST when it is non-zero.
    pub async fn download_to<W>(
        &mut self,
        destination: &mut W,
        remote_path: &str,
        remote_start: u64,
    ) -> FtpResult<Reply>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let remote = self.protect_whitespace(remote_path).await?;
        let data = self.prepare_transfer().await?;

        if remote_start > 0 {
            self.channel()?
                .handle(Some(&format!("REST {}", remote_start)), |reply| {
                    if reply.is_preliminary() {
                        TaskAction::Wait
                    } else if reply.is_intermediate() {
                        TaskAction::Resolve
                    } else {
                        TaskAction::Reject
                    }
                })
                .await?;
        }

        let channel = self.channel.as_mut().ok_or_else(FtpError::closed)?;
        let command_line = format!("RETR {}", remote);

        let mut progress = std::mem::replace(&mut self.progress, Box::new(NoopProgress));
        let result = transfer::download(
            channel,
            data,
            &command_line,
            &remote,
            destination,
            progress.as_mut(),
        )
        .await;
        self.progress = progress;

        let (reply, transferred) = result?;
        self.bytes_downloaded += transferred;
        Ok(reply)
    }

    /// Download a remote file to a local path, honoring the offsets in
    /// `options` (REST resume and local write offset).
    pub async fn download_file(
        &mut self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
        options: DownloadOptions,
    ) -> FtpResult<Reply> {
        let local_path = local_path.as_ref();
        let mut file = if options.local_start > 0 {
            let mut f = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .open(local_path)
                .await?;
            f.seek(SeekFrom::Start(options.local_start)).await?;
            f
        } else {
            if let Some(parent) = local_path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await?;
                }
            }
            fs::File::create(local_path).await?
        };
        self.download_to(&mut file, remote_path, options.remote_start)
            .await
    }

    /// Open a fresh passive data socket for the next transfer.
    ///
    /// The first call probes EPSV then PASV; a 5xx reply moves to the
    /// next strategy, anything else aborts. The winning strategy is
    /// cached and reused without probing for the rest of the session.
    pub(crate) async fn prepare_transfer(&mut self) -> FtpResult<DataStream> {
        let host = self.host.clone();
        let tls_options = self.tls_options.clone();

        if let Some(mode) = self.passive_mode {
            return transfer::open_passive(self.channel()?, mode, &host, tls_options.as_ref())
                .await;
        }

        let mut last_err = None;
        for mode in PASSIVE_PROBE_ORDER {
            match transfer::open_passive(self.channel()?, mode, &host, tls_options.as_ref())
                .await
            {
                Ok(data) => {
                    self.passive_mode = Some(mode);
                    return Ok(data);
                }
                Err(e) if e.is_permanent_negative() => {
                    log::debug!("{} not supported, trying next strategy", mode.command());
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err
            .unwrap_or_else(|| FtpError::protocol(502, "No supported passive mode")))
    }

    // ─── Path handling ───────────────────────────────────────────

    /// FTP commands are space-delimited; a path with a leading space
    /// would be truncated by many servers. Such paths are rewritten as
    /// absolute by prefixing the current working directory.
    pub(crate) async fn protect_whitespace(&mut self, path: &str) -> FtpResult<String> {
        if !path.starts_with(' ') {
            return Ok(path.to_string());
        }
        let cwd = self.pwd().await?;
        Ok(join_cwd(&cwd, path))
    }
}

/// Extract the text after the reply code of the first line
/// (e.g. `213 20260101120000` → `20260101120000`).
fn payload(reply: &Reply) -> &str {
    let line = reply.lines.first().map(String::as_str).unwrap_or("");
    line.get(4..).unwrap_or("")
}

/// Parse the first `"..."` group out of a 257-style reply.
fn parse_pwd(text: &str) -> FtpResult<String> {
    if let Some(start) = text.find('"') {
        if let Some(end) = text[start + 1..].find('"') {
            return Ok(text[start + 1..start + 1 + end].to_string());
        }
    }
    Err(FtpError::parse(format!("No quoted path in reply: {}", text)))
}

/// Parse a multi-line FEAT body into the capability map. Lines 2..n−1
/// each carry a feature: first token is the command, the remainder is
/// the parameter hint.
fn parse_features(reply: &Reply) -> Features {
    let mut features = Features::new();
    if reply.code != 211 || !reply.is_multiline() {
        return features;
    }
    for line in &reply.lines[1..reply.lines.len() - 1] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, hint) = match line.split_once(' ') {
            Some((name, hint)) => (name, hint.trim()),
            None => (line, ""),
        };
        features.insert(name.to_uppercase(), hint.to_string());
    }
    features
}

fn join_cwd(cwd: &str, path: &str) -> String {
    if cwd.ends_with('/') {
        format!("{}{}", cwd, path)
    } else {
        format!("{}/{}", cwd, path)
    }
}

/// Open a local file for upload, applying the byte-range options.
/// Returns the positioned file and the byte limit, if any.
async fn open_upload_source(
    path: &Path,
    options: UploadOptions,
) -> FtpResult<(fs::File, Option<u64>)> {
    let mut file = fs::File::open(path).await?;
    let start = options.local_start.unwrap_or(0);
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let limit = match options.local_end_inclusive {
        Some(end) if end < start => {
            return Err(FtpError::parse(format!(
                "localEndInclusive {} is before localStart {}",
                end, start
            )))
        }
        Some(end) => Some(end - start + 1),
        None => None,
    };
    Ok((file, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pwd() {
        assert_eq!(
            parse_pwd("257 \"/home/user\" is current directory.").unwrap(),
            "/home/user"
        );
        let err = parse_pwd("257 bad").unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::Parse);
    }

    #[test]
    fn test_parse_features() {
        let reply = Reply {
            code: 211,
            lines: vec![
                "211-Features:".into(),
                " MLSD".into(),
                " SIZE".into(),
                " UTF8".into(),
                " REST STREAM".into(),
                "211 End".into(),
            ],
        };
        let features = parse_features(&reply);
        assert_eq!(features.len(), 4);
        assert_eq!(features.get("MLSD").map(String::as_str), Some(""));
        assert_eq!(features.get("REST").map(String::as_str), Some("STREAM"));
    }

    #[test]
    fn test_parse_features_rejected() {
        let reply = Reply {
            code: 502,
            lines: vec!["502 Not implemented".into()],
        };
        assert!(parse_features(&reply).is_empty());
    }

    #[test]
    fn test_join_cwd() {
        assert_eq!(join_cwd("/work", " odd.txt"), "/work/ odd.txt");
        assert_eq!(join_cwd("/", " odd.txt"), "/ odd.txt");
    }

    #[test]
    fn test_payload() {
        let reply = Reply {
            code: 213,
            lines: vec!["213 4096".into()],
        };
        assert_eq!(payload(&reply), "4096");
        let short = Reply {
            code: 200,
            lines: vec!["200".into()],
        };
        assert_eq!(payload(&short), "");
    }
}
