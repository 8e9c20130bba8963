//! Recursive directory operations — mirror, clear, and create remote
//! subtrees. Compound behavior built purely from the facade primitives.
//!
//! These walk one tree while mutating the other, so they change the
//! working directory as they go and restore it where the contract says
//! so. They stop at the first unrecoverable error; partial effects are
//! left as-is.

use crate::client::FtpClient;
use crate::error::FtpResult;
use crate::types::{DownloadOptions, UploadOptions};
use std::path::Path;
use tokio::fs;

impl FtpClient {
    /// Make sure `path` exists on the server, creating missing
    /// components, and end up with it as the working directory. An
    /// absolute path starts the walk at `/`.
    pub async fn ensure_dir(&mut self, path: &str) -> FtpResult<()> {
        if path.starts_with('/') {
            self.cd("/").await?;
        }
        for name in path.split('/').filter(|s| !s.is_empty()) {
            self.open_dir(name).await?;
        }
        Ok(())
    }

    /// MKD (tolerating "already exists") followed by CWD.
    async fn open_dir(&mut self, name: &str) -> FtpResult<()> {
        self.send_ignoring_error(&format!("MKD {}", name)).await?;
        self.cd(name).await?;
        Ok(())
    }

    /// Remove a remote directory and everything below it.
    pub async fn remove_dir(&mut self, path: &str) -> FtpResult<()> {
        self.cd(path).await?;
        self.clear_working_dir().await?;
        let current = self.pwd().await?;
        if current != "/" {
            self.cdup().await?;
            self.remove_empty_dir(&current).await?;
        }
        Ok(())
    }

    /// Delete every file and directory inside the working directory,
    /// leaving the directory itself in place.
    pub async fn clear_working_dir(&mut self) -> FtpResult<()> {
        for file in self.list(None).await? {
            if file.is_directory() {
                self.cd(&file.name).await?;
                Box::pin(self.clear_working_dir()).await?;
                self.cdup().await?;
                self.remove_empty_dir(&file.name).await?;
            } else {
                self.remove(&file.name).await?;
            }
        }
        Ok(())
    }

    /// Mirror a local directory tree into the remote working directory,
    /// or into `remote_path` when given (created if missing, working
    /// directory restored afterwards).
    pub async fn upload_dir(
        &mut self,
        local_path: impl AsRef<Path>,
        remote_path: Option<&str>,
    ) -> FtpResult<()> {
        let mut user_dir = None;
        if let Some(remote) = remote_path {
            user_dir = Some(self.pwd().await?);
            self.ensure_dir(remote).await?;
        }
        self.upload_to_working_dir(local_path.as_ref()).await?;
        if let Some(dir) = user_dir {
            self.cd(&dir).await?;
        }
        Ok(())
    }

    async fn upload_to_working_dir(&mut self, local: &Path) -> FtpResult<()> {
        let mut entries = fs::read_dir(local).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                self.upload_file(entry.path(), &name, UploadOptions::default())
                    .await?;
            } else if file_type.is_dir() {
                self.open_dir(&name).await?;
                Box::pin(self.upload_to_working_dir(&entry.path())).await?;
                self.cdup().await?;
            }
        }
        Ok(())
    }

    /// Mirror the remote working directory into a local directory,
    /// created if missing.
    pub async fn download_dir(&mut self, local_path: impl AsRef<Path>) -> FtpResult<()> {
        let local = local_path.as_ref();
        fs::create_dir_all(local).await?;
        self.download_to_dir(local).await
    }

    async fn download_to_dir(&mut self, local: &Path) -> FtpResult<()> {
        for file in self.list(None).await? {
            let local_path = local.join(&file.name);
            if file.is_directory() {
                fs::create_dir_all(&local_path).await?;
                self.cd(&file.name).await?;
                Box::pin(self.download_to_dir(&local_path)).await?;
                self.cdup().await?;
            } else if file.is_file() {
                self.download_file(&local_path, &file.name, DownloadOptions::default())
                    .await?;
            }
        }
        Ok(())
    }
}
