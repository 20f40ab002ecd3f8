use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use futures_util::StreamExt;
use gdocs_core::{ExportStream, RemoteError};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("export stream failed: {0}")]
    Stream(#[from] RemoteError),
}

/// Every disk mutation the mirror performs goes through here. With `dry_run` set, mutations are
/// logged and reported as successful without touching the disk; reads always run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs {
    dry_run: bool,
}

impl LocalFs {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn exists(&self, path: &Path) -> Result<bool, FsError> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    /// Modification time of `path`, `None` when it does not exist.
    pub async fn modified(&self, path: &Path) -> Result<Option<OffsetDateTime>, FsError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(OffsetDateTime::from(meta.modified()?))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_dir_all(&self, dir: &Path) -> Result<(), FsError> {
        if self.dry_run {
            if !self.exists(dir).await? {
                info!(dry_run = true, dir = %dir.display(), "would create directory");
            }
            return Ok(());
        }
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if self.dry_run {
            info!(dry_run = true, from = %from.display(), to = %to.display(), "would rename");
            return Ok(());
        }
        tokio::fs::rename(from, to).await?;
        info!(from = %from.display(), to = %to.display(), "renamed");
        Ok(())
    }

    pub async fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        if self.dry_run {
            info!(dry_run = true, path = %path.display(), "would delete");
            return Ok(());
        }
        tokio::fs::remove_file(path).await?;
        info!(path = %path.display(), "deleted");
        Ok(())
    }

    pub async fn set_modified(&self, path: &Path, at: OffsetDateTime) -> Result<(), FsError> {
        if self.dry_run {
            debug!(dry_run = true, path = %path.display(), %at, "would set modification time");
            return Ok(());
        }
        filetime::set_file_mtime(path, FileTime::from_system_time(SystemTime::from(at)))?;
        Ok(())
    }

    /// Streams an export into `<target>.partial`, syncs it and renames it over `target`, so a
    /// failed transfer never leaves a truncated capture behind.
    pub async fn write_export(
        &self,
        target: &Path,
        mut stream: ExportStream,
    ) -> Result<u64, FsError> {
        if self.dry_run {
            info!(dry_run = true, target = %target.display(), "would write export");
            return Ok(0);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let result = async {
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&partial, target).await?;
            Ok::<u64, FsError>(written)
        }
        .await;

        let written = match result {
            Ok(written) => written,
            Err(err) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await
                    && cleanup.kind() != io::ErrorKind::NotFound
                {
                    warn!(path = %partial.display(), error = %cleanup, "failed to remove partial export");
                }
                return Err(err);
            }
        };
        debug!(target = %target.display(), bytes = written, "export written");
        Ok(written)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
