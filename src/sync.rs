//! Reconciliation of a server's remote backups against the local
//! download directory.
//!
//! A run lists the directory once, then walks the panel's backups. Each
//! backup is skipped when it is unsuccessful, excluded, or already present
//! (its UUID appears in a local file name); otherwise it is downloaded and
//! a JSON sidecar is written next to it. A failure on one backup is logged
//! and never stops the run.

use std::path::{Path, PathBuf};

use futures::{StreamExt, future, stream};
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::SyncConfig;
use crate::download::{DownloadOutcome, HttpDownloader};
use crate::error::Result;
use crate::filename::{base_file_name, extension_from_url};
use crate::format::format_progress;
use crate::fs::{FileSystem, TokioFileSystem};
use crate::panel::{Backup, Panel};

/// Extension of the metadata file written beside each archive.
pub const SIDECAR_EXTENSION: &str = ".json";

const LOG_EXTENSION: &str = ".log";

/// File names present in the download directory when a run started.
///
/// Sidecars and log files are left out so they never count as a
/// downloaded archive.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    names: Vec<String>,
}

impl LocalSnapshot {
    /// Builds a snapshot from raw directory entry names.
    #[must_use]
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let names = names
            .into_iter()
            .filter(|n| !(n.ends_with(SIDECAR_EXTENSION) || n.ends_with(LOG_EXTENSION)))
            .collect();
        Self { names }
    }

    /// Lists `dir` through `fs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn capture<F: FileSystem>(fs: &F, dir: &Path) -> Result<Self> {
        Ok(Self::new(fs.list_file_names(dir).await?))
    }

    /// Returns the first local file whose name contains `uuid`.
    #[must_use]
    pub fn find(&self, uuid: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.contains(uuid))
            .map(String::as_str)
    }

    /// Number of archive candidates in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the snapshot holds no archive candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Why a backup was not downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The panel reports the backup as unsuccessful.
    Unsuccessful,
    /// The backup's UUID is in the configured skip list.
    Excluded,
    /// A local file already carries the backup's UUID.
    AlreadyDownloaded(String),
}

/// What happened to one backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Nothing was fetched.
    Skipped(SkipReason),
    /// The archive was written to `path`.
    Downloaded {
        /// Final location of the archive.
        path: PathBuf,
    },
    /// The download server refused the transfer.
    Failed {
        /// Response status.
        status: StatusCode,
        /// Canonical reason phrase of the status.
        status_text: String,
    },
}

/// Tally of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Backups downloaded in this run.
    pub downloaded: usize,
    /// Backups skipped for any reason.
    pub skipped: usize,
    /// Backups that failed, softly or with an error.
    pub failed: usize,
}

/// Content of a sidecar file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sidecar<'a> {
    backup: &'a Backup,
    local_file_name: &'a str,
}

/// Mirrors one server's backups into the download directory.
pub struct BackupSync<P: Panel, F: FileSystem = TokioFileSystem> {
    panel: P,
    downloader: HttpDownloader<F>,
    config: SyncConfig,
}

impl<P: Panel> BackupSync<P, TokioFileSystem> {
    /// Creates an engine downloading through `http`, usually the same
    /// client the panel uses.
    #[must_use]
    pub const fn new(panel: P, http: reqwest::Client, config: SyncConfig) -> Self {
        let downloader = HttpDownloader::new(http, config.download.progress_interval);
        Self::with_downloader(panel, downloader, config)
    }
}

impl<P: Panel, F: FileSystem> BackupSync<P, F> {
    /// Creates an engine around an existing downloader.
    #[must_use]
    pub const fn with_downloader(panel: P, downloader: HttpDownloader<F>, config: SyncConfig) -> Self {
        Self {
            panel,
            downloader,
            config,
        }
    }

    /// Decides whether `backup` must be left alone.
    #[must_use]
    pub fn skip_reason(&self, backup: &Backup, local: &LocalSnapshot) -> Option<SkipReason> {
        if !backup.successful {
            return Some(SkipReason::Unsuccessful);
        }
        if self.config.is_skipped(&backup.uuid) {
            return Some(SkipReason::Excluded);
        }
        local
            .find(&backup.uuid)
            .map(|name| SkipReason::AlreadyDownloaded(name.to_string()))
    }

    /// Downloads one backup unless it should be skipped, then records its
    /// sidecar.
    ///
    /// The sidecar is written whether or not the server delivered the
    /// archive; its `localFileName` names the file that was (or would have
    /// been) written.
    ///
    /// # Errors
    ///
    /// Returns an error if the download URL cannot be obtained, the
    /// transfer breaks, or the sidecar cannot be written.
    pub async fn process_backup(&self, backup: &Backup, local: &LocalSnapshot) -> Result<BackupOutcome> {
        let uuid = backup.uuid.as_str();

        if let Some(reason) = self.skip_reason(backup, local) {
            match &reason {
                SkipReason::Unsuccessful => log::info!("[{uuid}] Skipping unsuccessful backup"),
                SkipReason::Excluded => log::info!("[{uuid}] Skipping backup due to SKIP_BACKUPS"),
                SkipReason::AlreadyDownloaded(name) => {
                    log::info!("[{uuid}] Skipping already downloaded backup: {name}");
                }
            }
            return Ok(BackupOutcome::Skipped(reason));
        }

        let url = self
            .panel
            .download_url(&self.config.server_id, uuid)
            .await?;

        let dir = &self.config.download_dir;
        let base_name = base_file_name(&backup.name, uuid);
        let download_name = format!(
            "{base_name}{}",
            extension_from_url(&url).unwrap_or_default()
        );
        let dest = dir.join(&download_name);
        let sidecar_dest = dir.join(format!("{base_name}{SIDECAR_EXTENSION}"));

        log::debug!("[{uuid}] Download URL: {url}");
        log::info!("[{uuid}] Downloading backup to {}", dest.display());

        let outcome = self
            .downloader
            .download(&url, &dest, |written| {
                log::info!(
                    "[{uuid}] Download in progress: {}",
                    format_progress(written, backup.bytes)
                );
            })
            .await?;

        let local_file_name = match &outcome {
            DownloadOutcome::Completed { path, .. } => path
                .file_name()
                .map_or_else(|| download_name.clone(), |n| n.to_string_lossy().into_owned()),
            DownloadOutcome::Failed { .. } => download_name.clone(),
        };

        let sidecar = Sidecar {
            backup,
            local_file_name: &local_file_name,
        };
        self.downloader
            .fs()
            .write_file(&sidecar_dest, &serde_json::to_vec_pretty(&sidecar)?)
            .await?;

        match outcome {
            DownloadOutcome::Completed {
                path,
                bytes_written,
            } => {
                log::info!(
                    "[{uuid}] Backup downloaded successfully to {} ({bytes_written} bytes)",
                    path.display()
                );
                Ok(BackupOutcome::Downloaded { path })
            }
            DownloadOutcome::Failed {
                status,
                status_text,
            } => {
                log::error!(
                    "[{uuid}] Failed to download backup: {} {status_text}",
                    status.as_u16()
                );
                Ok(BackupOutcome::Failed {
                    status,
                    status_text,
                })
            }
        }
    }

    /// Performs a full run: resolve the server and its backups, snapshot
    /// the download directory, and process every backup.
    ///
    /// Per-backup errors are logged with the backup's UUID and counted in
    /// the returned stats.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run cannot start: the download
    /// directory is unusable or the panel cannot be queried.
    pub async fn run(&self) -> Result<RunStats> {
        self.config.ensure_download_dir()?;

        let server = self.panel.fetch_server(&self.config.server_id).await?;
        log::info!("Loaded server {} ({})", server.name, server.uuid);

        let backups = self.panel.fetch_backups(&self.config.server_id).await?;
        log::info!("Loaded {} backups", backups.len());
        for backup in &backups {
            log::debug!(
                "Loaded backup {} {:?}: successful={} bytes={}",
                backup.uuid,
                backup.name,
                backup.successful,
                backup.bytes
            );
        }

        let local = LocalSnapshot::capture(self.downloader.fs(), &self.config.download_dir).await?;
        log::debug!("Found {} local archives", local.len());

        let mut stats = RunStats::default();
        let local = &local;
        stream::iter(&backups)
            .map(|backup| async move { (backup, self.process_backup(backup, local).await) })
            .buffer_unordered(self.config.download.concurrent_backups.max(1))
            .for_each(|(backup, result)| {
                match result {
                    Ok(BackupOutcome::Downloaded { .. }) => stats.downloaded += 1,
                    Ok(BackupOutcome::Skipped(_)) => stats.skipped += 1,
                    Ok(BackupOutcome::Failed { .. }) => stats.failed += 1,
                    Err(e) => {
                        log::error!("[{}] Failed to process backup: {e}", backup.uuid);
                        stats.failed += 1;
                    }
                }
                future::ready(())
            })
            .await;

        log::info!(
            "Finished: {} downloaded, {} skipped, {} failed",
            stats.downloaded,
            stats.skipped,
            stats.failed
        );
        Ok(stats)
    }
}
