//! backup-sync - Mirrors a hosting panel's server backups to local disk.
//!
//! Each run lists the server's backups on the panel, skips those that are
//! unsuccessful, excluded, or already present in the download directory,
//! and streams the rest to disk beside a JSON sidecar describing them.
//!
//! # Example
//!
//! ```no_run
//! use backup_sync::{BackupSync, PteroPanel, SyncConfig};
//!
//! # async fn example() -> backup_sync::Result<()> {
//! let config = SyncConfig::from_env()?;
//! let http = config.download.build_http_client()?;
//! let panel = PteroPanel::new(http.clone(), &config.panel_url, config.token.clone());
//!
//! let stats = BackupSync::new(panel, http, config).run().await?;
//! println!("Downloaded {} backups", stats.downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod download;
pub mod error;
pub mod filename;
pub mod format;
pub mod fs;
pub mod logging;
pub mod panel;
pub mod sync;

// Re-export main types for convenience
pub use config::{DownloadConfig, SyncConfig};
pub use download::{DownloadOutcome, HttpDownloader, ProgressTicker};
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use panel::{Backup, Panel, PteroPanel, Server};
pub use sync::{BackupOutcome, BackupSync, LocalSnapshot, RunStats, SkipReason};
