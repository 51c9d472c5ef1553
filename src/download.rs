//! Streaming download of backup archives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::filename::{remote_filename, replace_extension};
use crate::fs::{FileSystem, TokioFileSystem};

/// Result of a download that did not hit a transport or disk error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The body was written completely.
    Completed {
        /// Where the archive was written, after any header-driven rename.
        path: PathBuf,
        /// Number of body bytes written.
        bytes_written: u64,
    },
    /// The server answered without a usable body.
    Failed {
        /// Response status.
        status: StatusCode,
        /// Canonical reason phrase of the status.
        status_text: String,
    },
}

impl DownloadOutcome {
    /// Returns true for [`DownloadOutcome::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Stand-in deadline for periods too long to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Periodic progress tick owned by a single transfer.
///
/// The first tick fires one full period after creation. Dropping the
/// ticker cancels it, so a transfer that ends for any reason leaves no
/// timer behind.
#[derive(Debug)]
pub struct ProgressTicker {
    interval: Interval,
}

impl ProgressTicker {
    /// Creates a ticker firing every `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or_else(|| now + FAR_FUTURE);
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Copies `stream` into `writer`, calling `on_progress` with the running
/// byte count on every tick of `ticker`.
///
/// Returns the total number of bytes written. Bytes already written when
/// an error occurs stay in `writer`.
///
/// # Errors
///
/// Returns the first stream or write error.
pub async fn stream_to_writer<S, E, W>(
    stream: S,
    writer: &mut W,
    mut ticker: ProgressTicker,
    mut on_progress: impl FnMut(u64),
) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    Error: From<E>,
    W: AsyncWrite + Unpin,
{
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    writer.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                None => break,
            },
            () = ticker.tick() => on_progress(written),
        }
    }

    writer.flush().await?;
    Ok(written)
}

/// Computes where a download really lands once response headers are known.
///
/// When the response names a file in `Content-Disposition`, its extension
/// replaces whatever was guessed for `initial`. Only the file name is
/// rewritten; the directory part is kept as is. A header file name
/// carrying a path separator is ignored, so the archive always stays in
/// the directory of `initial` under its own name.
#[must_use]
pub fn resolve_destination(initial: &Path, headers: &HeaderMap) -> PathBuf {
    let Some(header_name) = remote_filename(headers) else {
        return initial.to_path_buf();
    };
    if header_name.contains(['/', '\\']) {
        log::warn!(
            "Ignoring Content-Disposition file name with a path separator: {header_name:?}"
        );
        return initial.to_path_buf();
    }
    let Some(file_name) = initial.file_name().and_then(|n| n.to_str()) else {
        return initial.to_path_buf();
    };
    initial.with_file_name(replace_extension(file_name, &header_name))
}

/// HTTP downloader writing response bodies to disk.
pub struct HttpDownloader<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    progress_interval: Duration,
    fs: F,
}

impl HttpDownloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(http: reqwest::Client, progress_interval: Duration) -> Self {
        Self {
            http,
            progress_interval,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> HttpDownloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(http: reqwest::Client, progress_interval: Duration, fs: F) -> Self {
        Self {
            http,
            progress_interval,
            fs,
        }
    }

    /// Returns the file system the downloader writes through.
    #[must_use]
    pub const fn fs(&self) -> &F {
        &self.fs
    }

    /// Downloads `url` to `dest`, or to `dest` with the extension announced
    /// by the response.
    ///
    /// A non-success status (or `204 No Content`) is reported as
    /// [`DownloadOutcome::Failed`] without touching the disk. A transfer
    /// that breaks mid-stream leaves the partial file in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent, the body stream
    /// fails, or the file cannot be written.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: impl FnMut(u64),
    ) -> Result<DownloadOutcome> {
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if !status.is_success() || status == StatusCode::NO_CONTENT {
            return Ok(DownloadOutcome::Failed {
                status,
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        // Must be settled before the file is created.
        let path = resolve_destination(dest, response.headers());
        if path != dest {
            log::info!(
                "Renamed download destination from header: {} -> {}",
                dest.display(),
                path.display()
            );
        }

        let mut file = self.fs.create_file(&path).await?;
        let bytes_written = stream_to_writer(
            response.bytes_stream(),
            &mut file,
            ProgressTicker::new(self.progress_interval),
            on_progress,
        )
        .await?;

        Ok(DownloadOutcome::Completed {
            path,
            bytes_written,
        })
    }
}
