//! Configuration for a sync run.
//!
//! The whole configuration is read once at process start and then passed
//! by reference into the engine; nothing below this module touches the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Panel used when `PANEL_URL` is not set.
pub const DEFAULT_PANEL_URL: &str = "https://control.stelhosting.com";

const TOKEN_VAR: &str = "STEL_TOKEN";
const SERVER_ID_VAR: &str = "STEL_SERVER_ID";
const DOWNLOAD_LOCATION_VAR: &str = "DOWNLOAD_LOCATION";
const SKIP_BACKUPS_VAR: &str = "SKIP_BACKUPS";
const PANEL_URL_VAR: &str = "PANEL_URL";
const CONCURRENT_DOWNLOADS_VAR: &str = "CONCURRENT_DOWNLOADS";
const PROGRESS_INTERVAL_VAR: &str = "PROGRESS_INTERVAL_SECS";

/// Largest accepted `PROGRESS_INTERVAL_SECS` (one day).
pub const MAX_PROGRESS_INTERVAL_SECS: usize = 86_400;
/// Largest accepted `CONCURRENT_DOWNLOADS`.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 64;

/// Tuning for the HTTP transfer of backup archives.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// How often progress is reported while a body is streaming.
    pub progress_interval: Duration,
    /// Upper bound on establishing a connection.
    pub connect_timeout: Duration,
    /// Upper bound on a single read; a stalled transfer fails after this.
    pub read_timeout: Duration,
    /// Number of backups processed at the same time.
    pub concurrent_backups: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
            concurrent_backups: 1,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress reporting period.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-read timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets how many backups may be processed concurrently.
    #[must_use]
    pub const fn with_concurrent_backups(mut self, concurrent: usize) -> Self {
        self.concurrent_backups = concurrent;
        self
    }

    /// Builds the HTTP client used for panel calls and archive transfers.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(client)
    }
}

/// Complete configuration of one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the panel, without a trailing slash.
    pub panel_url: String,
    /// Client API token for the panel.
    pub token: String,
    /// Identifier of the server whose backups are mirrored.
    pub server_id: String,
    /// Directory receiving archives, sidecars and the run log.
    pub download_dir: PathBuf,
    /// Backup UUIDs that are never downloaded.
    pub skip_backups: Vec<String>,
    /// Transfer tuning.
    pub download: DownloadConfig,
}

impl SyncConfig {
    /// Creates a configuration with default panel URL and tuning.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        server_id: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            panel_url: DEFAULT_PANEL_URL.to_string(),
            token: token.into(),
            server_id: server_id.into(),
            download_dir: download_dir.into(),
            skip_backups: Vec::new(),
            download: DownloadConfig::default(),
        }
    }

    /// Sets the panel base URL.
    #[must_use]
    pub fn with_panel_url(mut self, url: impl Into<String>) -> Self {
        self.panel_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the backup UUIDs to skip.
    #[must_use]
    pub fn with_skip_backups(mut self, skip: Vec<String>) -> Self {
        self.skip_backups = skip;
        self
    }

    /// Sets the transfer tuning.
    #[must_use]
    pub fn with_download(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(Error::MissingEnv(name))
        };

        let token = required(TOKEN_VAR)?;
        let server_id = required(SERVER_ID_VAR)?;
        let download_dir = required(DOWNLOAD_LOCATION_VAR)?;

        let mut download = DownloadConfig::default();
        if let Some(n) = parse_bounded(&lookup, CONCURRENT_DOWNLOADS_VAR, MAX_CONCURRENT_DOWNLOADS)? {
            download = download.with_concurrent_backups(n);
        }
        if let Some(secs) = parse_bounded(&lookup, PROGRESS_INTERVAL_VAR, MAX_PROGRESS_INTERVAL_SECS)? {
            download = download.with_progress_interval(Duration::from_secs(secs as u64));
        }

        let config = Self::new(token, server_id, download_dir)
            .with_panel_url(
                lookup(PANEL_URL_VAR)
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_PANEL_URL.to_string()),
            )
            .with_skip_backups(
                lookup(SKIP_BACKUPS_VAR)
                    .map(|v| parse_skip_list(&v))
                    .unwrap_or_default(),
            )
            .with_download(download);

        Ok(config)
    }

    /// Checks that the download location exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when it is missing or not a directory.
    pub fn ensure_download_dir(&self) -> Result<()> {
        match std::fs::metadata(&self.download_dir) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(Error::Config(format!(
                "{} is not a directory",
                self.download_dir.display()
            ))),
            Err(e) => Err(Error::Config(format!(
                "download location {} is not accessible: {e}",
                self.download_dir.display()
            ))),
        }
    }

    /// Returns true if the backup with `uuid` must never be downloaded.
    #[must_use]
    pub fn is_skipped(&self, uuid: &str) -> bool {
        self.skip_backups.iter().any(|s| s == uuid)
    }
}

/// Splits a comma-separated UUID list, dropping blanks.
fn parse_skip_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses an optional integer in `1..=max`.
fn parse_bounded<F>(lookup: &F, name: &str, max: usize) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if (1..=max).contains(&n) => Ok(Some(n)),
        _ => Err(Error::Config(format!(
            "{name} must be an integer between 1 and {max}, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("STEL_TOKEN", "ptlc_token"),
        ("STEL_SERVER_ID", "1a2b3c4d"),
        ("DOWNLOAD_LOCATION", "/srv/backups"),
    ];

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.progress_interval, Duration::from_secs(5));
        assert_eq!(config.concurrent_backups, 1);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_progress_interval(Duration::from_secs(1))
            .with_connect_timeout(Duration::from_secs(2))
            .with_read_timeout(Duration::from_secs(3))
            .with_concurrent_backups(4);

        assert_eq!(config.progress_interval, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.concurrent_backups, 4);
    }

    #[test]
    fn loads_required_values() {
        let config = SyncConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.token, "ptlc_token");
        assert_eq!(config.server_id, "1a2b3c4d");
        assert_eq!(config.download_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.panel_url, DEFAULT_PANEL_URL);
        assert!(config.skip_backups.is_empty());
    }

    #[test]
    fn missing_token_names_the_variable() {
        let err = SyncConfig::from_lookup(lookup_from(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, Error::MissingEnv("STEL_TOKEN")));
        assert_eq!(err.to_string(), "STEL_TOKEN environment variable is not defined");
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("DOWNLOAD_LOCATION", "");
        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, Error::MissingEnv("DOWNLOAD_LOCATION")));
    }

    #[test]
    fn skip_list_is_split_and_trimmed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SKIP_BACKUPS", "aaa, bbb,,ccc "));
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.skip_backups, vec!["aaa", "bbb", "ccc"]);
        assert!(config.is_skipped("bbb"));
        assert!(!config.is_skipped("bb"));
    }

    #[test]
    fn optional_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PANEL_URL", "https://panel.example.com/"));
        pairs.push(("CONCURRENT_DOWNLOADS", "3"));
        pairs.push(("PROGRESS_INTERVAL_SECS", "10"));
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.panel_url, "https://panel.example.com");
        assert_eq!(config.download.concurrent_backups, 3);
        assert_eq!(config.download.progress_interval, Duration::from_secs(10));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CONCURRENT_DOWNLOADS", "0"));
        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PROGRESS_INTERVAL_SECS", "soon"));
        assert!(SyncConfig::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn huge_interval_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PROGRESS_INTERVAL_SECS", "18446744073709551615"));
        let err = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("PROGRESS_INTERVAL_SECS")));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PROGRESS_INTERVAL_SECS", "86401"));
        assert!(SyncConfig::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PROGRESS_INTERVAL_SECS", "86400"));
        let config = SyncConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.download.progress_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn excessive_concurrency_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CONCURRENT_DOWNLOADS", "65"));
        assert!(matches!(
            SyncConfig::from_lookup(lookup_from(&pairs)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn ensure_download_dir_checks_existence() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SyncConfig::new("t", "s", dir.path());
        assert!(config.ensure_download_dir().is_ok());

        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(SyncConfig::new("t", "s", &file).ensure_download_dir().is_err());
        assert!(
            SyncConfig::new("t", "s", dir.path().join("missing"))
                .ensure_download_dir()
                .is_err()
        );
    }
}
