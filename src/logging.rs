//! Logger installation.
//!
//! Records go to stderr and are appended to `logs.log` inside the download
//! directory, one logfmt line each.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use env_logger::{Builder, Env, Target};

/// Name of the run log kept next to the backups.
pub const LOG_FILE_NAME: &str = "logs.log";

/// Writer duplicating every write into two sinks.
pub struct TeeWriter<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Write, B: Write> TeeWriter<A, B> {
    /// Creates a writer feeding both `primary` and `secondary`.
    pub const fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: Write, B: Write> Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.secondary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

/// Renders one log record as a logfmt line (without the newline).
#[must_use]
pub fn format_line(time: DateTime<Utc>, level: log::Level, target: &str, msg: &str) -> String {
    format!(
        "time={} level={} target={target} msg={msg:?}",
        time.to_rfc3339_opts(SecondsFormat::Millis, true),
        level.as_str().to_ascii_lowercase(),
    )
}

/// Installs the global logger.
///
/// The default level is `info`; `RUST_LOG` overrides it.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or a logger is
/// already installed.
pub fn init(download_dir: &Path) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(download_dir.join(LOG_FILE_NAME))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}",
                format_line(
                    Utc::now(),
                    record.level(),
                    record.target(),
                    &record.args().to_string()
                )
            )
        })
        .target(Target::Pipe(Box::new(TeeWriter::new(io::stderr(), file))))
        .try_init()
        .map_err(io::Error::other)
}
