//! Local file name derivation for backup archives.
//!
//! A backup's real extension (often the compound `.tar.gz`) is not always
//! visible in its signed download URL, so a first guess is taken from the
//! URL and later corrected from the response's `Content-Disposition`.
//! Every extension here runs from the FIRST dot of a name to its end.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use reqwest::header::{CONTENT_DISPOSITION, HeaderMap};

static FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"filename="?([^"]+)"?"#).expect("valid regex"));

const REPLACEMENT: char = '_';
const MAX_NAME_LEN: usize = 100;

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Returns everything from the first `.` of `file_name` to its end.
#[must_use]
pub fn extension_from_header_filename(file_name: &str) -> Option<&str> {
    file_name.find('.').map(|i| &file_name[i..])
}

/// Guesses an extension from the final path segment of `url`.
///
/// `https://host/a/test.tar.gz` gives `.tar.gz`; a segment without a dot,
/// or a URL that does not parse, gives `None`. Case is preserved.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    extension_from_header_filename(segment).map(ToString::to_string)
}

/// Extracts the file name announced by a `Content-Disposition` header.
///
/// Both `filename=test.zip` and `filename="test.zip"` are accepted.
#[must_use]
pub fn remote_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    FILENAME_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Swaps the extension of `original_path` for the one in `header_filename`.
///
/// Everything from the first `.` of `original_path` is dropped, so
/// `/x/test.tar.gz` with `test.zip` becomes `/x/test.zip`. When
/// `header_filename` carries no extension the path is returned unchanged.
#[must_use]
pub fn replace_extension(original_path: &str, header_filename: &str) -> String {
    let Some(extension) = extension_from_header_filename(header_filename) else {
        return original_path.to_string();
    };
    let stem = original_path
        .split_once('.')
        .map_or(original_path, |(stem, _)| stem);
    format!("{stem}{extension}")
}

/// Makes a backup name safe to use as (part of) a file name.
///
/// Path separators, characters reserved on common filesystems, control
/// characters and whitespace become `_`. Runs of replacements collapse to
/// one, leading dots and trailing dots/spaces are dropped, and Windows
/// device names get a trailing `_`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if is_unsafe(c) {
            if !out.ends_with(REPLACEMENT) {
                out.push(REPLACEMENT);
            }
        } else {
            out.push(c);
        }
    }

    let trimmed = out.trim_start_matches('.').trim_end_matches(['.', ' ']);
    let mut safe: String = trimmed.chars().take(MAX_NAME_LEN).collect();

    let stem = safe.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        safe.push(REPLACEMENT);
    }
    safe
}

/// Returns `"{sanitized-name}__{uuid}"`, the stem shared by a backup's
/// archive and its sidecar.
///
/// The UUID is embedded verbatim; presence detection depends on it.
#[must_use]
pub fn base_file_name(name: &str, uuid: &str) -> String {
    format!("{}__{uuid}", sanitize(name))
}

fn is_unsafe(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
        || c.is_control()
        || c.is_whitespace()
}
