//! Human-readable sizes for log lines.

const UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    UNITS
        .iter()
        .find(|(size, _)| bytes >= *size)
        .map_or_else(
            || format!("{bytes} B"),
            |(size, unit)| format!("{:.2} {unit}", bytes as f64 / *size as f64),
        )
}

/// Formats transfer progress against an advisory total, e.g.
/// `"1.50 MB / 3.00 MB (50%)"`.
///
/// The percentage is left out when the total is unknown (zero) and is
/// capped at 100 when the panel under-reported the size.
#[must_use]
pub fn format_progress(written: u64, total: u64) -> String {
    if total == 0 {
        return format_bytes(written);
    }
    let percent = (u128::from(written) * 100 / u128::from(total)).min(100);
    format!(
        "{} / {} ({percent}%)",
        format_bytes(written),
        format_bytes(total)
    )
}
