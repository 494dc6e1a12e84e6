//! Plain-text rendering of command output.

use pagewarm_core::EntryInfo;
use pagewarm_core::warmup::RunReport;

/// Format a byte count into IEC units (KiB, MiB, GiB, TiB) with trimmed precision.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        return format!("{bytes} B");
    }

    let mut digits = if value >= 10.0 { format!("{value:.1}") } else { format!("{value:.2}") };
    if digits.contains('.') {
        let trimmed = digits.trim_end_matches('0').trim_end_matches('.').len();
        digits.truncate(trimmed);
    }

    format!("{digits} {}", UNITS[unit])
}

/// `url<TAB>size<TAB>timestamp`, with `-` for an unknown timestamp.
pub fn entry_line(entry: &EntryInfo, human_readable: bool) -> String {
    let size = if human_readable { format_bytes(entry.size()) } else { entry.size().to_string() };
    let timestamp = entry.timestamp().map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
    format!("{}\t{size}\t{timestamp}", entry.url())
}

pub fn report_line(report: &RunReport) -> String {
    format!(
        "stop={} fetched={} skipped={} remaining={}",
        report.stop, report.fetched, report.skipped, report.remaining
    )
}
