//! human-readable renderings of sizes and durations.

use std::time::Duration;

const KB_PER_MB: u64 = 1024;
const KB_PER_GB: u64 = 1024 * 1024;

const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// renders an amount of memory given in kB, e.g. `812K`, `1.5M` or `15.6G`.
///
/// kilobytes are always whole; `precision` applies to megabytes and gigabytes.
pub fn memory(kb: u64, precision: usize) -> String {
    if kb < KB_PER_MB {
        format!("{kb}K")
    } else if kb < KB_PER_GB {
        format!("{:.precision$}M", kb as f64 / KB_PER_MB as f64)
    } else {
        format!("{:.precision$}G", kb as f64 / KB_PER_GB as f64)
    }
}

/// renders cumulative cpu time: `MM:SS.hh` below an hour, `HHh:MM:SS` from then on.
pub fn cpu_time(time: Duration) -> String {
    let secs = time.as_secs();
    if secs >= SECS_PER_HOUR {
        let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
        format!("{hours:02}h:{minutes:02}:{seconds:02}")
    } else {
        let hundredths = time.subsec_millis() / 10;
        format!("{:02}:{:02}.{hundredths:02}", secs / 60, secs % 60)
    }
}

/// renders time since boot as `HH:MM:SS`, preceded by `N day(s), ` once it passes a day.
pub fn uptime(secs: u64) -> String {
    let days = secs / SECS_PER_DAY;
    let secs = secs % SECS_PER_DAY;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        secs / SECS_PER_HOUR,
        secs % SECS_PER_HOUR / 60,
        secs % 60
    );

    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

/// a fixed-point percentage with one decimal place.
pub fn percent(value: f64) -> String {
    format!("{value:.1}")
}
