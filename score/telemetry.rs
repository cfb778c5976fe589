//! Process memory checkpoints.
//!
//! Scoring large submissions is dominated by a handful of `n x n` buffers, so the
//! pipelines log resident and virtual memory after each stage. Checkpoints are emitted at
//! debug level and cost nothing unless that level is enabled.

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, get_current_pid};

/// Memory of the current process in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub resident: u64,
    pub virtual_size: u64,
}

pub fn current_memory() -> Option<MemoryUsage> {
    let pid = get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    let process = system.process(pid)?;
    Some(MemoryUsage {
        resident: process.memory(),
        virtual_size: process.virtual_memory(),
    })
}

/// Human-readable byte count with decimal units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kb", "mb", "gb", "tb"];
    let mut value = bytes as f64 / 1000.0;
    let mut unit = 0;
    while value >= 1000.0 && unit + 1 < UNITS.len() {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// Logs current memory usage tagged with `note`.
pub fn checkpoint(note: &str) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match current_memory() {
        Some(usage) => log::debug!(
            "## MEM -> total: {} | ram: {} @ {note}",
            format_bytes(usage.virtual_size),
            format_bytes(usage.resident)
        ),
        None => log::debug!("## MEM -> unavailable @ {note}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled() {
        assert_eq!(format_bytes(999), "1.0kb");
        assert_eq!(format_bytes(2_500_000), "2.5mb");
        assert_eq!(format_bytes(3_000_000_000), "3.0gb");
    }

    #[test]
    fn own_process_is_visible() {
        let usage = current_memory().expect("current process should be listed");
        assert!(usage.resident > 0);
    }
}
