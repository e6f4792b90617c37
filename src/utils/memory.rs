//! Process memory snapshots for stage logging

use sysinfo::{Pid, System};
use tracing::{debug, info};

/// Resident memory of the current process in MiB, if the platform reports it
pub fn resident_memory_mb() -> Option<f64> {
    let pid: Pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return None;
    }
    sys.process(pid)
        .map(|process| process.memory() as f64 / 1024.0 / 1024.0)
}

/// Log current memory usage at a pipeline stage. Never fails.
pub fn log_memory_usage(stage: &str) {
    match resident_memory_mb() {
        Some(mb) => info!(stage, memory_mb = (mb * 10.0).round() / 10.0, "Memory usage"),
        None => debug!(stage, "Memory usage unavailable"),
    }
}
