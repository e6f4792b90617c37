//! Utility functions and types

pub mod data_loader;
pub mod memory;
pub mod stats;

pub use data_loader::{column_values, has_column, DataLoader, DataSaver};
pub use memory::log_memory_usage;
pub use stats::StatsSummary;

use std::time::{Duration, Instant};

/// Simple wall-clock timer for stage timings
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds since start
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
