//! Process and storage health snapshot

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

use crate::cache::CacheStats;

/// Memory figures in bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReport {
    pub total: u64,
    pub free: u64,
    /// Resident set of this process; 0 when unavailable
    pub process_rss: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub reachable: bool,
    pub file_count: usize,
}

/// Everything `health()` reports
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub memory: MemoryReport,
    pub storage: StorageReport,
    pub cache: CacheStats,
    pub pending_jobs: usize,
}

impl HealthReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.storage.reachable
    }
}

/// Read memory figures; blocking, run it off the async workers
pub(crate) fn memory_snapshot() -> MemoryReport {
    let mut system = System::new();
    system.refresh_memory();

    let process_rss = match sysinfo::get_current_pid() {
        Ok(pid) => {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            system.process(pid).map_or(0, sysinfo::Process::memory)
        }
        Err(e) => {
            log::debug!("Current pid unavailable: {e}");
            0
        }
    };

    MemoryReport {
        total: system.total_memory(),
        free: system.free_memory(),
        process_rss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_snapshot_reports_totals() {
        let memory = memory_snapshot();
        assert!(memory.total > 0);
        assert!(memory.free <= memory.total);
    }
}
