//! Expiry sweep over the store base
//!
//! Runs on the blocking pool: a `jwalk` traversal decides per file, then
//! empty directories are pruned bottom-up.

use chrono::{DateTime, Utc};
use jwalk::WalkDir;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::registry::ExpiryEntry;
use crate::utils::{EXPIRY_REGISTRY_FILE, STORAGE_SENTINEL};

/// What one sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
    pub dirs_removed: usize,
    /// Registry entries that survived
    pub retained: usize,
    pub forced: bool,
}

/// Inputs of one sweep
pub(crate) struct SweepPlan<'a> {
    pub base: &'a Path,
    pub entries: &'a HashMap<String, ExpiryEntry>,
    pub ttl: Duration,
    pub force: bool,
    pub now: DateTime<Utc>,
}

/// Delete what the plan marks expired
///
/// Returns the report and the set of relative paths deleted.
pub(crate) fn sweep_files(plan: &SweepPlan<'_>) -> (SweepReport, HashSet<String>) {
    let mut report = SweepReport {
        forced: plan.force,
        ..SweepReport::default()
    };
    let mut removed = HashSet::new();
    let mut dirs: Vec<PathBuf> = Vec::new();

    let walker = WalkDir::new(plan.base)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Sweep walk error under {}: {e}", plan.base.display());
                continue;
            }
        };
        let path = entry.path();
        if path == plan.base {
            continue;
        }
        if entry.file_type().is_dir() {
            dirs.push(path);
            continue;
        }

        let Some(rel) = relative_key(plan.base, &path) else {
            continue;
        };
        if rel == STORAGE_SENTINEL || rel == EXPIRY_REGISTRY_FILE {
            continue;
        }

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Sweep skipped {}: {e}", path.display());
                continue;
            }
        };

        if !should_remove(plan, &rel, metadata.modified().ok()) {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                report.files_removed += 1;
                report.bytes_freed += metadata.len();
                removed.insert(rel);
            }
            Err(e) => log::warn!("Failed to delete expired file {}: {e}", path.display()),
        }
    }

    // Deepest first so parents empty out before they are checked
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut it| it.next().is_none())
            .unwrap_or(false);
        if is_empty && std::fs::remove_dir(&dir).is_ok() {
            report.dirs_removed += 1;
        }
    }

    (report, removed)
}

fn should_remove(plan: &SweepPlan<'_>, rel: &str, modified: Option<SystemTime>) -> bool {
    if plan.force {
        return true;
    }
    if let Some(entry) = plan.entries.get(rel) {
        return entry.is_expired(plan.now);
    }
    // Unregistered: fall back to age on disk
    modified
        .and_then(|m| SystemTime::now().duration_since(m).ok())
        .is_some_and(|age| age >= plan.ttl)
}

/// Slash-separated path of `path` under `base`
pub(crate) fn relative_key(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
