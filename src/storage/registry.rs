//! Append-only expiry log at the store base
//!
//! One JSON object per line. The log is never edited in place; the last
//! line for a path wins on load, and a sweep rewrites the log with only
//! the surviving entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Lifetime of one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryEntry {
    /// Slash-separated path relative to the store base
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ExpiryEntry {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Append one entry as a single line
pub fn append(registry: &Path, entry: &ExpiryEntry) -> std::io::Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(registry)?;
    file.write_all(line.as_bytes())
}

/// Load the log into a path-keyed map
///
/// A missing log is empty. Malformed lines are skipped.
pub fn load(registry: &Path) -> std::io::Result<HashMap<String, ExpiryEntry>> {
    let text = match std::fs::read_to_string(registry) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e),
    };

    let mut entries = HashMap::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExpiryEntry>(line) {
            Ok(entry) => {
                entries.insert(entry.path.clone(), entry);
            }
            Err(e) => {
                log::debug!("Skipping malformed registry line {}: {e}", line_no + 1);
            }
        }
    }
    Ok(entries)
}

/// Replace the log with `entries`, oldest first
///
/// Written to a sibling file and renamed over the log.
pub fn rewrite<'a>(
    registry: &Path,
    entries: impl IntoIterator<Item = &'a ExpiryEntry>,
) -> std::io::Result<()> {
    let mut sorted: Vec<&ExpiryEntry> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));

    let mut body = String::new();
    for entry in sorted {
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }

    let tmp = registry.with_extension("jsonl.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(path: &str, ttl_secs: i64) -> ExpiryEntry {
        let created_at = Utc::now();
        ExpiryEntry {
            path: path.to_string(),
            created_at,
            expires_at: created_at + Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn last_entry_for_a_path_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = dir.path().join(".expiry-registry.jsonl");

        append(&registry, &entry("a/1/x.png", -10)).expect("append");
        append(&registry, &entry("a/1/y.png", 60)).expect("append");
        append(&registry, &entry("a/1/x.png", 60)).expect("append");

        let loaded = load(&registry).expect("load");
        assert_eq!(loaded.len(), 2);
        assert!(!loaded["a/1/x.png"].is_expired(Utc::now()));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = dir.path().join(".expiry-registry.jsonl");
        append(&registry, &entry("a/1/x.png", 60)).expect("append");
        std::fs::OpenOptions::new()
            .append(true)
            .open(&registry)
            .and_then(|mut f| f.write_all(b"{not json\n"))
            .expect("corrupt");

        assert_eq!(load(&registry).expect("load").len(), 1);
    }

    #[test]
    fn rewrite_compacts_the_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = dir.path().join(".expiry-registry.jsonl");
        for _ in 0..3 {
            append(&registry, &entry("a/1/x.png", 60)).expect("append");
        }

        let loaded = load(&registry).expect("load");
        rewrite(&registry, loaded.values()).expect("rewrite");

        let text = std::fs::read_to_string(&registry).expect("read");
        assert_eq!(text.lines().count(), 1);
        assert!(load(&dir.path().join("missing.jsonl")).expect("load").is_empty());
    }
}
