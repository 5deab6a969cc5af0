//! Durable file store with TTL-based cleanup
//!
//! Files live under one base directory, addressed by slash-separated
//! relative paths. Every write appends its lifetime to the expiry log;
//! `sweep` removes what has outlived it. The store knows nothing about the
//! result cache: removing a file never touches a cached result, and the
//! other way round.

pub mod purge;
pub mod registry;

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::ScanError;
use crate::utils::{EXPIRY_REGISTRY_FILE, STORAGE_SENTINEL, ensure_storage_sentinel};

pub use purge::SweepReport;
pub use registry::ExpiryEntry;

/// Shortest period the background purge task runs at
const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// File store rooted at one base directory
pub struct DurableStore {
    base: PathBuf,
    /// `base` with symlinks resolved; every accessed path must stay under it
    real_base: PathBuf,
    ttl: Duration,
    /// Serializes every expiry-log write and the sweep's rewrite
    registry_lock: Mutex<()>,
    sweeping: AtomicBool,
}

impl DurableStore {
    /// Open (creating if needed) a store at `base`
    pub async fn open(base: impl Into<PathBuf>, ttl: Duration) -> Result<Self, ScanError> {
        let base = base.into();
        ensure_storage_sentinel(&base).await?;
        let real_base = tokio::fs::canonicalize(&base).await?;

        Ok(Self {
            base,
            real_base,
            ttl,
            registry_lock: Mutex::new(()),
            sweeping: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn registry_path(&self) -> PathBuf {
        self.base.join(EXPIRY_REGISTRY_FILE)
    }

    /// Write `bytes` at `relative_path` and register its expiry
    pub async fn store_file(&self, bytes: &[u8], relative_path: &str) -> Result<PathBuf, ScanError> {
        let (key, full) = self.resolve(relative_path)?;
        self.confine(&key, &full).await?;

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| ScanError::Internal(format!("File TTL out of range: {e}")))?;
        let entry = ExpiryEntry {
            path: key,
            created_at,
            expires_at: created_at + ttl,
        };

        let _guard = self.registry_lock.lock().await;
        let registry = self.registry_path();
        tokio::task::spawn_blocking(move || registry::append(&registry, &entry))
            .await
            .map_err(|e| ScanError::Internal(format!("Registry writer panicked: {e}")))??;

        log::debug!("Stored {} ({} bytes)", full.display(), bytes.len());
        Ok(full)
    }

    /// Read a stored file
    pub async fn get_file(&self, relative_path: &str) -> Result<Vec<u8>, ScanError> {
        let (key, full) = self.resolve(relative_path)?;
        self.confine(&key, &full).await?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScanError::NotFound(format!("Stored file {key} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored file; its log entry is dropped on the next sweep
    pub async fn delete_file(&self, relative_path: &str) -> Result<(), ScanError> {
        let (key, full) = self.resolve(relative_path)?;
        self.confine(&key, &full).await?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScanError::NotFound(format!("Stored file {key} not found")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Locate `<site>/<scan_id>/<file_name>` without knowing the site
    pub async fn find_in_scan(&self, scan_id: &str, file_name: &str) -> Result<String, ScanError> {
        single_component(scan_id)?;
        single_component(file_name)?;

        let mut sites = match tokio::fs::read_dir(&self.base).await {
            Ok(sites) => sites,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ScanError::NotFound(format!("Scan {scan_id} not found")));
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(site) = sites.next_entry().await? {
            if !site.file_type().await?.is_dir() {
                continue;
            }
            let candidate = site.path().join(scan_id).join(file_name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false)
                && let Some(site_name) = site.file_name().to_str()
            {
                return Ok(format!("{site_name}/{scan_id}/{file_name}"));
            }
        }

        Err(ScanError::NotFound(format!("{file_name} not found in scan {scan_id}")))
    }

    /// Remove expired files, or everything when `force` is set
    ///
    /// Returns `None` when another sweep is already running.
    pub async fn sweep(&self, force: bool) -> Result<Option<SweepReport>, ScanError> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Sweep already in progress, skipping");
            return Ok(None);
        }
        let _reset = SweepFlag(&self.sweeping);

        let _guard = self.registry_lock.lock().await;
        let base = self.base.clone();
        let registry = self.registry_path();
        let ttl = self.ttl;

        let report = tokio::task::spawn_blocking(move || -> std::io::Result<SweepReport> {
            let entries = registry::load(&registry)?;
            let (mut report, removed) = purge::sweep_files(&purge::SweepPlan {
                base: &base,
                entries: &entries,
                ttl,
                force,
                now: Utc::now(),
            });

            let survivors: Vec<&ExpiryEntry> = entries
                .values()
                .filter(|e| !removed.contains(&e.path) && base.join(&e.path).exists())
                .collect();
            report.retained = survivors.len();
            registry::rewrite(&registry, survivors)?;
            Ok(report)
        })
        .await
        .map_err(|e| ScanError::Internal(format!("Sweep task panicked: {e}")))??;
        ensure_storage_sentinel(&self.base).await?;

        log::info!(
            "Sweep removed {} files ({} bytes) and {} directories, {} retained",
            report.files_removed,
            report.bytes_freed,
            report.dirs_removed,
            report.retained
        );
        Ok(Some(report))
    }

    /// Count regular files under the base, excluding store bookkeeping
    pub async fn file_count(&self) -> Result<usize, ScanError> {
        let base = self.base.clone();
        tokio::task::spawn_blocking(move || {
            jwalk::WalkDir::new(&base)
                .skip_hidden(false)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    let name = e.file_name().to_string_lossy();
                    e.depth != 1 || (name != STORAGE_SENTINEL && name != EXPIRY_REGISTRY_FILE)
                })
                .count()
        })
        .await
        .map_err(|e| ScanError::Internal(format!("File count task panicked: {e}")))
    }

    /// Whether the base directory is present and writable
    pub async fn is_reachable(&self) -> bool {
        let probe = self.base.join(format!(".probe-{}", uuid::Uuid::new_v4()));
        let ok = tokio::fs::write(&probe, b"ok").await.is_ok();
        let _ = tokio::fs::remove_file(&probe).await;
        ok
    }

    /// Sweep once now, then on every `interval` (at least one second)
    pub fn start_purge_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        if interval < MIN_PURGE_INTERVAL {
            log::warn!(
                "Purge interval {interval:?} too short, using {MIN_PURGE_INTERVAL:?}"
            );
        }
        let interval = interval.max(MIN_PURGE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep(false).await {
                    log::warn!("Scheduled sweep failed: {e}");
                }
            }
        })
    }

    /// Validate `relative_path` and join it onto the base
    ///
    /// Only plain components are accepted, so the result can never leave
    /// the base. The expiry log and sentinel are not addressable.
    fn resolve(&self, relative_path: &str) -> Result<(String, PathBuf), ScanError> {
        let mut parts = Vec::new();
        for component in Path::new(relative_path).components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        ScanError::Validation(format!("Non UTF-8 path: {relative_path}"))
                    })?;
                    parts.push(part);
                }
                _ => {
                    return Err(ScanError::Validation(format!(
                        "Path escapes storage base: {relative_path}"
                    )));
                }
            }
        }

        if parts.is_empty() {
            return Err(ScanError::Validation("Empty storage path".to_string()));
        }
        if parts.len() == 1 && (parts[0] == EXPIRY_REGISTRY_FILE || parts[0] == STORAGE_SENTINEL) {
            return Err(ScanError::Validation(format!(
                "Reserved storage path: {relative_path}"
            )));
        }

        let full = parts.iter().fold(self.base.clone(), |acc, p| acc.join(p));
        Ok((parts.join("/"), full))
    }

    /// Reject `full` when a symlink on its way leads outside the base
    ///
    /// Checks the deepest existing ancestor (or the path itself), with links
    /// resolved. Dangling links are rejected since writes would follow them.
    async fn confine(&self, key: &str, full: &Path) -> Result<(), ScanError> {
        let escaped = || ScanError::Validation(format!("Path escapes storage base: {key}"));
        let mut current = full;
        loop {
            match tokio::fs::canonicalize(current).await {
                Ok(real) if real.starts_with(&self.real_base) => return Ok(()),
                Ok(_) => return Err(escaped()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    let dangling = tokio::fs::symlink_metadata(current)
                        .await
                        .is_ok_and(|meta| meta.file_type().is_symlink());
                    if dangling {
                        return Err(escaped());
                    }
                    match current.parent() {
                        Some(parent) => current = parent,
                        None => return Ok(()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Clears the in-progress flag when the sweep ends
struct SweepFlag<'a>(&'a AtomicBool);

impl Drop for SweepFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn single_component(part: &str) -> Result<(), ScanError> {
    let mut components = Path::new(part).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ScanError::Validation(format!("Invalid path segment: {part}"))),
    }
}
