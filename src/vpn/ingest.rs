//! Blacklist and whitelist ingestion.
//!
//! Runs once at startup. Blacklist files are only re-read when their
//! modification time is newer than the one recorded in the store ledger.
//! Whitelist files are applied on every pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::common::error::{StoreError, StoreResult};
use crate::vpn::range::{parse_line, IpRange};
use crate::vpn::store::RangeStore;

/// Counters collected over one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_ingested: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub ranges_inserted: usize,
    pub ranges_removed: usize,
    pub lines_skipped: usize,
}

/// What a single list file did to the store.
#[derive(Debug, Default)]
struct FileOutcome {
    applied: usize,
    skipped: usize,
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Blacklist,
    Whitelist,
}

pub struct Ingestor {
    store: Arc<dyn RangeStore>,
    default_reason: String,
}

impl Ingestor {
    pub fn new(store: Arc<dyn RangeStore>, default_reason: impl Into<String>) -> Self {
        Self {
            store,
            default_reason: default_reason.into(),
        }
    }

    /// Apply every changed blacklist file, then every whitelist file.
    ///
    /// Only failing to prepare or list the roots is an error. A file that
    /// cannot be read, or whose store updates fail, is logged, counted in
    /// the report and skipped.
    pub async fn run(&self, blacklist_root: &Path, whitelist_root: &Path) -> StoreResult<IngestReport> {
        let mut report = IngestReport::default();

        for root in [blacklist_root, whitelist_root] {
            tokio::fs::create_dir_all(root).await.map_err(|e| io_error(root, e))?;
        }

        let (blacklists, unreadable) = list_files(blacklist_root).await?;
        report.files_failed += unreadable;
        for path in blacklists {
            let (key, modified) = match file_identity(&path).await {
                Ok(identity) => identity,
                Err(e) => {
                    error!("Skipped blacklist {}: {}", path.display(), e);
                    report.files_failed += 1;
                    continue;
                }
            };

            let seen = match self.store.last_modified(&key).await {
                Ok(seen) => seen,
                Err(e) => {
                    error!("Failed to read ledger for {}: {}", key, e);
                    report.files_failed += 1;
                    continue;
                }
            };
            if seen.is_some_and(|seen| modified <= seen) {
                debug!("File has not been modified, skipping: {}", key);
                report.files_unchanged += 1;
                continue;
            }

            match self.apply_file(&path, ListKind::Blacklist).await {
                Ok(outcome) => {
                    if let Err(e) = self.store.set_last_modified(&key, modified).await {
                        error!("Failed to update ledger for {}: {}", key, e);
                        report.files_failed += 1;
                    } else {
                        report.files_ingested += 1;
                    }
                    report.ranges_inserted += outcome.applied;
                    report.lines_skipped += outcome.skipped;
                    info!("Added {:>7} IP ranges from: {}", outcome.applied, key);
                }
                Err(e) => {
                    error!("Aborted ingestion of {}: {}", key, e);
                    report.files_failed += 1;
                }
            }
        }

        let (whitelists, unreadable) = list_files(whitelist_root).await?;
        report.files_failed += unreadable;
        for path in whitelists {
            match self.apply_file(&path, ListKind::Whitelist).await {
                Ok(outcome) => {
                    report.files_ingested += 1;
                    report.ranges_removed += outcome.applied;
                    report.lines_skipped += outcome.skipped;
                    info!("Removed {:>5} potential IP ranges from: {}", outcome.applied, path.display());
                }
                Err(e) => {
                    error!("Aborted whitelist {}: {}", path.display(), e);
                    report.files_failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn apply_file(&self, path: &Path, kind: ListKind) -> StoreResult<FileOutcome> {
        let bytes = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let mut outcome = FileOutcome::default();

        for line in content.lines() {
            let Some((range_text, reason)) = parse_line(line) else {
                continue;
            };
            let range = match IpRange::parse(range_text) {
                Ok(range) => range,
                Err(_) => {
                    warn!("Skipped invalid range: {}", range_text);
                    outcome.skipped += 1;
                    continue;
                }
            };

            match kind {
                ListKind::Blacklist => {
                    let reason = reason.unwrap_or(&self.default_reason);
                    self.store.insert(&range, reason).await?;
                }
                ListKind::Whitelist => self.store.remove(&range).await?,
            }
            outcome.applied += 1;
        }

        Ok(outcome)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Ledger key (canonical path) and modification time of `path`.
async fn file_identity(path: &Path) -> StoreResult<(String, DateTime<Utc>)> {
    let absolute = tokio::fs::canonicalize(path).await.map_err(|e| io_error(path, e))?;
    let metadata = tokio::fs::metadata(&absolute).await.map_err(|e| io_error(path, e))?;
    let modified = metadata.modified().map_err(|e| io_error(path, e))?;
    Ok((absolute.display().to_string(), DateTime::<Utc>::from(modified)))
}

/// Every file below `root`, sorted by path, plus the number of entries that
/// could not be read. Only an unreadable `root` is an error.
async fn list_files(root: &Path) -> StoreResult<(Vec<PathBuf>, usize)> {
    let mut files = Vec::new();
    let mut unreadable = 0;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir.as_path() == root => return Err(io_error(&dir, e)),
            Err(e) => {
                error!("Skipped unreadable folder {}: {}", dir.display(), e);
                unreadable += 1;
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("Stopped listing {}: {}", dir.display(), e);
                    unreadable += 1;
                    break;
                }
            };
            let path = entry.path();
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => pending.push(path),
                Ok(_) => files.push(path),
                Err(e) => {
                    error!("Skipped unreadable entry {}: {}", path.display(), e);
                    unreadable += 1;
                }
            }
        }
    }

    files.sort();
    Ok((files, unreadable))
}
