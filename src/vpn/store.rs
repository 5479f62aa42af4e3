//! IP-range storage.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::error::{StoreError, StoreResult};
use crate::vpn::range::IpRange;

/// Storage of blacklisted ranges plus the per-file ingestion ledger.
#[async_trait]
pub trait RangeStore: Send + Sync {
    /// Reason attached to the range containing `ip`, if any.
    async fn find(&self, ip: &str) -> StoreResult<Option<String>>;

    async fn insert(&self, range: &IpRange, reason: &str) -> StoreResult<()>;

    async fn remove(&self, range: &IpRange) -> StoreResult<()>;

    async fn last_modified(&self, path: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn set_last_modified(&self, path: &str, modified: DateTime<Utc>) -> StoreResult<()>;

    async fn close(&self) -> StoreResult<()>;
}

#[derive(Debug, Default)]
struct Ranges {
    /// start -> (end, reason); intervals never overlap.
    intervals: BTreeMap<u32, (u32, String)>,
    ledger: HashMap<String, DateTime<Utc>>,
}

impl Ranges {
    /// Drop `range` from every stored interval, keeping the parts outside it.
    fn carve(&mut self, range: &IpRange) {
        let overlapping: Vec<u32> = self
            .intervals
            .range(..=range.end)
            .rev()
            .take_while(|(_, (end, _))| *end >= range.start)
            .map(|(start, _)| *start)
            .collect();

        for start in overlapping {
            let Some((end, reason)) = self.intervals.remove(&start) else {
                continue;
            };
            if start < range.start {
                self.intervals.insert(start, (range.start - 1, reason.clone()));
            }
            if end > range.end {
                self.intervals.insert(range.end + 1, (end, reason));
            }
        }
    }

    fn find(&self, ip: u32) -> Option<&str> {
        self.intervals
            .range(..=ip)
            .next_back()
            .filter(|(_, (end, _))| *end >= ip)
            .map(|(_, (_, reason))| reason.as_str())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    ranges: Vec<SnapshotRange>,
    #[serde(default)]
    ledger: HashMap<String, DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
    reason: String,
}

/// In-process range store, optionally persisted to a JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryRangeStore {
    ranges: Mutex<Ranges>,
    path: Option<PathBuf>,
}

impl MemoryRangeStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading the snapshot if it exists.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut ranges = Ranges::default();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                for range in snapshot.ranges {
                    ranges
                        .intervals
                        .insert(u32::from(range.start), (u32::from(range.end), range.reason));
                }
                ranges.ledger = snapshot.ledger;
                info!(
                    "Loaded {} ranges and {} ledger entries from {}",
                    ranges.intervals.len(),
                    ranges.ledger.len(),
                    path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store snapshot at {}, starting empty", path.display());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }

        Ok(Self {
            ranges: Mutex::new(ranges),
            path: Some(path),
        })
    }

    /// Number of stored disjoint intervals.
    pub fn len(&self) -> usize {
        self.ranges.lock().intervals.len()
    }

    /// Write the snapshot file, if this store has one.
    pub async fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = {
            let ranges = self.ranges.lock();
            Snapshot {
                ranges: ranges
                    .intervals
                    .iter()
                    .map(|(start, (end, reason))| SnapshotRange {
                        start: Ipv4Addr::from(*start),
                        end: Ipv4Addr::from(*end),
                        reason: reason.clone(),
                    })
                    .collect(),
                ledger: ranges.ledger.clone(),
            }
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        let io_error = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, bytes).await.map_err(io_error)?;
        tokio::fs::rename(&staging, path).await.map_err(io_error)?;

        debug!("Store snapshot written to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl RangeStore for MemoryRangeStore {
    async fn find(&self, ip: &str) -> StoreResult<Option<String>> {
        let ip: Ipv4Addr = ip.trim().parse().map_err(|_| StoreError::InvalidIp { ip: ip.to_string() })?;
        Ok(self.ranges.lock().find(u32::from(ip)).map(str::to_string))
    }

    async fn insert(&self, range: &IpRange, reason: &str) -> StoreResult<()> {
        let mut ranges = self.ranges.lock();
        ranges.carve(range);
        ranges.intervals.insert(range.start, (range.end, reason.to_string()));
        Ok(())
    }

    async fn remove(&self, range: &IpRange) -> StoreResult<()> {
        self.ranges.lock().carve(range);
        Ok(())
    }

    async fn last_modified(&self, path: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.ranges.lock().ledger.get(path).copied())
    }

    async fn set_last_modified(&self, path: &str, modified: DateTime<Utc>) -> StoreResult<()> {
        self.ranges.lock().ledger.insert(path.to_string(), modified);
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.flush().await
    }
}
