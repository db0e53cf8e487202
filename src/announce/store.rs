// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Disk-backed store of received announcements.
//!
//! One JSON file per record, named `<descriptor>_<nonce>.json` after
//! sanitization. Both name components are validated before any filesystem
//! work: traversal attempts fail the add, no file is created. Deduplication
//! keys on `(descriptor, nonce)`; re-adds are idempotent.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::announce::record::Announcement;
use crate::monitoring::metrics::Metrics;
use crate::tasks::{now_unix, TaskGroup};

/// Longest sanitized filename component.
const MAX_COMPONENT_LEN: usize = 50;
/// Name component used when a record carries no nonce.
const NO_NONCE: &str = "none";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A name component is empty or attempts traversal.
    #[error("unsafe record name")]
    UnsafeName,
    /// Filesystem failure.
    #[error("io")]
    Io,
    /// Record encode failed.
    #[error("encode")]
    Encode,
    /// Poisoned internal lock.
    #[error("lock poisoned")]
    Lock,
}

/// Sanitize one filename component.
///
/// Rejects empty strings, null bytes, path separators and `..`; every other
/// character outside `[A-Za-z0-9_-]` becomes `_`; length is capped.
pub fn sanitize_component(raw: &str) -> Result<String, StoreError> {
    if raw.is_empty()
        || raw.contains('\0')
        || raw.contains('/')
        || raw.contains('\\')
        || raw.contains("..")
    {
        return Err(StoreError::UnsafeName);
    }
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    out.truncate(MAX_COMPONENT_LEN);
    Ok(out)
}

/// Stable store id for a record: `<descriptor>_<nonce>` after sanitization.
pub fn record_id(descriptor: &str, nonce: Option<&str>) -> Result<String, StoreError> {
    let d = sanitize_component(descriptor)?;
    let n = sanitize_component(nonce.unwrap_or(NO_NONCE))?;
    Ok(format!("{d}_{n}"))
}

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Record directory; resolved from the data dir when empty.
    pub dir: PathBuf,
    /// Records beyond this are trimmed oldest-first during cleanup.
    pub max_records: usize,
    /// Cleanup loop interval in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            max_records: 10_000,
            cleanup_interval_secs: 3_600,
        }
    }
}

/// A received announcement plus ingest context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRecord {
    /// The record itself.
    pub announcement: Announcement,
    /// Where it came from (peer id or ingest channel).
    pub source: String,
    /// Receipt time, unix seconds.
    pub received_at: i64,
}

/// Store snapshot for observability.
#[derive(Clone, Debug, Serialize)]
pub struct StoreStats {
    /// Records currently held.
    pub total: usize,
    /// Records per topic hash.
    pub by_topic: BTreeMap<String, usize>,
    /// Held records already past their TTL.
    pub expired: usize,
}

/// The announcement store.
pub struct AnnouncementStore {
    cfg: StoreConfig,
    inner: RwLock<BTreeMap<String, StoredRecord>>,
    metrics: Arc<Metrics>,
}

impl AnnouncementStore {
    /// Open the store, loading any records already on disk.
    pub fn open(cfg: StoreConfig, metrics: Arc<Metrics>) -> Result<Self, StoreError> {
        fs::create_dir_all(&cfg.dir).map_err(|_| StoreError::Io)?;

        let mut records = BTreeMap::new();
        let entries = fs::read_dir(&cfg.dir).map_err(|_| StoreError::Io)?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read(&path).ok().and_then(|b| serde_json::from_slice::<StoredRecord>(&b).ok())
            {
                Some(rec) => {
                    if let Ok(id) =
                        record_id(&rec.announcement.descriptor, rec.announcement.nonce.as_deref())
                    {
                        records.insert(id, rec);
                    }
                }
                None => warn!(path = %path.display(), "skipping unreadable store record"),
            }
        }

        metrics.announce_records.set(records.len() as i64);
        Ok(Self {
            cfg,
            inner: RwLock::new(records),
            metrics,
        })
    }

    /// Add a record. Returns `true` when it is new, `false` on an idempotent
    /// re-add. Unsafe names fail before any file is created.
    pub fn add(&self, announcement: Announcement, source: &str) -> Result<bool, StoreError> {
        let id = record_id(&announcement.descriptor, announcement.nonce.as_deref())?;
        let record = StoredRecord {
            announcement,
            source: source.to_string(),
            received_at: now_unix(),
        };

        // The write lock also serializes the file write for this id.
        let mut inner = self.inner.write().map_err(|_| StoreError::Lock)?;
        if inner.contains_key(&id) {
            return Ok(false);
        }
        self.write_record_file(&id, &record)?;
        inner.insert(id, record);
        self.metrics.announce_records.set(inner.len() as i64);
        Ok(true)
    }

    /// Record by store id.
    pub fn get_by_id(&self, id: &str) -> Option<StoredRecord> {
        self.inner.read().ok()?.get(id).cloned()
    }

    /// All records for a topic hash.
    pub fn get_by_topic(&self, topic_hash: &str) -> Vec<StoredRecord> {
        self.inner
            .read()
            .map(|m| {
                m.values()
                    .filter(|r| r.announcement.topic_hash == topic_hash)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All records announcing a descriptor.
    pub fn get_by_descriptor(&self, descriptor: &str) -> Vec<StoredRecord> {
        self.inner
            .read()
            .map(|m| {
                m.values()
                    .filter(|r| r.announcement.descriptor == descriptor)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records received at or after `since`, newest first, capped at `limit`.
    pub fn get_recent(&self, since: i64, limit: usize) -> Vec<StoredRecord> {
        let mut recent: Vec<StoredRecord> = self
            .inner
            .read()
            .map(|m| {
                m.values()
                    .filter(|r| r.received_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        recent.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        recent.truncate(limit);
        recent
    }

    /// Every held record.
    pub fn get_all(&self) -> Vec<StoredRecord> {
        self.inner
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Held record count.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observability snapshot.
    pub fn stats(&self, now: i64) -> StoreStats {
        let Ok(inner) = self.inner.read() else {
            return StoreStats {
                total: 0,
                by_topic: BTreeMap::new(),
                expired: 0,
            };
        };
        let mut by_topic: BTreeMap<String, usize> = BTreeMap::new();
        let mut expired = 0;
        for r in inner.values() {
            *by_topic.entry(r.announcement.topic_hash.clone()).or_insert(0) += 1;
            if r.announcement.is_expired(now) {
                expired += 1;
            }
        }
        StoreStats {
            total: inner.len(),
            by_topic,
            expired,
        }
    }

    /// Remove expired records and trim past `max_records`, oldest first.
    /// Returns `(expired_removed, trimmed)`.
    pub fn cleanup(&self, now: i64) -> (usize, usize) {
        let mut doomed: Vec<String> = Vec::new();
        let mut trimmed: Vec<String> = Vec::new();
        {
            let Ok(inner) = self.inner.read() else {
                return (0, 0);
            };
            for (id, r) in inner.iter() {
                if r.announcement.is_expired(now) {
                    doomed.push(id.clone());
                }
            }
            let live = inner.len() - doomed.len();
            if live > self.cfg.max_records {
                let mut by_age: Vec<(&String, i64)> = inner
                    .iter()
                    .filter(|(id, _)| !doomed.contains(id))
                    .map(|(id, r)| (id, r.received_at))
                    .collect();
                by_age.sort_by_key(|(_, t)| *t);
                trimmed = by_age
                    .iter()
                    .take(live - self.cfg.max_records)
                    .map(|(id, _)| (*id).clone())
                    .collect();
            }
        }

        let expired_count = doomed.len();
        let trimmed_count = trimmed.len();
        if expired_count > 0 || trimmed_count > 0 {
            if let Ok(mut inner) = self.inner.write() {
                for id in doomed.iter().chain(trimmed.iter()) {
                    if inner.remove(id).is_some() {
                        let _ = fs::remove_file(self.path_for(id));
                    }
                }
                self.metrics.announce_records.set(inner.len() as i64);
            }
            self.metrics
                .announce_expired_total
                .inc_by(expired_count as u64);
            debug!(expired = expired_count, trimmed = trimmed_count, "store cleanup");
        }
        (expired_count, trimmed_count)
    }

    /// Start the periodic cleanup loop.
    pub fn start(self: &Arc<Self>) -> TaskGroup {
        let mut group = TaskGroup::new();
        let store = Arc::clone(self);
        let mut sh = group.shutdown_rx();
        let every = Duration::from_secs(self.cfg.cleanup_interval_secs.max(1));
        group.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = sh.changed() => break,
                    _ = tick.tick() => {
                        store.cleanup(now_unix());
                    }
                }
            }
        }));
        group
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.cfg.dir.join(format!("{id}.json"))
    }

    fn write_record_file(&self, id: &str, record: &StoredRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|_| StoreError::Encode)?;
        let path = self.path_for(id);
        let tmp = self.cfg.dir.join(format!("{id}.json.tmp"));
        {
            let mut f = fs::File::create(&tmp).map_err(|_| StoreError::Io)?;
            f.write_all(&bytes).map_err(|_| StoreError::Io)?;
            let _ = f.sync_all();
        }
        fs::rename(&tmp, &path).map_err(|_| StoreError::Io)?;
        Ok(())
    }
}
