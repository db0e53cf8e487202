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

//! Adaptive multi-tier block cache.
//!
//! Items live in Hot/Warm/Cold tiers; accesses promote, maintenance demotes.
//! Eviction is policy-driven and batched: candidates are selected under the
//! write lock, removal happens in a fresh critical section. Randomizer
//! blocks are first-class citizens here because their reuse is what pushes
//! storage overhead toward the 1.5x floor.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::block::Block;
use crate::monitoring::metrics::Metrics;
use crate::tasks::{now_unix, TaskGroup};

pub mod policy;
pub mod predictor;

use policy::{EvictionPolicy, PolicyKind};
use predictor::AccessPredictor;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Eviction could not free enough space for the item.
    #[error("capacity exhausted")]
    CapacityExhausted,
    /// Poisoned internal lock.
    #[error("lock poisoned")]
    Lock,
}

/// Cache tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Most valuable ~10% of capacity.
    Hot,
    /// Middle ~30%.
    Warm,
    /// Bulk ~60%.
    Cold,
}

impl Tier {
    /// Lowercase name for logs and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }
}

/// What a cached block is, as far as the cache cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// XOR randomizer; enters Hot and counts reuse.
    Randomizer,
    /// Anonymized or plain user data.
    UserData,
    /// Stored descriptor bytes.
    Descriptor,
    /// Brought in by the preloader.
    Preloaded,
}

/// Typed metadata attached on insert.
#[derive(Clone, Debug)]
pub struct BlockMeta {
    /// Block kind.
    pub kind: BlockKind,
    /// Peer the block came from, when known.
    pub source_peer: Option<String>,
    /// Prediction score that motivated a preload.
    pub prediction_score: Option<f64>,
}

impl BlockMeta {
    /// Plain user data.
    pub fn user_data() -> Self {
        Self {
            kind: BlockKind::UserData,
            source_peer: None,
            prediction_score: None,
        }
    }

    /// Randomizer block.
    pub fn randomizer() -> Self {
        Self {
            kind: BlockKind::Randomizer,
            source_peer: None,
            prediction_score: None,
        }
    }

    /// Descriptor bytes.
    pub fn descriptor() -> Self {
        Self {
            kind: BlockKind::Descriptor,
            source_peer: None,
            prediction_score: None,
        }
    }

    /// Preloaded block with the score that selected it.
    pub fn preloaded(score: f64) -> Self {
        Self {
            kind: BlockKind::Preloaded,
            source_peer: None,
            prediction_score: Some(score),
        }
    }
}

/// One cached block with its scoring state.
#[derive(Clone, Debug)]
pub struct CacheItem {
    /// Content id.
    pub cid: String,
    /// The block itself.
    pub block: Arc<Block>,
    /// Payload size in bytes.
    pub size: u64,
    /// Insert time, unix seconds.
    pub created_at: i64,
    /// Last access, unix seconds.
    pub last_accessed: i64,
    /// Plain access counter.
    pub access_count: u64,
    /// Popularity in `[0, 1]`, recomputed by maintenance.
    pub popularity_score: f64,
    /// Predictor output in `[0, 1]`, recomputed periodically.
    pub predicted_value: f64,
    /// Current tier.
    pub tier: Tier,
    /// Whether this block serves as a randomizer.
    pub is_randomizer: bool,
    /// Times this block was reused as a randomizer.
    pub randomizer_uses: u64,
    /// Peer the block came from, when known.
    pub source_peer: Option<String>,
}

/// Cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total capacity in bytes.
    pub capacity_bytes: u64,
    /// Eviction policy.
    pub eviction_policy: PolicyKind,
    /// Max items removed per eviction round.
    pub eviction_batch: usize,
    /// Maintenance loop interval in seconds.
    pub maintenance_interval_secs: u64,
    /// Predictor loop interval in seconds.
    pub predictor_interval_secs: u64,
    /// How many predicted CIDs the preloader fetches per pass.
    pub preload_top_n: usize,
    /// Access patterns idle at least this long are dropped.
    pub pattern_idle_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 256 * 1024 * 1024,
            eviction_policy: PolicyKind::Hybrid,
            eviction_batch: 16,
            maintenance_interval_secs: 300,
            predictor_interval_secs: 120,
            preload_top_n: 8,
            pattern_idle_secs: 86_400,
        }
    }
}

/// Observability snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct CacheStats {
    /// Cached items.
    pub items: usize,
    /// Cached bytes.
    pub bytes: u64,
    /// Configured capacity.
    pub capacity_bytes: u64,
    /// Utilization in `[0, 1]`.
    pub utilization: f64,
    /// Hot-tier items.
    pub hot_items: usize,
    /// Warm-tier items.
    pub warm_items: usize,
    /// Cold-tier items.
    pub cold_items: usize,
    /// Hits since start.
    pub hits: u64,
    /// Misses since start.
    pub misses: u64,
    /// Evictions since start.
    pub evictions: u64,
    /// Randomizer reuse events since start.
    pub randomizer_uses: u64,
}

/// Fetches one block by CID for the preloader.
pub type PreloadFn = Arc<dyn Fn(String) -> BoxFuture<'static, Option<Block>> + Send + Sync>;

#[derive(Default)]
struct CacheInner {
    items: BTreeMap<String, CacheItem>,
    bytes: u64,
}

/// The adaptive block cache.
pub struct AdaptiveCache {
    cfg: CacheConfig,
    inner: RwLock<CacheInner>,
    predictor: Mutex<AccessPredictor>,
    policy: Box<dyn EvictionPolicy>,
    metrics: Arc<Metrics>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    randomizer_uses: AtomicU64,
}

const MAX_EVICT_ROUNDS: usize = 16;

fn tier_for_score(score: f64) -> Tier {
    if score > 0.66 {
        Tier::Hot
    } else if score > 0.33 {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

impl AdaptiveCache {
    /// Build a cache with the configured policy.
    pub fn new(cfg: CacheConfig, metrics: Arc<Metrics>) -> Self {
        let policy = cfg.eviction_policy.build();
        Self {
            cfg,
            inner: RwLock::new(CacheInner::default()),
            predictor: Mutex::new(AccessPredictor::new()),
            policy,
            metrics,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            randomizer_uses: AtomicU64::new(0),
        }
    }

    /// Configured capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.cfg.capacity_bytes
    }

    /// Look up a block. A hit bumps access stats and may promote the tier.
    pub fn get(&self, cid: &str) -> Option<(Arc<Block>, Tier)> {
        let now = now_unix();
        let hit = {
            let mut inner = self.inner.write().ok()?;
            match inner.items.get_mut(cid) {
                Some(item) => {
                    item.access_count += 1;
                    item.last_accessed = now;
                    Self::maybe_promote(item, now);
                    Some((item.block.clone(), item.tier))
                }
                None => None,
            }
        };
        match hit {
            Some(found) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_hits_total.inc();
                if let Ok(mut p) = self.predictor.lock() {
                    p.record_access(cid, now);
                }
                Some(found)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_misses_total.inc();
                None
            }
        }
    }

    /// Whether a CID is currently cached.
    pub fn contains(&self, cid: &str) -> bool {
        self.inner
            .read()
            .map(|i| i.items.contains_key(cid))
            .unwrap_or(false)
    }

    /// Insert a block. Idempotent; evicts (in batches) when full.
    pub fn put(&self, cid: &str, block: Arc<Block>, meta: &BlockMeta) -> Result<(), CacheError> {
        let size = block.len() as u64;
        if size > self.cfg.capacity_bytes {
            return Err(CacheError::CapacityExhausted);
        }
        let now = now_unix();

        let predicted = meta.prediction_score.unwrap_or_else(|| {
            self.predictor
                .lock()
                .map(|p| p.predict(cid, now))
                .unwrap_or(0.0)
        });

        for _ in 0..MAX_EVICT_ROUNDS {
            let candidates = {
                let mut inner = self.inner.write().map_err(|_| CacheError::Lock)?;
                if let Some(existing) = inner.items.get_mut(cid) {
                    // Re-add: only the randomizer role can be upgraded.
                    if meta.kind == BlockKind::Randomizer && !existing.is_randomizer {
                        existing.is_randomizer = true;
                        existing.tier = Tier::Hot;
                    }
                    return Ok(());
                }
                if inner.bytes + size <= self.cfg.capacity_bytes {
                    let tier = match meta.kind {
                        BlockKind::Randomizer => Tier::Hot,
                        _ => tier_for_score(predicted),
                    };
                    inner.items.insert(
                        cid.to_string(),
                        CacheItem {
                            cid: cid.to_string(),
                            block,
                            size,
                            created_at: now,
                            last_accessed: now,
                            access_count: 0,
                            popularity_score: 0.0,
                            predicted_value: predicted,
                            tier,
                            is_randomizer: meta.kind == BlockKind::Randomizer,
                            randomizer_uses: 0,
                            source_peer: meta.source_peer.clone(),
                        },
                    );
                    inner.bytes += size;
                    self.metrics.cache_items.set(inner.items.len() as i64);
                    self.metrics.cache_bytes.set(inner.bytes as i64);
                    return Ok(());
                }
                let needed = inner.bytes + size - self.cfg.capacity_bytes;
                let mut c = self.policy.select_candidates(&inner.items, needed, now);
                c.truncate(self.cfg.eviction_batch.max(1));
                c
            };

            if candidates.is_empty() {
                return Err(CacheError::CapacityExhausted);
            }
            self.remove_candidates(&candidates)?;
        }
        Err(CacheError::CapacityExhausted)
    }

    /// Up to `n` popular size-matched randomizer blocks.
    pub fn get_randomizers(&self, n: usize, size: usize) -> Vec<(String, Arc<Block>)> {
        let Ok(inner) = self.inner.read() else {
            return Vec::new();
        };
        let mut candidates: Vec<&CacheItem> = inner
            .items
            .values()
            .filter(|it| it.is_randomizer && it.block.len() == size)
            .collect();
        candidates.sort_by(|a, b| {
            b.popularity_score
                .partial_cmp(&a.popularity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.randomizer_uses.cmp(&a.randomizer_uses))
                .then_with(|| a.cid.cmp(&b.cid))
        });
        candidates
            .into_iter()
            .take(n)
            .map(|it| (it.cid.clone(), it.block.clone()))
            .collect()
    }

    /// Count one randomizer reuse for a CID.
    pub fn increment_popularity(&self, cid: &str) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(item) = inner.items.get_mut(cid) {
                item.randomizer_uses += 1;
                // Visible before the next maintenance pass recomputes it.
                item.popularity_score = (item.popularity_score + 0.1).min(1.0);
            }
        }
        self.randomizer_uses.fetch_add(1, Ordering::Relaxed);
        self.metrics.randomizer_reuse_total.inc();
    }

    /// Observability snapshot.
    pub fn stats(&self) -> CacheStats {
        let (items, bytes, hot, warm, cold) = match self.inner.read() {
            Ok(inner) => {
                let mut hot = 0;
                let mut warm = 0;
                let mut cold = 0;
                for it in inner.items.values() {
                    match it.tier {
                        Tier::Hot => hot += 1,
                        Tier::Warm => warm += 1,
                        Tier::Cold => cold += 1,
                    }
                }
                (inner.items.len(), inner.bytes, hot, warm, cold)
            }
            Err(_) => (0, 0, 0, 0, 0),
        };
        CacheStats {
            items,
            bytes,
            capacity_bytes: self.cfg.capacity_bytes,
            utilization: if self.cfg.capacity_bytes == 0 {
                0.0
            } else {
                bytes as f64 / self.cfg.capacity_bytes as f64
            },
            hot_items: hot,
            warm_items: warm,
            cold_items: cold,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            randomizer_uses: self.randomizer_uses.load(Ordering::Relaxed),
        }
    }

    /// Periodic maintenance: popularity refresh, demotions, proactive
    /// freeing above 80% utilization, pattern pruning.
    pub fn run_maintenance(&self, now: i64) {
        if let Ok(mut inner) = self.inner.write() {
            for item in inner.items.values_mut() {
                let hours_alive = (((now - item.created_at).max(3_600)) as f64) / 3_600.0;
                let rate = (item.access_count as f64 / hours_alive).min(10.0) / 10.0;
                let recency =
                    1.0 / (1.0 + ((now - item.last_accessed).max(0) as f64) / 3_600.0);
                let bonus = if item.randomizer_uses > 0 { 1.5 } else { 1.0 };
                item.popularity_score = (rate * recency * bonus).clamp(0.0, 1.0);

                match item.tier {
                    Tier::Hot if item.popularity_score < 0.5 => item.tier = Tier::Warm,
                    Tier::Warm if item.popularity_score < 0.2 => item.tier = Tier::Cold,
                    _ => {}
                }
            }
        }

        let (bytes, cap) = (
            self.inner.read().map(|i| i.bytes).unwrap_or(0),
            self.cfg.capacity_bytes,
        );
        if cap > 0 && bytes as f64 > cap as f64 * 0.8 {
            let target = bytes.saturating_sub(cap / 10);
            if let Err(e) = self.free_down_to(target, now) {
                warn!(?e, "proactive cache free failed");
            }
        }

        if let Ok(mut p) = self.predictor.lock() {
            let dropped = p.prune_idle(now, self.cfg.pattern_idle_secs as i64);
            if dropped > 0 {
                debug!(dropped, "pruned idle access patterns");
            }
        }
    }

    /// Periodic prediction pass over every cached item.
    pub fn run_prediction(&self, now: i64) {
        let cids: Vec<String> = match self.inner.read() {
            Ok(inner) => inner.items.keys().cloned().collect(),
            Err(_) => return,
        };
        let scores: Vec<(String, f64)> = {
            let Ok(p) = self.predictor.lock() else { return };
            cids.iter().map(|c| (c.clone(), p.predict(c, now))).collect()
        };
        if let Ok(mut inner) = self.inner.write() {
            for (cid, score) in scores {
                if let Some(item) = inner.items.get_mut(&cid) {
                    item.predicted_value = score;
                }
            }
        }
    }

    /// Preload the top predicted CIDs through `fetcher`. Skipped above 90%
    /// utilization.
    pub async fn preload(&self, fetcher: &PreloadFn) {
        let stats = self.stats();
        if stats.utilization > 0.9 {
            return;
        }
        let now = now_unix();
        let top = {
            let Ok(p) = self.predictor.lock() else { return };
            p.top_predicted(self.cfg.preload_top_n, now, &|cid| self.contains(cid))
        };
        for (cid, score) in top {
            if let Some(block) = fetcher(cid.clone()).await {
                let meta = BlockMeta::preloaded(score);
                if let Err(e) = self.put(&cid, Arc::new(block), &meta) {
                    debug!(%cid, ?e, "preload insert skipped");
                }
            }
        }
    }

    /// Start the maintenance, prediction, and (optional) preload loops.
    pub fn start(self: &Arc<Self>, fetcher: Option<PreloadFn>) -> TaskGroup {
        let mut group = TaskGroup::new();

        let cache = Arc::clone(self);
        let mut sh = group.shutdown_rx();
        let every = Duration::from_secs(self.cfg.maintenance_interval_secs.max(1));
        group.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = sh.changed() => break,
                    _ = tick.tick() => cache.run_maintenance(now_unix()),
                }
            }
        }));

        let cache = Arc::clone(self);
        let mut sh = group.shutdown_rx();
        let every = Duration::from_secs(self.cfg.predictor_interval_secs.max(1));
        group.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = sh.changed() => break,
                    _ = tick.tick() => cache.run_prediction(now_unix()),
                }
            }
        }));

        if let Some(fetcher) = fetcher {
            let cache = Arc::clone(self);
            let mut sh = group.shutdown_rx();
            let every = Duration::from_secs(self.cfg.predictor_interval_secs.max(1));
            group.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(every);
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = sh.changed() => break,
                        _ = tick.tick() => cache.preload(&fetcher).await,
                    }
                }
            }));
        }

        group
    }

    fn maybe_promote(item: &mut CacheItem, now: i64) {
        let hours_alive = (((now - item.created_at).max(3_600)) as f64) / 3_600.0;
        let rate = item.access_count as f64 / hours_alive;
        let recency = 1.0 / (1.0 + ((now - item.last_accessed).max(0) as f64) / 3_600.0);
        let momentum = rate * recency;
        match item.tier {
            Tier::Cold if momentum > 0.5 => item.tier = Tier::Warm,
            Tier::Warm if momentum > 1.0 => item.tier = Tier::Hot,
            _ => {}
        }
    }

    fn remove_candidates(&self, candidates: &[String]) -> Result<(), CacheError> {
        let mut inner = self.inner.write().map_err(|_| CacheError::Lock)?;
        for cid in candidates {
            if let Some(item) = inner.items.remove(cid) {
                inner.bytes = inner.bytes.saturating_sub(item.size);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.metrics.cache_evictions_total.inc();
            }
        }
        self.metrics.cache_items.set(inner.items.len() as i64);
        self.metrics.cache_bytes.set(inner.bytes as i64);
        Ok(())
    }

    fn free_down_to(&self, target_bytes: u64, now: i64) -> Result<(), CacheError> {
        for _ in 0..MAX_EVICT_ROUNDS {
            let candidates = {
                let inner = self.inner.read().map_err(|_| CacheError::Lock)?;
                if inner.bytes <= target_bytes {
                    return Ok(());
                }
                let needed = inner.bytes - target_bytes;
                let mut c = self.policy.select_candidates(&inner.items, needed, now);
                c.truncate(self.cfg.eviction_batch.max(1));
                c
            };
            if candidates.is_empty() {
                return Ok(());
            }
            self.remove_candidates(&candidates)?;
        }
        Ok(())
    }
}
