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

//! Pluggable eviction policies.
//!
//! `priority` is a keep-score: lower means evict sooner. Candidate selection
//! never returns Hot-tier items while cooler items can free enough space.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheItem, Tier};

const SECS_PER_DAY: f64 = 86_400.0;

/// Eviction policy interface.
pub trait EvictionPolicy: Send + Sync {
    /// Policy name for logs and stats.
    fn name(&self) -> &'static str;

    /// Whether an item is eligible for eviction at all.
    fn should_evict(&self, item: &CacheItem, _now: i64) -> bool {
        item.tier != Tier::Hot
    }

    /// Keep-score; lower means evict sooner.
    fn priority(&self, item: &CacheItem, now: i64) -> f64;

    /// Pick CIDs to evict, freeing at least `space_needed` bytes when
    /// possible. Hot items are touched only when cooler tiers cannot cover
    /// the request.
    fn select_candidates(
        &self,
        items: &BTreeMap<String, CacheItem>,
        space_needed: u64,
        now: i64,
    ) -> Vec<String> {
        let mut cool: Vec<(&String, &CacheItem)> = items
            .iter()
            .filter(|(_, it)| it.tier != Tier::Hot && self.should_evict(it, now))
            .collect();
        cool.sort_by(|a, b| {
            self.priority(a.1, now)
                .partial_cmp(&self.priority(b.1, now))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let mut out = Vec::new();
        let mut freed = 0u64;
        for (cid, it) in cool {
            if freed >= space_needed {
                break;
            }
            freed += it.size;
            out.push(cid.clone());
        }
        if freed >= space_needed {
            return out;
        }

        // Cooler tiers cannot cover the request; fall back to Hot.
        let mut hot: Vec<(&String, &CacheItem)> = items
            .iter()
            .filter(|(cid, it)| it.tier == Tier::Hot && !out.contains(cid))
            .collect();
        hot.sort_by(|a, b| {
            self.priority(a.1, now)
                .partial_cmp(&self.priority(b.1, now))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        for (cid, it) in hot {
            if freed >= space_needed {
                break;
            }
            freed += it.size;
            out.push(cid.clone());
        }
        out
    }
}

/// Least-recently-used.
#[derive(Clone, Copy, Debug, Default)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn priority(&self, item: &CacheItem, now: i64) -> f64 {
        -((now - item.last_accessed).max(0) as f64)
    }
}

/// Least-frequently-used.
#[derive(Clone, Copy, Debug, Default)]
pub struct LfuPolicy;

impl EvictionPolicy for LfuPolicy {
    fn name(&self) -> &'static str {
        "lfu"
    }

    fn priority(&self, item: &CacheItem, _now: i64) -> f64 {
        item.access_count as f64
    }
}

/// Model-scored policy over the item's predicted value and popularity.
#[derive(Clone, Copy, Debug, Default)]
pub struct MlPolicy;

impl MlPolicy {
    /// Eviction pressure: higher means evict sooner.
    fn pressure(item: &CacheItem, now: i64) -> f64 {
        let recency_days = (now - item.last_accessed).max(0) as f64 / SECS_PER_DAY;
        let tier_weight = match item.tier {
            Tier::Hot => 0.1,
            Tier::Warm => 0.5,
            Tier::Cold => 1.0,
        };
        let randomizer_bonus = if item.is_randomizer && item.randomizer_uses >= 3 {
            0.3
        } else {
            1.0
        };
        let size_factor = 1.0 + (item.size as f64 / (1u64 << 20) as f64) * 0.1;
        (1.0 - item.predicted_value.clamp(0.0, 1.0))
            * (1.0 - item.popularity_score.clamp(0.0, 1.0))
            * (1.0 + recency_days)
            * tier_weight
            * randomizer_bonus
            * size_factor
    }
}

impl EvictionPolicy for MlPolicy {
    fn name(&self) -> &'static str {
        "ml"
    }

    fn priority(&self, item: &CacheItem, now: i64) -> f64 {
        -Self::pressure(item, now)
    }
}

/// LRU with a strong retention bonus for reused randomizers.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomizerAwarePolicy;

impl EvictionPolicy for RandomizerAwarePolicy {
    fn name(&self) -> &'static str {
        "randomizer-aware"
    }

    fn priority(&self, item: &CacheItem, now: i64) -> f64 {
        let base = -((now - item.last_accessed).max(0) as f64);
        if item.is_randomizer {
            // Each reuse buys an hour of retention over plain LRU.
            base + 3_600.0 * (1 + item.randomizer_uses) as f64
        } else {
            base
        }
    }
}

/// Fixed-weight combination of the other policies.
pub struct HybridPolicy {
    parts: Vec<(Box<dyn EvictionPolicy>, f64)>,
}

impl Default for HybridPolicy {
    fn default() -> Self {
        Self {
            parts: vec![
                (Box::new(MlPolicy) as Box<dyn EvictionPolicy>, 0.6),
                (Box::new(LruPolicy), 0.25),
                (Box::new(RandomizerAwarePolicy), 0.15),
            ],
        }
    }
}

impl EvictionPolicy for HybridPolicy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn priority(&self, item: &CacheItem, now: i64) -> f64 {
        self.parts
            .iter()
            .map(|(p, w)| w * p.priority(item, now))
            .sum()
    }
}

/// Configurable policy selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Least-recently-used.
    Lru,
    /// Least-frequently-used.
    Lfu,
    /// Model-scored.
    Ml,
    /// Randomizer-retaining LRU.
    RandomizerAware,
    /// Weighted combination (default).
    #[default]
    Hybrid,
}

impl PolicyKind {
    /// Instantiate the policy.
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            PolicyKind::Lru => Box::new(LruPolicy),
            PolicyKind::Lfu => Box::new(LfuPolicy),
            PolicyKind::Ml => Box::new(MlPolicy),
            PolicyKind::RandomizerAware => Box::new(RandomizerAwarePolicy),
            PolicyKind::Hybrid => Box::<HybridPolicy>::default(),
        }
    }
}
