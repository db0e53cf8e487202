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

//! Admission control for incoming announcements.
//!
//! Policies apply in order: structural validation, signature policy,
//! per-source rate limit, spam scoring, reputation. Rejections are silent on
//! the wire and visible in metrics.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::announce::bloom::TagBloom;
use crate::announce::record::{Announcement, RecordError};
use crate::announce::signing::{verify_announcement, SignError};
use crate::monitoring::metrics::Metrics;

/// Security configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Records per source per minute.
    pub rate_limit_per_min: u32,
    /// Spam score at or above which a record is rejected.
    pub spam_threshold: u32,
    /// Reject unsigned records.
    pub require_signature: bool,
    /// Reject records from sources scoring below `trust_floor`.
    pub require_trusted: bool,
    /// Reputation floor for trust-required mode.
    pub trust_floor: i32,
    /// TTLs above this are treated as abuse signals.
    pub max_reasonable_ttl_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_min: 100,
            spam_threshold: 70,
            require_signature: false,
            require_trusted: false,
            trust_floor: 0,
            max_reasonable_ttl_secs: 30 * 86_400,
        }
    }
}

/// Why a record was refused.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Structural validation failed.
    #[error("invalid record")]
    Invalid(#[from] RecordError),
    /// Signature missing or failed verification.
    #[error("signature rejected")]
    Signature(#[from] SignError),
    /// Source exceeded its rate budget.
    #[error("rate limited")]
    RateLimited,
    /// Spam score at or above threshold.
    #[error("spam score {0}")]
    Spam(u32),
    /// Source reputation below the trust floor.
    #[error("untrusted source")]
    Untrusted,
    /// Poisoned internal lock.
    #[error("lock poisoned")]
    Lock,
}

/// Reputation tuning, deterministic and integer-only.
#[derive(Clone, Debug)]
pub struct ReputationParams {
    /// Score gain per accepted record.
    pub good_inc: i32,
    /// Score loss per rejection.
    pub bad_inc: i32,
    /// Per-minute decay toward zero.
    pub decay_per_min: i32,
}

impl Default for ReputationParams {
    fn default() -> Self {
        Self {
            good_inc: 1,
            bad_inc: 5,
            decay_per_min: 1,
        }
    }
}

#[derive(Clone, Debug)]
struct SourceState {
    score: i32,
    last: Instant,
}

/// Per-source reputation ledger.
#[derive(Debug, Default)]
pub struct ReputationLedger {
    params: ReputationParams,
    sources: BTreeMap<String, SourceState>,
}

impl ReputationLedger {
    /// Ledger with the given tuning.
    pub fn new(params: ReputationParams) -> Self {
        Self {
            params,
            sources: BTreeMap::new(),
        }
    }

    /// Current score; unknown sources are 0.
    pub fn score_of(&self, source: &str) -> i32 {
        self.sources.get(source).map(|s| s.score).unwrap_or(0)
    }

    /// Record an accepted record from a source.
    pub fn observe_good(&mut self, source: &str, now: Instant) {
        let params = self.params.clone();
        let st = self.sources.entry(source.to_string()).or_insert(SourceState {
            score: 0,
            last: now,
        });
        Self::decay(&params, st, now);
        st.score = st.score.saturating_add(params.good_inc).clamp(-1000, 1000);
    }

    /// Record a rejection from a source, weighted by severity.
    pub fn observe_bad(&mut self, source: &str, now: Instant, weight: i32) {
        let params = self.params.clone();
        let st = self.sources.entry(source.to_string()).or_insert(SourceState {
            score: 0,
            last: now,
        });
        Self::decay(&params, st, now);
        st.score = st
            .score
            .saturating_sub(params.bad_inc.saturating_mul(weight.max(1)))
            .clamp(-1000, 1000);
    }

    fn decay(params: &ReputationParams, st: &mut SourceState, now: Instant) {
        let dt = now.checked_duration_since(st.last).unwrap_or(Duration::ZERO);
        let mins = (dt.as_secs() / 60) as i32;
        if mins <= 0 {
            return;
        }
        let d = params.decay_per_min.saturating_mul(mins);
        if st.score > 0 {
            st.score = (st.score - d).max(0);
        } else if st.score < 0 {
            st.score = (st.score + d).min(0);
        }
        st.last = now;
    }
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

#[derive(Debug)]
struct RepeatState {
    window_start: Instant,
    count: u32,
}

const REPEAT_WINDOW: Duration = Duration::from_secs(600);

/// The security manager.
pub struct SecurityManager {
    cfg: SecurityConfig,
    windows: Mutex<BTreeMap<String, RateWindow>>,
    repeats: Mutex<BTreeMap<String, RepeatState>>,
    reputation: Mutex<ReputationLedger>,
    metrics: Arc<Metrics>,
}

impl SecurityManager {
    /// Manager with default reputation tuning.
    pub fn new(cfg: SecurityConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            cfg,
            windows: Mutex::new(BTreeMap::new()),
            repeats: Mutex::new(BTreeMap::new()),
            reputation: Mutex::new(ReputationLedger::new(ReputationParams::default())),
            metrics,
        }
    }

    /// Apply every policy in order. `Ok` admits the record.
    pub fn admit(&self, a: &Announcement, source: &str) -> Result<(), SecurityError> {
        let now = Instant::now();
        let outcome = self.admit_inner(a, source, now);
        match &outcome {
            Ok(()) => {
                if let Ok(mut rep) = self.reputation.lock() {
                    rep.observe_good(source, now);
                }
            }
            Err(e) => {
                self.metrics.announce_rejected_total.inc();
                debug!(source = %source, reason = %e, "announcement rejected");
                let weight = match e {
                    SecurityError::Signature(_) => 3,
                    SecurityError::Spam(_) => 2,
                    _ => 1,
                };
                if let Ok(mut rep) = self.reputation.lock() {
                    rep.observe_bad(source, now, weight);
                }
            }
        }
        outcome
    }

    fn admit_inner(
        &self,
        a: &Announcement,
        source: &str,
        now: Instant,
    ) -> Result<(), SecurityError> {
        a.validate()?;
        verify_announcement(a, self.cfg.require_signature)?;

        if !self.allow_rate(source, now)? {
            return Err(SecurityError::RateLimited);
        }

        let score = self.spam_score(a, now)?;
        if score >= self.cfg.spam_threshold {
            return Err(SecurityError::Spam(score));
        }

        if self.cfg.require_trusted {
            let rep = self
                .reputation
                .lock()
                .map_err(|_| SecurityError::Lock)?
                .score_of(source);
            if rep < self.cfg.trust_floor {
                return Err(SecurityError::Untrusted);
            }
        }
        Ok(())
    }

    /// Current reputation score of a source.
    pub fn reputation_of(&self, source: &str) -> i32 {
        self.reputation
            .lock()
            .map(|r| r.score_of(source))
            .unwrap_or(0)
    }

    fn allow_rate(&self, source: &str, now: Instant) -> Result<bool, SecurityError> {
        let mut windows = self.windows.lock().map_err(|_| SecurityError::Lock)?;
        let w = windows.entry(source.to_string()).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });
        if now.checked_duration_since(w.window_start).unwrap_or(Duration::ZERO)
            >= Duration::from_secs(60)
        {
            w.window_start = now;
            w.count = 0;
        }
        if w.count >= self.cfg.rate_limit_per_min {
            return Ok(false);
        }
        w.count = w.count.saturating_add(1);
        Ok(true)
    }

    /// Heuristic spam score in `[0, 100+]`.
    fn spam_score(&self, a: &Announcement, now: Instant) -> Result<u32, SecurityError> {
        let mut score = 0u32;

        match &a.tag_bloom {
            Some(encoded) => match TagBloom::decode(encoded) {
                Ok(filter) => {
                    let d = filter.density();
                    if d > 0.8 {
                        score += 50;
                    } else if d > 0.5 {
                        score += 30;
                    }
                }
                // A filter that will not decode cannot be matched, only
                // carried; treat as noise.
                Err(_) => score += 40,
            },
            None => {}
        }

        if a.ttl > self.cfg.max_reasonable_ttl_secs {
            score += 30;
        } else if a.ttl > 7 * 86_400 {
            score += 15;
        } else if a.ttl < 60 {
            score += 10;
        }

        {
            let mut repeats = self.repeats.lock().map_err(|_| SecurityError::Lock)?;
            let r = repeats.entry(a.descriptor.clone()).or_insert(RepeatState {
                window_start: now,
                count: 0,
            });
            if now.checked_duration_since(r.window_start).unwrap_or(Duration::ZERO)
                >= REPEAT_WINDOW
            {
                r.window_start = now;
                r.count = 0;
            }
            r.count = r.count.saturating_add(1);
            if r.count > 3 {
                score += 40;
            } else if r.count > 1 {
                score += 15;
            }
        }

        Ok(score)
    }
}
