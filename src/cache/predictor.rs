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

//! Access prediction for cache scoring and preloading.
//!
//! Per-CID access history feeds a linear model over a small feature vector
//! (rate, recency, time-of-day, day-of-week, trend). The output approximates
//! the probability of another access within the next prediction window and
//! stays in `[0, 1]`.

use std::collections::{BTreeMap, VecDeque};

/// Bound on per-CID history; older samples roll off.
const MAX_HISTORY: usize = 64;

const SECS_PER_HOUR: i64 = 3_600;
const SECS_PER_DAY: i64 = 86_400;

/// Recorded access history for one CID.
#[derive(Clone, Debug, Default)]
pub struct AccessPattern {
    access_times: VecDeque<i64>,
    intervals: VecDeque<i64>,
    daily: [u32; 24],
    weekly: [u32; 7],
}

fn hour_of_day(now: i64) -> usize {
    ((now.rem_euclid(SECS_PER_DAY)) / SECS_PER_HOUR) as usize % 24
}

fn day_of_week(now: i64) -> usize {
    // Unix epoch fell on a Thursday.
    ((now.div_euclid(SECS_PER_DAY) + 4).rem_euclid(7)) as usize
}

impl AccessPattern {
    /// Record one access at `now` (unix seconds).
    pub fn record(&mut self, now: i64) {
        if let Some(&last) = self.access_times.back() {
            self.intervals.push_back((now - last).max(0));
            if self.intervals.len() > MAX_HISTORY {
                self.intervals.pop_front();
            }
        }
        self.access_times.push_back(now);
        if self.access_times.len() > MAX_HISTORY {
            self.access_times.pop_front();
        }
        self.daily[hour_of_day(now)] = self.daily[hour_of_day(now)].saturating_add(1);
        self.weekly[day_of_week(now)] = self.weekly[day_of_week(now)].saturating_add(1);
    }

    /// Most recent access time, if any.
    pub fn last_access(&self) -> Option<i64> {
        self.access_times.back().copied()
    }

    /// Accesses per hour over the retained window.
    pub fn access_rate_per_hour(&self, now: i64) -> f64 {
        let Some(&first) = self.access_times.front() else {
            return 0.0;
        };
        let span = (now - first).max(SECS_PER_HOUR) as f64;
        self.access_times.len() as f64 * SECS_PER_HOUR as f64 / span
    }

    /// Hours since the last access.
    pub fn recency_hours(&self, now: i64) -> f64 {
        match self.last_access() {
            Some(last) => (now - last).max(0) as f64 / SECS_PER_HOUR as f64,
            None => f64::INFINITY,
        }
    }

    /// Share of historical accesses falling in the current hour bucket.
    pub fn hour_weight(&self, now: i64) -> f64 {
        let total: u32 = self.daily.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.daily[hour_of_day(now)] as f64 / total as f64
    }

    /// Share of historical accesses falling on the current weekday.
    pub fn day_weight(&self, now: i64) -> f64 {
        let total: u32 = self.weekly.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.weekly[day_of_week(now)] as f64 / total as f64
    }

    /// Interval trend in `[0, 1]`: above 0.5 means accesses are speeding up.
    pub fn trend(&self) -> f64 {
        if self.intervals.len() < 4 {
            return 0.5;
        }
        let half = self.intervals.len() / 2;
        let older: f64 = self.intervals.iter().take(half).map(|&i| i as f64).sum::<f64>() / half as f64;
        let newer: f64 = self.intervals.iter().skip(half).map(|&i| i as f64).sum::<f64>()
            / (self.intervals.len() - half) as f64;
        if older <= 0.0 {
            return 0.5;
        }
        // Shorter recent intervals -> ratio < 1 -> trend above 0.5.
        (older / (older + newer)).clamp(0.0, 1.0)
    }
}

/// Fixed coefficients of the linear access model.
#[derive(Clone, Copy, Debug)]
pub struct PredictorWeights {
    /// Bias term.
    pub bias: f64,
    /// Normalized access rate.
    pub rate: f64,
    /// Recency decay.
    pub recency: f64,
    /// Hour-of-day bucket share.
    pub daily: f64,
    /// Day-of-week bucket share.
    pub weekly: f64,
    /// Interval trend.
    pub trend: f64,
}

impl Default for PredictorWeights {
    fn default() -> Self {
        Self {
            bias: 0.05,
            rate: 0.45,
            recency: 0.30,
            daily: 0.10,
            weekly: 0.05,
            trend: 0.05,
        }
    }
}

/// Linear predictor over [`AccessPattern`] features.
#[derive(Debug, Default)]
pub struct AccessPredictor {
    patterns: BTreeMap<String, AccessPattern>,
    weights: PredictorWeights,
}

impl AccessPredictor {
    /// Predictor with default weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access for a CID.
    pub fn record_access(&mut self, cid: &str, now: i64) {
        self.patterns.entry(cid.to_string()).or_default().record(now);
    }

    /// Pattern lookup.
    pub fn pattern(&self, cid: &str) -> Option<&AccessPattern> {
        self.patterns.get(cid)
    }

    /// Number of tracked CIDs.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no CIDs are tracked.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Predicted probability of access in the next window, in `[0, 1]`.
    pub fn predict(&self, cid: &str, now: i64) -> f64 {
        let Some(p) = self.patterns.get(cid) else {
            return 0.0;
        };
        let w = &self.weights;
        let rate = (p.access_rate_per_hour(now).min(10.0)) / 10.0;
        let recency = match p.recency_hours(now) {
            h if h.is_finite() => 1.0 / (1.0 + h),
            _ => 0.0,
        };
        let score = w.bias
            + w.rate * rate
            + w.recency * recency
            + w.daily * p.hour_weight(now)
            + w.weekly * p.day_weight(now)
            + w.trend * p.trend();
        score.clamp(0.0, 1.0)
    }

    /// Drop patterns idle for at least `max_idle_secs`. Returns dropped count.
    pub fn prune_idle(&mut self, now: i64, max_idle_secs: i64) -> usize {
        let before = self.patterns.len();
        self.patterns.retain(|_, p| match p.last_access() {
            Some(last) => now - last < max_idle_secs,
            None => false,
        });
        before - self.patterns.len()
    }

    /// Highest-scoring CIDs, excluding any in `skip`.
    pub fn top_predicted(
        &self,
        n: usize,
        now: i64,
        skip: &dyn Fn(&str) -> bool,
    ) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .patterns
            .keys()
            .filter(|cid| !skip(cid))
            .map(|cid| (cid.clone(), self.predict(cid, now)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n);
        scored
    }
}
