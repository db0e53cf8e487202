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

//! Announcement publishing.
//!
//! Every publish goes out twice: once on the pub/sub topic for live
//! listeners, once as a DHT record for pollers. A background refresher
//! re-puts DHT records so they outlive the store's own record expiry, until
//! the announcement's TTL runs out.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::announce::record::{Announcement, RecordError};
use crate::announce::topics::{dht_key, pubsub_topic_name};
use crate::cabs::{Cabs, CabsError};
use crate::monitoring::metrics::Metrics;
use crate::tasks::{now_unix, TaskGroup};

/// Publisher configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Minimum spacing between publishes on one topic, seconds.
    pub per_topic_min_interval_secs: u64,
    /// Global publishes per minute across all topics.
    pub global_per_min: u32,
    /// DHT refresh interval, seconds (60 s floor applies).
    pub dht_refresh_interval_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            per_topic_min_interval_secs: 30,
            global_per_min: 120,
            dht_refresh_interval_secs: 300,
        }
    }
}

/// Publish errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Record failed validation or the wire cap.
    #[error("record")]
    Record(#[from] RecordError),
    /// Per-topic or global rate budget exhausted.
    #[error("rate limited")]
    RateLimited,
    /// Backend publish failed.
    #[error("cabs")]
    Cabs(#[from] CabsError),
    /// Poisoned internal lock.
    #[error("lock poisoned")]
    Lock,
}

struct ActiveTopic {
    last_wire: Vec<u8>,
    expires_at: i64,
    errors: u64,
}

struct PublisherState {
    last_by_topic: BTreeMap<String, Instant>,
    window_start: Instant,
    window_count: u32,
    active: BTreeMap<String, ActiveTopic>,
}

/// The announcement publisher.
pub struct AnnouncePublisher {
    cabs: Arc<dyn Cabs>,
    cfg: PublisherConfig,
    state: Mutex<PublisherState>,
    metrics: Arc<Metrics>,
}

impl AnnouncePublisher {
    /// Publisher over a CABS backend.
    pub fn new(cabs: Arc<dyn Cabs>, cfg: PublisherConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            cabs,
            cfg,
            state: Mutex::new(PublisherState {
                last_by_topic: BTreeMap::new(),
                window_start: Instant::now(),
                window_count: 0,
                active: BTreeMap::new(),
            }),
            metrics,
        }
    }

    /// Validate, serialize, rate-limit, and emit to pub/sub and DHT.
    pub async fn publish(&self, announcement: &Announcement) -> Result<(), PublishError> {
        announcement.validate()?;
        let wire = announcement.to_json()?;
        let topic_hash = announcement.topic_hash.clone();

        self.reserve_budget(&topic_hash)?;

        let topic_name = pubsub_topic_name(&topic_hash);
        self.cabs.publish(&topic_name, wire.clone()).await?;
        self.cabs.dht_put(&dht_key(&topic_hash), wire.clone()).await?;

        let expires_at = announcement
            .timestamp
            .saturating_add_unsigned(announcement.ttl);
        {
            let mut state = self.state.lock().map_err(|_| PublishError::Lock)?;
            state.active.insert(
                topic_hash.clone(),
                ActiveTopic {
                    last_wire: wire,
                    expires_at,
                    errors: 0,
                },
            );
        }

        self.metrics.announce_published_total.inc();
        info!(topic = %topic_name, descriptor = %announcement.descriptor, "announcement published");
        Ok(())
    }

    /// Topic hashes with a live DHT record.
    pub fn active_topics(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.active.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Start the DHT refresher loop.
    pub fn start(self: &Arc<Self>) -> TaskGroup {
        let mut group = TaskGroup::new();
        let publisher = Arc::clone(self);
        let mut sh = group.shutdown_rx();
        let every = Duration::from_secs(self.cfg.dht_refresh_interval_secs.max(60));
        group.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = sh.changed() => break,
                    _ = tick.tick() => publisher.refresh_dht().await,
                }
            }
        }));
        group
    }

    async fn refresh_dht(&self) {
        let now = now_unix();
        let snapshot: Vec<(String, Vec<u8>)> = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.active.retain(|_, t| t.expires_at > now);
            state
                .active
                .iter()
                .map(|(hash, t)| (hash.clone(), t.last_wire.clone()))
                .collect()
        };
        for (hash, wire) in snapshot {
            if let Err(e) = self.cabs.dht_put(&dht_key(&hash), wire).await {
                warn!(topic_hash = %hash, ?e, "dht refresh failed");
                if let Ok(mut state) = self.state.lock() {
                    if let Some(t) = state.active.get_mut(&hash) {
                        t.errors += 1;
                    }
                }
            }
        }
    }

    fn reserve_budget(&self, topic_hash: &str) -> Result<(), PublishError> {
        let now = Instant::now();
        let mut state = self.state.lock().map_err(|_| PublishError::Lock)?;

        if now
            .checked_duration_since(state.window_start)
            .unwrap_or(Duration::ZERO)
            >= Duration::from_secs(60)
        {
            state.window_start = now;
            state.window_count = 0;
        }
        if state.window_count >= self.cfg.global_per_min {
            return Err(PublishError::RateLimited);
        }

        let spacing = Duration::from_secs(self.cfg.per_topic_min_interval_secs);
        if let Some(last) = state.last_by_topic.get(topic_hash) {
            if now.checked_duration_since(*last).unwrap_or(Duration::ZERO) < spacing {
                return Err(PublishError::RateLimited);
            }
        }

        state.window_count += 1;
        state.last_by_topic.insert(topic_hash.to_string(), now);
        Ok(())
    }
}
