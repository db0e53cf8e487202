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

//! Announcement subscriptions.
//!
//! Each subscription runs one pub/sub listener per covered topic hash (the
//! topic and its descendants) plus a DHT poll task. Incoming records walk
//! parse, expiry, topic match, security admission, store, handler - in that
//! order. Handlers run on their own tasks; a slow or failing handler never
//! stalls or cancels the subscription.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::announce::record::Announcement;
use crate::announce::security::SecurityManager;
use crate::announce::store::AnnouncementStore;
use crate::announce::topics::{
    dht_key, hash_topic, normalize_path, pubsub_topic_name, TopicError, TopicHierarchy,
};
use crate::cabs::Cabs;
use crate::monitoring::metrics::Metrics;
use crate::tasks::{now_unix, TaskGroup};

const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";

/// Handler invoked for each newly stored announcement.
pub trait AnnouncementHandler: Send + Sync {
    /// React to a record. Errors are logged and isolated.
    fn handle(&self, announcement: &Announcement) -> anyhow::Result<()>;
}

impl<F> AnnouncementHandler for F
where
    F: Fn(&Announcement) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, announcement: &Announcement) -> anyhow::Result<()> {
        self(announcement)
    }
}

/// Lifecycle of one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, tasks not yet running.
    Idle,
    /// Listener and poll tasks running.
    Active,
    /// Unsubscribe requested, tasks winding down.
    Stopping,
    /// Tasks stopped.
    Stopped,
}

impl SubscriptionState {
    /// Lowercase name for logs and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Idle => "idle",
            SubscriptionState::Active => "active",
            SubscriptionState::Stopping => "stopping",
            SubscriptionState::Stopped => "stopped",
        }
    }
}

/// Persisted subscription entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    /// Normalized topic path.
    pub topic: String,
    /// SHA-256 hex of the topic path.
    pub topic_hash: String,
    /// Whether the subscription was active at last persist.
    pub active: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionsFile {
    subscriptions: Vec<SubscriptionEntry>,
}

/// Subscriber configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// DHT poll interval, seconds (10 s floor applies).
    pub poll_interval_secs: u64,
    /// Backoff after a pub/sub failure, milliseconds (1 s floor applies).
    pub retry_backoff_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            retry_backoff_ms: 1_000,
        }
    }
}

/// Subscription errors.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Topic path invalid.
    #[error("topic")]
    Topic(#[from] TopicError),
    /// Topic already has an active subscription.
    #[error("already subscribed")]
    AlreadySubscribed,
    /// No active subscription for the topic.
    #[error("not subscribed")]
    NotSubscribed,
    /// Persistence failure.
    #[error("io")]
    Io,
    /// Poisoned internal lock.
    #[error("lock poisoned")]
    Lock,
}

/// Ingest context shared by one subscription's tasks.
struct IngestCtx {
    expected: BTreeSet<String>,
    store: Arc<AnnouncementStore>,
    security: Arc<SecurityManager>,
    metrics: Arc<Metrics>,
    handler: Arc<dyn AnnouncementHandler>,
}

impl IngestCtx {
    /// Full ingest ladder for one wire message.
    fn ingest(self: &Arc<Self>, bytes: &[u8], channel: &str) {
        let announcement = match Announcement::from_json(bytes) {
            Ok(a) => a,
            Err(e) => {
                debug!(channel, ?e, "dropping undecodable announcement");
                return;
            }
        };
        self.metrics.announce_received_total.inc();

        if announcement.is_expired(now_unix()) {
            self.metrics.announce_expired_total.inc();
            return;
        }
        if !self.expected.contains(&announcement.topic_hash) {
            debug!(channel, topic_hash = %announcement.topic_hash, "topic hash outside subscription");
            return;
        }

        let source = announcement
            .peer_id
            .clone()
            .unwrap_or_else(|| format!("anonymous-{channel}"));
        if self.security.admit(&announcement, &source).is_err() {
            // Silent to the network; counted by the security manager.
            return;
        }

        match self.store.add(announcement.clone(), &source) {
            Ok(true) => {
                let handler = self.handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(&announcement) {
                        warn!(?e, "announcement handler failed");
                    }
                });
            }
            Ok(false) => {}
            Err(e) => warn!(?e, "store add failed"),
        }
    }
}

struct ActiveSub {
    state: Arc<Mutex<SubscriptionState>>,
    group: TaskGroup,
}

/// The announcement subscriber.
pub struct AnnounceSubscriber {
    cabs: Arc<dyn Cabs>,
    store: Arc<AnnouncementStore>,
    security: Arc<SecurityManager>,
    topics: Arc<RwLock<TopicHierarchy>>,
    cfg: SubscriberConfig,
    metrics: Arc<Metrics>,
    data_dir: PathBuf,
    subs: Mutex<BTreeMap<String, ActiveSub>>,
    entries: Mutex<BTreeMap<String, SubscriptionEntry>>,
}

impl AnnounceSubscriber {
    /// Build a subscriber; previously persisted entries are loaded but not
    /// re-activated (handlers cannot be persisted - the caller resubscribes).
    pub fn new(
        cabs: Arc<dyn Cabs>,
        store: Arc<AnnouncementStore>,
        security: Arc<SecurityManager>,
        topics: Arc<RwLock<TopicHierarchy>>,
        cfg: SubscriberConfig,
        data_dir: PathBuf,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut entries = BTreeMap::new();
        let path = data_dir.join(SUBSCRIPTIONS_FILE);
        if let Ok(bytes) = fs::read(&path) {
            match serde_json::from_slice::<SubscriptionsFile>(&bytes) {
                Ok(file) => {
                    for e in file.subscriptions {
                        entries.insert(e.topic.clone(), e);
                    }
                }
                Err(e) => warn!(?e, "unreadable subscriptions file; starting fresh"),
            }
        }
        Self {
            cabs,
            store,
            security,
            topics,
            cfg,
            metrics,
            data_dir,
            subs: Mutex::new(BTreeMap::new()),
            entries: Mutex::new(entries),
        }
    }

    /// Persisted entries, for resubscription at start-up.
    pub fn persisted(&self) -> Vec<SubscriptionEntry> {
        self.entries
            .lock()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Current subscriptions with their lifecycle states.
    pub fn states(&self) -> Vec<(String, SubscriptionState)> {
        self.subs
            .lock()
            .map(|m| {
                m.iter()
                    .map(|(topic, sub)| {
                        let st = sub
                            .state
                            .lock()
                            .map(|s| *s)
                            .unwrap_or(SubscriptionState::Stopped);
                        (topic.clone(), st)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subscribe to a topic (and its descendants). Returns the topic hash.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn AnnouncementHandler>,
    ) -> Result<String, SubscribeError> {
        let normalized = normalize_path(topic)?;
        {
            let mut subs = self.subs.lock().map_err(|_| SubscribeError::Lock)?;
            if subs.contains_key(&normalized) {
                return Err(SubscribeError::AlreadySubscribed);
            }
            // Reserve the slot while tasks spin up.
            subs.insert(
                normalized.clone(),
                ActiveSub {
                    state: Arc::new(Mutex::new(SubscriptionState::Idle)),
                    group: TaskGroup::new(),
                },
            );
        }

        // Growth: subscribing introduces the path to the hierarchy.
        if let Ok(mut t) = self.topics.write() {
            let _ = t.add_topic(&normalized, BTreeMap::new());
        }
        let covered: Vec<String> = match self.topics.read() {
            Ok(t) => t.self_and_descendants(&normalized),
            Err(_) => vec![normalized.clone()],
        };
        let hashes: BTreeSet<String> = covered.iter().map(|p| hash_topic(p)).collect();
        let topic_hash = hash_topic(&normalized);

        let ctx = Arc::new(IngestCtx {
            expected: hashes.clone(),
            store: self.store.clone(),
            security: self.security.clone(),
            metrics: self.metrics.clone(),
            handler,
        });

        let mut group = TaskGroup::new();
        let backoff = Duration::from_millis(self.cfg.retry_backoff_ms.max(1_000));

        for hash in &hashes {
            let cabs = self.cabs.clone();
            let ctx = ctx.clone();
            let topic_name = pubsub_topic_name(hash);
            let mut sh = group.shutdown_rx();
            group.push(tokio::spawn(async move {
                loop {
                    let mut rx = match cabs.subscribe(&topic_name).await {
                        Ok(rx) => rx,
                        Err(e) => {
                            warn!(topic = %topic_name, ?e, "pubsub subscribe failed; backing off");
                            tokio::select! {
                                _ = sh.changed() => return,
                                _ = tokio::time::sleep(backoff) => continue,
                            }
                        }
                    };
                    loop {
                        tokio::select! {
                            _ = sh.changed() => return,
                            msg = rx.recv() => match msg {
                                Some(bytes) => ctx.ingest(&bytes, "pubsub"),
                                None => break,
                            }
                        }
                    }
                    // Stream ended; re-subscribe after the backoff.
                    tokio::select! {
                        _ = sh.changed() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }));
        }

        {
            let cabs = self.cabs.clone();
            let ctx = ctx.clone();
            let poll_hashes: Vec<String> = hashes.iter().cloned().collect();
            let every = Duration::from_secs(self.cfg.poll_interval_secs.max(10));
            let mut sh = group.shutdown_rx();
            group.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(every);
                tick.tick().await;
                loop {
                    tokio::select! {
                        _ = sh.changed() => return,
                        _ = tick.tick() => {
                            for hash in &poll_hashes {
                                match cabs.dht_get(&dht_key(hash)).await {
                                    Ok(Some(bytes)) => ctx.ingest(&bytes, "dht"),
                                    Ok(None) => {}
                                    Err(e) => debug!(topic_hash = %hash, ?e, "dht poll failed"),
                                }
                            }
                        }
                    }
                }
            }));
        }

        {
            let mut subs = self.subs.lock().map_err(|_| SubscribeError::Lock)?;
            if let Some(sub) = subs.get_mut(&normalized) {
                if let Ok(mut st) = sub.state.lock() {
                    *st = SubscriptionState::Active;
                }
                sub.group = group;
            }
        }
        self.remember(&normalized, &topic_hash, true)?;
        info!(topic = %normalized, covered = hashes.len(), "subscribed");
        Ok(topic_hash)
    }

    /// Unsubscribe from a topic, cancelling its tasks. Also deactivates a
    /// persisted-but-inactive entry (one-shot CLI processes hit this path).
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), SubscribeError> {
        let normalized = normalize_path(topic)?;
        let sub = {
            let mut subs = self.subs.lock().map_err(|_| SubscribeError::Lock)?;
            subs.remove(&normalized)
        };
        match sub {
            Some(sub) => {
                if let Ok(mut st) = sub.state.lock() {
                    *st = SubscriptionState::Stopping;
                }
                sub.group.shutdown().await;
                if let Ok(mut st) = sub.state.lock() {
                    *st = SubscriptionState::Stopped;
                }
            }
            None => {
                let known = self
                    .entries
                    .lock()
                    .map(|m| m.contains_key(&normalized))
                    .unwrap_or(false);
                if !known {
                    return Err(SubscribeError::NotSubscribed);
                }
            }
        }
        self.remember(&normalized, &hash_topic(&normalized), false)?;
        info!(topic = %normalized, "unsubscribed");
        Ok(())
    }

    /// Cancel every subscription (process shutdown).
    pub async fn shutdown(&self) {
        let drained: Vec<(String, ActiveSub)> = match self.subs.lock() {
            Ok(mut subs) => std::mem::take(&mut *subs).into_iter().collect(),
            Err(_) => return,
        };
        for (topic, sub) in drained {
            if let Ok(mut st) = sub.state.lock() {
                *st = SubscriptionState::Stopping;
            }
            sub.group.shutdown().await;
            debug!(topic = %topic, "subscription stopped");
        }
    }

    fn remember(&self, topic: &str, topic_hash: &str, active: bool) -> Result<(), SubscribeError> {
        {
            let mut entries = self.entries.lock().map_err(|_| SubscribeError::Lock)?;
            entries.insert(
                topic.to_string(),
                SubscriptionEntry {
                    topic: topic.to_string(),
                    topic_hash: topic_hash.to_string(),
                    active,
                },
            );
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), SubscribeError> {
        let file = SubscriptionsFile {
            subscriptions: self
                .entries
                .lock()
                .map_err(|_| SubscribeError::Lock)?
                .values()
                .cloned()
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|_| SubscribeError::Io)?;
        fs::create_dir_all(&self.data_dir).map_err(|_| SubscribeError::Io)?;
        let path = self.data_dir.join(SUBSCRIPTIONS_FILE);
        let tmp = self.data_dir.join(format!("{SUBSCRIPTIONS_FILE}.tmp"));
        fs::write(&tmp, &bytes).map_err(|_| SubscribeError::Io)?;
        fs::rename(&tmp, &path).map_err(|_| SubscribeError::Io)?;
        Ok(())
    }
}
