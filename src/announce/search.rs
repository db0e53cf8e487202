// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Query engine over the announcement store.
//!
//! Tag matching goes through the bloom filter and therefore accepts its
//! false-positive rate; category, size class, topic prefix and time range
//! are exact.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::announce::bloom::TagBloom;
use crate::announce::record::{Category, SizeClass};
use crate::announce::security::SecurityManager;
use crate::announce::store::{AnnouncementStore, StoredRecord};
use crate::announce::topics::{hash_topic, normalize_path, TopicHierarchy};

/// A search request.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Every tag must test positive in the record's bloom filter.
    pub require_tags: Vec<String>,
    /// Any positive test excludes the record.
    pub exclude_tags: Vec<String>,
    /// Accepted categories; empty accepts all.
    pub categories: BTreeSet<Category>,
    /// Accepted size classes; empty accepts all.
    pub size_classes: BTreeSet<SizeClass>,
    /// Topic path prefix; matches the node and its descendants.
    pub topic_prefix: Option<String>,
    /// Earliest accepted `timestamp`.
    pub since: Option<i64>,
    /// Latest accepted `timestamp`.
    pub until: Option<i64>,
    /// Result cap; 0 means the default of 50.
    pub max_results: usize,
}

/// One ranked result.
#[derive(Clone, Debug)]
pub struct SearchHit {
    /// The matching record.
    pub record: StoredRecord,
    /// Ranking score; higher is better.
    pub score: f64,
}

/// Search over the local store.
pub struct SearchEngine {
    store: Arc<AnnouncementStore>,
    topics: Arc<RwLock<TopicHierarchy>>,
    security: Arc<SecurityManager>,
}

impl SearchEngine {
    /// Engine over the given collaborators.
    pub fn new(
        store: Arc<AnnouncementStore>,
        topics: Arc<RwLock<TopicHierarchy>>,
        security: Arc<SecurityManager>,
    ) -> Self {
        Self {
            store,
            topics,
            security,
        }
    }

    /// Run a query; results are ranked, ties broken by descriptor CID.
    pub fn search(&self, query: &SearchQuery, now: i64) -> Vec<SearchHit> {
        let limit = if query.max_results == 0 {
            50
        } else {
            query.max_results
        };

        let topic_hashes: Option<BTreeSet<String>> = query.topic_prefix.as_deref().map(|p| {
            let normalized = match normalize_path(p) {
                Ok(n) => n,
                Err(_) => return BTreeSet::new(),
            };
            match self.topics.read() {
                Ok(t) => t
                    .self_and_descendants(&normalized)
                    .iter()
                    .map(|path| hash_topic(path))
                    .collect(),
                Err(_) => BTreeSet::from([hash_topic(&normalized)]),
            }
        });

        let mut hits: Vec<SearchHit> = Vec::new();
        for record in self.store.get_all() {
            let a = &record.announcement;
            if a.is_expired(now) {
                continue;
            }
            if let Some(hashes) = &topic_hashes {
                if !hashes.contains(&a.topic_hash) {
                    continue;
                }
            }
            if !query.categories.is_empty() && !query.categories.contains(&a.category) {
                continue;
            }
            if !query.size_classes.is_empty() && !query.size_classes.contains(&a.size_class) {
                continue;
            }
            if let Some(since) = query.since {
                if a.timestamp < since {
                    continue;
                }
            }
            if let Some(until) = query.until {
                if a.timestamp > until {
                    continue;
                }
            }

            let filter = a.tag_bloom.as_deref().and_then(|tb| TagBloom::decode(tb).ok());
            let mut tag_matches = 0usize;
            if !query.require_tags.is_empty() || !query.exclude_tags.is_empty() {
                let Some(filter) = &filter else {
                    // Tag-constrained queries cannot match records without a
                    // filter.
                    continue;
                };
                if !query.require_tags.iter().all(|t| filter.test(t)) {
                    continue;
                }
                tag_matches = query.require_tags.len();
                if query.exclude_tags.iter().any(|t| filter.test(t)) {
                    continue;
                }
            }

            let score = self.rank(&record, tag_matches, now);
            hits.push(SearchHit { record, score });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.record
                        .announcement
                        .descriptor
                        .cmp(&b.record.announcement.descriptor)
                })
        });
        hits.truncate(limit);
        hits
    }

    /// Weighted sum of tag matches, recency, and source reputation.
    fn rank(&self, record: &StoredRecord, tag_matches: usize, now: i64) -> f64 {
        let age_days =
            ((now - record.announcement.timestamp).max(0) as f64) / 86_400.0;
        let recency = 1.0 / (1.0 + age_days);
        let reputation = self.security.reputation_of(&record.source) as f64;
        let reputation = (reputation / 100.0).clamp(0.0, 1.0);
        2.0 * tag_matches as f64 + recency + 0.5 * reputation
    }
}
