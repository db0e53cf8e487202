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

//! Topic hierarchy and topic hashing.
//!
//! Topics are slash-separated paths of lowercase-hyphenated segments. Only
//! their SHA-256 hashes ever reach the network; the readable tree stays
//! local. Subscribing to a node covers all of its descendants.

use std::collections::{BTreeMap, BTreeSet};

use ring::digest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Topic errors.
#[derive(Debug, Error)]
pub enum TopicError {
    /// Empty path or empty segment.
    #[error("empty topic path")]
    Empty,
    /// Segment contains characters outside `[a-z0-9-]` after normalization.
    #[error("invalid topic segment")]
    BadSegment,
    /// Seed JSON unreadable.
    #[error("seed decode")]
    Seed,
}

/// Normalize a path: trim, lowercase, whitespace and underscores to hyphens.
pub fn normalize_path(path: &str) -> Result<String, TopicError> {
    let mut segments = Vec::new();
    for raw in path.trim().trim_matches('/').split('/') {
        let seg: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() || c == '_' { '-' } else { c })
            .collect();
        if seg.is_empty() {
            return Err(TopicError::Empty);
        }
        if !seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(TopicError::BadSegment);
        }
        segments.push(seg);
    }
    if segments.is_empty() {
        return Err(TopicError::Empty);
    }
    Ok(segments.join("/"))
}

/// Hex SHA-256 of a topic path. Callers should normalize first.
pub fn hash_topic(path: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, path.as_bytes()).as_ref())
}

/// Pub/sub topic name: `noisefs-topic-` + first 16 hex chars of the hash.
pub fn pubsub_topic_name(topic_hash: &str) -> String {
    let prefix: String = topic_hash.chars().take(16).collect();
    format!("noisefs-topic-{prefix}")
}

/// DHT key an announcement is refreshed under.
pub fn dht_key(topic_hash: &str) -> String {
    format!("/noisefs/announce/{topic_hash}")
}

/// One node in the topic tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicNode {
    /// Full normalized path.
    pub path: String,
    /// Free-form node metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Child segment names.
    #[serde(default)]
    pub children: BTreeSet<String>,
}

#[derive(Deserialize)]
struct SeedFile {
    topics: Vec<SeedTopic>,
}

#[derive(Deserialize)]
struct SeedTopic {
    path: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// Path-keyed topic tree.
#[derive(Clone, Debug, Default)]
pub struct TopicHierarchy {
    nodes: BTreeMap<String, TopicNode>,
}

impl TopicHierarchy {
    /// Empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy seeded from JSON: `{"topics":[{"path":..,"metadata":{..}}]}`.
    pub fn from_seed_json(bytes: &[u8]) -> Result<Self, TopicError> {
        let seed: SeedFile = serde_json::from_slice(bytes).map_err(|_| TopicError::Seed)?;
        let mut h = Self::new();
        for t in seed.topics {
            h.add_topic(&t.path, t.metadata)?;
        }
        Ok(h)
    }

    /// Insert a topic, creating all missing ancestors. Returns the
    /// normalized path.
    pub fn add_topic(
        &mut self,
        path: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, TopicError> {
        let normalized = normalize_path(path)?;
        let segments: Vec<&str> = normalized.split('/').collect();

        let mut so_far = String::new();
        for (i, seg) in segments.iter().enumerate() {
            let parent = so_far.clone();
            if !so_far.is_empty() {
                so_far.push('/');
            }
            so_far.push_str(seg);

            self.nodes.entry(so_far.clone()).or_insert_with(|| TopicNode {
                path: so_far.clone(),
                metadata: BTreeMap::new(),
                children: BTreeSet::new(),
            });
            if !parent.is_empty() {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.insert(seg.to_string());
                }
            }
            if i == segments.len() - 1 {
                if let Some(node) = self.nodes.get_mut(&so_far) {
                    node.metadata.extend(metadata.clone());
                }
            }
        }
        Ok(normalized)
    }

    /// Node lookup by normalized path.
    pub fn get(&self, path: &str) -> Option<&TopicNode> {
        self.nodes.get(path)
    }

    /// Whether a normalized path is known.
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The path itself plus every known descendant, in order.
    ///
    /// Unknown paths still return themselves: a subscription may precede any
    /// announcement that grows the tree under it.
    pub fn self_and_descendants(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        let mut out = vec![path.to_string()];
        for key in self.nodes.keys() {
            if key.starts_with(&prefix) {
                out.push(key.clone());
            }
        }
        out
    }
}
