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

//! Boundary to the content-addressed block store (CABS).
//!
//! The network that actually holds blocks lives behind [`Cabs`]. NoiseFS
//! itself never implements that network; it only speaks this interface.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod adapter;
pub mod memory;

/// Opaque content identifier handed out by the backing store.
///
/// CIDs must be treated as opaque strings. Backends used by NoiseFS address
/// block content by its hex SHA-256, which is what lets the adapter verify
/// retrieved bytes end to end.
pub type Cid = String;

/// CABS errors.
#[derive(Debug, Error)]
pub enum CabsError {
    /// Content is not available upstream.
    #[error("not found")]
    NotFound,
    /// Timeout or upstream hiccup; safe to retry with backoff.
    #[error("transient backend failure")]
    Transient,
    /// The backend does not implement this operation.
    #[error("unsupported operation")]
    Unsupported,
    /// Permanent backend failure.
    #[error("backend")]
    Backend,
}

/// Content-addressed block store interface.
///
/// `put`/`get` move raw block bytes; `publish`/`subscribe` are the pub/sub
/// fabric announcements ride on; `dht_put`/`dht_get` are the keyed record
/// layer the publisher refreshes and subscribers poll.
#[async_trait]
pub trait Cabs: Send + Sync {
    /// Store bytes, returning their content id.
    async fn put(&self, data: Vec<u8>) -> Result<Cid, CabsError>;

    /// Retrieve bytes by content id.
    async fn get(&self, cid: &str) -> Result<Vec<u8>, CabsError>;

    /// Retrieve bytes by content id, preferring one specific peer.
    ///
    /// Backends without peer routing return [`CabsError::Unsupported`]; the
    /// adapter falls back to plain [`Cabs::get`].
    async fn get_from_peer(&self, _cid: &str, _peer_id: &str) -> Result<Vec<u8>, CabsError> {
        Err(CabsError::Unsupported)
    }

    /// Publish a message on a pub/sub topic.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), CabsError>;

    /// Subscribe to a pub/sub topic; messages arrive on the returned channel.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, CabsError>;

    /// Write a keyed DHT record (last writer wins).
    async fn dht_put(&self, key: &str, value: Vec<u8>) -> Result<(), CabsError>;

    /// Read a keyed DHT record.
    async fn dht_get(&self, key: &str) -> Result<Option<Vec<u8>>, CabsError>;
}
