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

//! Typed wrapper over the raw CABS interface.
//!
//! Adds what the raw store does not give us: cache-first reads with
//! write-through, SHA-256 verification of fetched blocks, bounded
//! exponential backoff on transient failures, per-fetch timeouts, and
//! peer-hinted retrieval.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cabs::{Cabs, CabsError, Cid};
use crate::cache::{AdaptiveCache, BlockMeta};
use crate::core::block::{block_id, Block};
use crate::monitoring::metrics::Metrics;

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Content absent upstream and not cached.
    #[error("not found")]
    NotFound,
    /// Retrieved bytes do not hash to the requested CID.
    #[error("integrity failure")]
    Integrity,
    /// Transient failures exhausted the retry budget.
    #[error("network")]
    Network,
    /// Permanent backend failure.
    #[error("backend")]
    Backend,
}

impl From<CabsError> for AdapterError {
    fn from(e: CabsError) -> Self {
        match e {
            CabsError::NotFound => AdapterError::NotFound,
            CabsError::Transient => AdapterError::Network,
            CabsError::Unsupported | CabsError::Backend => AdapterError::Backend,
        }
    }
}

/// Adapter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Attempts per operation (first try included).
    pub max_attempts: u32,
    /// First backoff step in milliseconds; doubles per retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on a single fetch.
    pub get_timeout_secs: u64,
    /// Verify fetched bytes hash to the CID (requires a content-addressed
    /// backend using hex SHA-256 ids).
    pub verify_block_hashes: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            get_timeout_secs: 30,
            verify_block_hashes: true,
        }
    }
}

/// Cache-aware, retrying block store client.
pub struct BlockStoreAdapter {
    cabs: Arc<dyn Cabs>,
    cache: Arc<AdaptiveCache>,
    cfg: AdapterConfig,
    metrics: Arc<Metrics>,
}

impl BlockStoreAdapter {
    /// Wrap a CABS backend.
    pub fn new(
        cabs: Arc<dyn Cabs>,
        cache: Arc<AdaptiveCache>,
        cfg: AdapterConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cabs,
            cache,
            cfg,
            metrics,
        }
    }

    /// Store a block as plain user data.
    pub async fn put_block(&self, block: &Block) -> Result<Cid, AdapterError> {
        self.put_block_with_meta(block, &BlockMeta::user_data()).await
    }

    /// Store a block, caching it under the given role.
    pub async fn put_block_with_meta(
        &self,
        block: &Block,
        meta: &BlockMeta,
    ) -> Result<Cid, AdapterError> {
        let mut attempt = 0u32;
        let cid = loop {
            attempt += 1;
            match self.cabs.put(block.data().to_vec()).await {
                Ok(cid) => break cid,
                Err(CabsError::Transient) if attempt < self.cfg.max_attempts => {
                    self.metrics.store_retries_total.inc();
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        };
        self.metrics.blocks_stored_total.inc();
        // Write-through: a get after this put must see the data.
        if let Err(e) = self
            .cache
            .put(&cid, Arc::new(block.clone()), meta)
        {
            warn!(cid = %cid, ?e, "write-through cache insert failed");
        }
        Ok(cid)
    }

    /// Retrieve a block, cache first.
    pub async fn get_block(&self, cid: &str) -> Result<Arc<Block>, AdapterError> {
        if let Some((block, _tier)) = self.cache.get(cid) {
            return Ok(block);
        }
        let data = self.fetch_with_retries(cid, None).await?;
        self.admit(cid, data, &BlockMeta::user_data())
    }

    /// Retrieve a block, trying each hinted peer before generic routing.
    pub async fn get_block_with_peer_hint(
        &self,
        cid: &str,
        peers: &[String],
    ) -> Result<Arc<Block>, AdapterError> {
        if let Some((block, _tier)) = self.cache.get(cid) {
            return Ok(block);
        }
        for peer in peers {
            match self.fetch_with_retries(cid, Some(peer)).await {
                Ok(data) => {
                    let meta = BlockMeta {
                        source_peer: Some(peer.clone()),
                        ..BlockMeta::user_data()
                    };
                    return self.admit(cid, data, &meta);
                }
                Err(e) => {
                    debug!(cid = %cid, peer = %peer, ?e, "peer-hinted fetch failed");
                }
            }
        }
        let data = self.fetch_with_retries(cid, None).await?;
        self.admit(cid, data, &BlockMeta::user_data())
    }

    /// Raw byte retrieval for content not shaped like a NoiseFS block.
    pub async fn cat(&self, cid: &str) -> Result<Vec<u8>, AdapterError> {
        if let Some((block, _tier)) = self.cache.get(cid) {
            return Ok(block.data().to_vec());
        }
        let data = self.fetch_with_retries(cid, None).await?;
        if !data.is_empty() {
            let _ = self.admit(cid, data.clone(), &BlockMeta::user_data());
        }
        Ok(data)
    }

    async fn fetch_with_retries(
        &self,
        cid: &str,
        peer: Option<&str>,
    ) -> Result<Vec<u8>, AdapterError> {
        let timeout = Duration::from_secs(self.cfg.get_timeout_secs.max(1));
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let fetch = async {
                match peer {
                    Some(p) => self.cabs.get_from_peer(cid, p).await,
                    None => self.cabs.get(cid).await,
                }
            };
            let res = match tokio::time::timeout(timeout, fetch).await {
                Ok(r) => r,
                Err(_) => Err(CabsError::Transient),
            };
            match res {
                Ok(data) => return Ok(data),
                Err(CabsError::Transient) if attempt < self.cfg.max_attempts => {
                    self.metrics.store_retries_total.inc();
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn admit(
        &self,
        cid: &str,
        data: Vec<u8>,
        meta: &BlockMeta,
    ) -> Result<Arc<Block>, AdapterError> {
        if self.cfg.verify_block_hashes && block_id(&data) != cid {
            return Err(AdapterError::Integrity);
        }
        let block = Arc::new(Block::new(data).map_err(|_| AdapterError::Integrity)?);
        if let Err(e) = self.cache.put(cid, block.clone(), meta) {
            warn!(cid = %cid, ?e, "cache insert after fetch failed");
        }
        Ok(block)
    }

    async fn backoff(&self, attempt: u32) {
        let shift = attempt.saturating_sub(1).min(8);
        let ms = self.cfg.initial_backoff_ms.saturating_mul(1u64 << shift);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
