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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container passed to every component at start-up.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Cache hits.
    pub cache_hits_total: IntCounter,
    /// Cache misses.
    pub cache_misses_total: IntCounter,
    /// Evicted cache items.
    pub cache_evictions_total: IntCounter,
    /// Cached items gauge.
    pub cache_items: IntGauge,
    /// Cached bytes gauge.
    pub cache_bytes: IntGauge,
    /// Randomizer reuse events.
    pub randomizer_reuse_total: IntCounter,

    /// Completed uploads.
    pub uploads_total: IntCounter,
    /// Completed downloads.
    pub downloads_total: IntCounter,
    /// Original (pre-anonymization) bytes uploaded.
    pub upload_original_bytes_total: IntCounter,
    /// Bytes actually stored for uploads (anon blocks + fresh randomizers).
    pub upload_stored_bytes_total: IntCounter,
    /// Bytes returned by downloads.
    pub download_bytes_total: IntCounter,

    /// Blocks written through the store adapter.
    pub blocks_stored_total: IntCounter,
    /// Transient fetch/store retries in the adapter.
    pub store_retries_total: IntCounter,

    /// Announcements published.
    pub announce_published_total: IntCounter,
    /// Announcements received from the network.
    pub announce_received_total: IntCounter,
    /// Announcements rejected by the security manager.
    pub announce_rejected_total: IntCounter,
    /// Expired announcements dropped at ingest or cleanup.
    pub announce_expired_total: IntCounter,
    /// Records currently held by the announcement store.
    pub announce_records: IntGauge,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let cache_hits_total = IntCounter::new("noisefs_cache_hits_total", "Cache hits")
            .map_err(|_| MetricsError::Prom)?;
        let cache_misses_total = IntCounter::new("noisefs_cache_misses_total", "Cache misses")
            .map_err(|_| MetricsError::Prom)?;
        let cache_evictions_total =
            IntCounter::new("noisefs_cache_evictions_total", "Evicted cache items")
                .map_err(|_| MetricsError::Prom)?;
        let cache_items =
            IntGauge::new("noisefs_cache_items", "Cached items").map_err(|_| MetricsError::Prom)?;
        let cache_bytes =
            IntGauge::new("noisefs_cache_bytes", "Cached bytes").map_err(|_| MetricsError::Prom)?;
        let randomizer_reuse_total =
            IntCounter::new("noisefs_randomizer_reuse_total", "Randomizer reuse events")
                .map_err(|_| MetricsError::Prom)?;

        let uploads_total = IntCounter::new("noisefs_uploads_total", "Completed uploads")
            .map_err(|_| MetricsError::Prom)?;
        let downloads_total = IntCounter::new("noisefs_downloads_total", "Completed downloads")
            .map_err(|_| MetricsError::Prom)?;
        let upload_original_bytes_total = IntCounter::new(
            "noisefs_upload_original_bytes_total",
            "Original bytes uploaded",
        )
        .map_err(|_| MetricsError::Prom)?;
        let upload_stored_bytes_total = IntCounter::new(
            "noisefs_upload_stored_bytes_total",
            "Bytes stored for uploads",
        )
        .map_err(|_| MetricsError::Prom)?;
        let download_bytes_total =
            IntCounter::new("noisefs_download_bytes_total", "Bytes downloaded")
                .map_err(|_| MetricsError::Prom)?;

        let blocks_stored_total =
            IntCounter::new("noisefs_blocks_stored_total", "Blocks written upstream")
                .map_err(|_| MetricsError::Prom)?;
        let store_retries_total =
            IntCounter::new("noisefs_store_retries_total", "Adapter retries")
                .map_err(|_| MetricsError::Prom)?;

        let announce_published_total = IntCounter::new(
            "noisefs_announce_published_total",
            "Announcements published",
        )
        .map_err(|_| MetricsError::Prom)?;
        let announce_received_total =
            IntCounter::new("noisefs_announce_received_total", "Announcements received")
                .map_err(|_| MetricsError::Prom)?;
        let announce_rejected_total =
            IntCounter::new("noisefs_announce_rejected_total", "Announcements rejected")
                .map_err(|_| MetricsError::Prom)?;
        let announce_expired_total = IntCounter::new(
            "noisefs_announce_expired_total",
            "Expired announcements dropped",
        )
        .map_err(|_| MetricsError::Prom)?;
        let announce_records = IntGauge::new("noisefs_announce_records", "Stored announcements")
            .map_err(|_| MetricsError::Prom)?;

        for c in [
            &cache_hits_total,
            &cache_misses_total,
            &cache_evictions_total,
            &randomizer_reuse_total,
            &uploads_total,
            &downloads_total,
            &upload_original_bytes_total,
            &upload_stored_bytes_total,
            &download_bytes_total,
            &blocks_stored_total,
            &store_retries_total,
            &announce_published_total,
            &announce_received_total,
            &announce_rejected_total,
            &announce_expired_total,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }
        for g in [&cache_items, &cache_bytes, &announce_records] {
            registry
                .register(Box::new(g.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }

        Ok(Self {
            registry,
            cache_hits_total,
            cache_misses_total,
            cache_evictions_total,
            cache_items,
            cache_bytes,
            randomizer_reuse_total,
            uploads_total,
            downloads_total,
            upload_original_bytes_total,
            upload_stored_bytes_total,
            download_bytes_total,
            blocks_stored_total,
            store_retries_total,
            announce_published_total,
            announce_received_total,
            announce_rejected_total,
            announce_expired_total,
            announce_records,
        })
    }
}
