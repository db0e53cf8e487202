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

//! The anonymization pipeline: split, triple-XOR, describe; and the inverse.
//!
//! Upload turns a byte stream into stored blocks indistinguishable from
//! random data plus a descriptor whose CID is the download capability.
//! Download walks the descriptor's triples in order and re-XORs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::cabs::adapter::{AdapterError, BlockStoreAdapter};
use crate::cabs::Cid;
use crate::cache::{AdaptiveCache, BlockMeta};
use crate::core::block::{Block, BlockError};
use crate::core::descriptor::{Descriptor, DescriptorError};
use crate::core::randomizer::{RandomizerError, RandomizerSelector};
use crate::monitoring::metrics::Metrics;
use crate::tasks::{now_unix, CancelFlag};

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Empty input or unusable parameters.
    #[error("invalid input")]
    InvalidInput,
    /// Source stream read failed.
    #[error("read")]
    Read,
    /// A block needed for reconstruction could not be retrieved.
    #[error("file unavailable")]
    FileUnavailable,
    /// Operation cancelled; nothing was published.
    #[error("cancelled")]
    Cancelled,
    /// Block math failed (operand length mismatch).
    #[error("block")]
    Block(#[from] BlockError),
    /// Store write failed.
    #[error("store")]
    Store(#[from] AdapterError),
    /// Descriptor encode/decode/validation failed.
    #[error("descriptor")]
    Descriptor(#[from] DescriptorError),
    /// Randomizer selection failed.
    #[error("randomizer")]
    Randomizer(#[from] RandomizerError),
}

/// Pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Uniform split size in bytes.
    pub block_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: 128 * 1024,
        }
    }
}

/// Progress callback: `(stage, current, total)`; `total` is 0 when unknown.
pub type ProgressFn = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Upload/download engine.
pub struct Pipeline {
    adapter: Arc<BlockStoreAdapter>,
    selector: RandomizerSelector,
    cfg: PipelineConfig,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    /// Build a pipeline over the adapter and cache.
    pub fn new(
        adapter: Arc<BlockStoreAdapter>,
        cache: Arc<AdaptiveCache>,
        cfg: PipelineConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let selector = RandomizerSelector::new(cache, adapter.clone());
        Self {
            adapter,
            selector,
            cfg,
            metrics,
        }
    }

    /// Upload a byte slice. See [`Pipeline::upload`].
    pub async fn upload_bytes(
        &self,
        data: &[u8],
        filename: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> Result<Cid, PipelineError> {
        self.upload(std::io::Cursor::new(data.to_vec()), filename, progress, cancel)
            .await
    }

    /// Split a stream into anonymized triples and return the descriptor CID.
    ///
    /// A cancelled upload publishes no descriptor; already-stored anon and
    /// randomizer blocks stay upstream, indistinguishable from random.
    pub async fn upload<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        filename: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> Result<Cid, PipelineError> {
        let block_size = self.cfg.block_size as usize;
        if block_size == 0 {
            return Err(PipelineError::InvalidInput);
        }

        let mut descriptor = Descriptor::new(filename, self.cfg.block_size, now_unix());
        let mut stored_bytes: u64 = 0;
        let mut index: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let chunk = read_chunk(&mut reader, block_size).await?;
            if chunk.is_empty() {
                if index == 0 {
                    return Err(PipelineError::InvalidInput);
                }
                break;
            }
            let true_len = chunk.len() as u64;
            let data_block = Block::new_padded(chunk, block_size)?;

            // Regenerate on the (replayed-content) corner where the anon
            // block would collide with one of its own randomizers.
            let mut placed = false;
            for _ in 0..3 {
                let (r1, r2) = self.selector.select_pair(block_size, data_block.id()).await?;
                let anon = data_block.xor3(&r1.block, &r2.block)?;
                if anon.id() == r1.cid || anon.id() == r2.cid {
                    continue;
                }
                let anon_cid = self.adapter.put_block_with_meta(&anon, &BlockMeta::user_data()).await?;
                stored_bytes += anon.len() as u64;
                if r1.fresh {
                    stored_bytes += r1.block.len() as u64;
                }
                if r2.fresh {
                    stored_bytes += r2.block.len() as u64;
                }
                descriptor.push_triple(anon_cid, r1.cid, r2.cid, true_len);
                placed = true;
                break;
            }
            if !placed {
                return Err(RandomizerError::Collision.into());
            }

            index += 1;
            if let Some(p) = progress {
                p("anonymize", index, 0);
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let desc_block = Block::new(descriptor.to_json()?).map_err(|_| PipelineError::InvalidInput)?;
        let desc_cid = self
            .adapter
            .put_block_with_meta(&desc_block, &BlockMeta::descriptor())
            .await?;

        self.metrics.uploads_total.inc();
        self.metrics
            .upload_original_bytes_total
            .inc_by(descriptor.file_size);
        self.metrics.upload_stored_bytes_total.inc_by(stored_bytes);
        info!(
            descriptor = %desc_cid,
            file_size = descriptor.file_size,
            blocks = descriptor.triples.len(),
            stored_bytes,
            "upload complete"
        );
        Ok(desc_cid)
    }

    /// Reconstruct a file from its descriptor CID.
    pub async fn download(
        &self,
        descriptor_cid: &str,
        progress: Option<&ProgressFn>,
        cancel: &CancelFlag,
    ) -> Result<(Vec<u8>, String), PipelineError> {
        let desc_block = self
            .adapter
            .get_block(descriptor_cid)
            .await
            .map_err(|_| PipelineError::FileUnavailable)?;
        let descriptor = Descriptor::from_json(desc_block.data())?;

        let total = descriptor.triples.len() as u64;
        let mut out: Vec<u8> = Vec::with_capacity(descriptor.file_size as usize);

        for (i, triple) in descriptor.triples.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let anon = self.fetch(&triple.data).await?;
            let r1 = self.fetch(&triple.rand1).await?;
            let original = match &triple.rand2 {
                Some(r2_cid) => {
                    let r2 = self.fetch(r2_cid).await?;
                    anon.xor3(&r1, &r2)?
                }
                // Legacy two-part descriptors carry a single randomizer.
                None => anon.xor(&r1)?,
            };
            out.extend_from_slice(original.data());
            if let Some(p) = progress {
                p("reassemble", (i + 1) as u64, total);
            }
        }

        out.truncate(descriptor.file_size as usize);
        self.metrics.downloads_total.inc();
        self.metrics.download_bytes_total.inc_by(out.len() as u64);
        debug!(
            descriptor = %descriptor_cid,
            bytes = out.len(),
            "download complete"
        );
        Ok((out, descriptor.filename))
    }

    async fn fetch(&self, cid: &str) -> Result<Arc<Block>, PipelineError> {
        self.adapter
            .get_block(cid)
            .await
            .map_err(|_| PipelineError::FileUnavailable)
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut R,
    size: usize,
) -> Result<Vec<u8>, PipelineError> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|_| PipelineError::Read)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
