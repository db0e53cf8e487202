// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Randomizer selection for triple XOR.
//!
//! Prefers cached, already-stored randomizers (reuse is what keeps storage
//! overhead near 1.5x) and falls back to generating fresh random blocks.
//! All randomness is cryptographically secure.

use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use crate::cabs::adapter::{AdapterError, BlockStoreAdapter};
use crate::cache::{AdaptiveCache, BlockMeta};
use crate::core::block::{Block, BlockError};

/// How many cached candidates to consider per selection.
const CANDIDATE_POOL: usize = 20;
/// Bound on id-collision retries (collisions need identical replayed bytes).
const MAX_COLLISION_RETRIES: usize = 10;

/// Randomizer selection errors.
#[derive(Debug, Error)]
pub enum RandomizerError {
    /// RNG failure.
    #[error("rng")]
    Rng,
    /// Could not produce two distinct randomizers within the retry bound.
    #[error("randomizer collision")]
    Collision,
    /// Block construction failed.
    #[error("block")]
    Block(#[from] BlockError),
    /// Store write failed.
    #[error("store")]
    Store(#[from] AdapterError),
}

/// A selected randomizer: its CID, the block, and whether it was freshly
/// generated (fresh randomizers count toward stored bytes).
#[derive(Clone)]
pub struct RandomizerRef {
    /// Content id (already stored upstream).
    pub cid: String,
    /// The randomizer block.
    pub block: Arc<Block>,
    /// True when generated for this selection rather than reused.
    pub fresh: bool,
}

/// Chooses two randomizers per data block.
pub struct RandomizerSelector {
    cache: Arc<AdaptiveCache>,
    adapter: Arc<BlockStoreAdapter>,
    rng: SystemRandom,
}

impl RandomizerSelector {
    /// New selector over the given cache and store.
    pub fn new(cache: Arc<AdaptiveCache>, adapter: Arc<BlockStoreAdapter>) -> Self {
        Self {
            cache,
            adapter,
            rng: SystemRandom::new(),
        }
    }

    /// Select two distinct randomizers of `size` bytes, never colliding with
    /// `exclude_id` (the data block's id). Both are stored upstream before
    /// this returns.
    pub async fn select_pair(
        &self,
        size: usize,
        exclude_id: &str,
    ) -> Result<(RandomizerRef, RandomizerRef), RandomizerError> {
        let candidates: Vec<(String, Arc<Block>)> = self
            .cache
            .get_randomizers(CANDIDATE_POOL, size)
            .into_iter()
            .filter(|(cid, _)| cid != exclude_id)
            .collect();

        if candidates.len() >= 2 {
            let (i, j) = self.pick_two_distinct(candidates.len())?;
            let (c1, b1) = candidates[i].clone();
            let (c2, b2) = candidates[j].clone();
            self.cache.increment_popularity(&c1);
            self.cache.increment_popularity(&c2);
            return Ok((
                RandomizerRef {
                    cid: c1,
                    block: b1,
                    fresh: false,
                },
                RandomizerRef {
                    cid: c2,
                    block: b2,
                    fresh: false,
                },
            ));
        }

        if candidates.len() == 1 {
            let (c1, b1) = candidates[0].clone();
            let fresh = self.generate_stored(size, &[exclude_id, &c1]).await?;
            self.cache.increment_popularity(&c1);
            return Ok((
                RandomizerRef {
                    cid: c1,
                    block: b1,
                    fresh: false,
                },
                fresh,
            ));
        }

        let r1 = self.generate_stored(size, &[exclude_id]).await?;
        let r2 = self.generate_stored(size, &[exclude_id, &r1.cid]).await?;
        Ok((r1, r2))
    }

    async fn generate_stored(
        &self,
        size: usize,
        forbidden: &[&str],
    ) -> Result<RandomizerRef, RandomizerError> {
        for _ in 0..MAX_COLLISION_RETRIES {
            let block = Block::new_random(size, &self.rng)?;
            if forbidden.contains(&block.id()) {
                continue;
            }
            let cid = self
                .adapter
                .put_block_with_meta(&block, &BlockMeta::randomizer())
                .await?;
            return Ok(RandomizerRef {
                cid,
                block: Arc::new(block),
                fresh: true,
            });
        }
        Err(RandomizerError::Collision)
    }

    fn pick_two_distinct(&self, n: usize) -> Result<(usize, usize), RandomizerError> {
        let i = self.secure_index(n)?;
        let mut j = self.secure_index(n - 1)?;
        if j >= i {
            j += 1;
        }
        Ok((i, j))
    }

    fn secure_index(&self, n: usize) -> Result<usize, RandomizerError> {
        let mut buf = [0u8; 8];
        self.rng.fill(&mut buf).map_err(|_| RandomizerError::Rng)?;
        Ok((u64::from_be_bytes(buf) % n as u64) as usize)
    }
}
