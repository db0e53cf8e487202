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

//! Content-addressed blocks and the XOR operations that anonymize them.
//!
//! A block's id is the hex SHA-256 of its bytes; XOR results re-derive their
//! id from the combined bytes, never from the inputs.

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Block errors.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Blocks never carry zero bytes.
    #[error("empty block data")]
    Empty,
    /// Random blocks need a positive size.
    #[error("zero block size")]
    ZeroSize,
    /// XOR operands must have equal lengths.
    #[error("length mismatch")]
    LengthMismatch,
    /// Payload exceeds the requested padded size.
    #[error("data larger than block size")]
    Oversize,
    /// System RNG failure.
    #[error("rng")]
    Rng,
}

/// Hex SHA-256 of `data`.
pub fn block_id(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// A fixed payload with its content-derived id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    id: String,
    data: Vec<u8>,
}

impl Block {
    /// Wrap bytes into a block. Rejects empty data.
    pub fn new(data: Vec<u8>) -> Result<Self, BlockError> {
        if data.is_empty() {
            return Err(BlockError::Empty);
        }
        let id = block_id(&data);
        Ok(Self { id, data })
    }

    /// Wrap bytes, zero-padding up to `size`.
    ///
    /// Upload and download apply the same padding so all three operands of a
    /// triple share one length; the true byte count lives in the descriptor.
    pub fn new_padded(mut data: Vec<u8>, size: usize) -> Result<Self, BlockError> {
        if data.is_empty() {
            return Err(BlockError::Empty);
        }
        if data.len() > size {
            return Err(BlockError::Oversize);
        }
        data.resize(size, 0);
        Self::new(data)
    }

    /// Fill a block with cryptographically secure random bytes.
    pub fn new_random(size: usize, rng: &SystemRandom) -> Result<Self, BlockError> {
        if size == 0 {
            return Err(BlockError::ZeroSize);
        }
        let mut data = vec![0u8; size];
        rng.fill(&mut data).map_err(|_| BlockError::Rng)?;
        Self::new(data)
    }

    /// Content id (hex SHA-256).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; empty blocks cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume into the payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// XOR with one other equal-length block.
    pub fn xor(&self, other: &Block) -> Result<Block, BlockError> {
        if self.data.len() != other.data.len() {
            return Err(BlockError::LengthMismatch);
        }
        let data: Vec<u8> = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        Block::new(data)
    }

    /// XOR with two equal-length blocks: `self ⊕ r1 ⊕ r2`.
    pub fn xor3(&self, r1: &Block, r2: &Block) -> Result<Block, BlockError> {
        if self.data.len() != r1.data.len() || self.data.len() != r2.data.len() {
            return Err(BlockError::LengthMismatch);
        }
        let data: Vec<u8> = self
            .data
            .iter()
            .zip(r1.data.iter())
            .zip(r2.data.iter())
            .map(|((a, b), c)| a ^ b ^ c)
            .collect();
        Block::new(data)
    }

    /// Recompute the id and compare against the stored one.
    pub fn verify_integrity(&self) -> bool {
        block_id(&self.data) == self.id
    }
}
