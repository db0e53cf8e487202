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

//! File descriptors: the ordered triple list that is a file's capability.
//!
//! Descriptors are immutable once stored. They are stored as plain blocks
//! (never XOR-anonymized); their CID is the public capability to download.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor wire version.
pub const DESCRIPTOR_VERSION: &str = "1.0";

/// Descriptor errors.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// JSON decode failed.
    #[error("descriptor decode")]
    Decode,
    /// JSON encode failed.
    #[error("descriptor encode")]
    Encode,
    /// Unknown wire version.
    #[error("unsupported descriptor version")]
    Version,
    /// `block_size` must be at least 1.
    #[error("invalid block size")]
    BlockSize,
    /// Triple count disagrees with `ceil(file_size / block_size)`.
    #[error("triple count mismatch")]
    TripleCount,
    /// A triple carries an empty or duplicated CID.
    #[error("invalid triple")]
    Triple,
}

/// One anonymized block with its two randomizers.
///
/// `rand2` is absent only in legacy two-part descriptors; new descriptors
/// always carry all three CIDs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// CID of the anonymized (XORed) data block.
    #[serde(rename = "d")]
    pub data: String,
    /// CID of the first randomizer.
    #[serde(rename = "r1")]
    pub rand1: String,
    /// CID of the second randomizer (legacy descriptors omit it).
    #[serde(rename = "r2", default, skip_serializing_if = "Option::is_none")]
    pub rand2: Option<String>,
}

/// Serializable file descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Original filename.
    pub filename: String,
    /// True file size in bytes (output is truncated to this on download).
    pub file_size: u64,
    /// Uniform block size used for splitting.
    pub block_size: u32,
    /// Triples in file byte order.
    pub triples: Vec<Triple>,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Wire version.
    pub version: String,
}

impl Descriptor {
    /// Start an empty descriptor; `file_size` accumulates as blocks flow.
    pub fn new(filename: &str, block_size: u32, created_at: i64) -> Self {
        Self {
            filename: filename.to_string(),
            file_size: 0,
            block_size,
            triples: Vec::new(),
            created_at,
            version: DESCRIPTOR_VERSION.to_string(),
        }
    }

    /// Append a triple and count the true bytes it represents.
    pub fn push_triple(&mut self, data: String, rand1: String, rand2: String, true_bytes: u64) {
        self.triples.push(Triple {
            data,
            rand1,
            rand2: Some(rand2),
        });
        self.file_size += true_bytes;
    }

    /// Whether any triple is in the legacy two-part form.
    pub fn has_legacy_pairs(&self) -> bool {
        self.triples.iter().any(|t| t.rand2.is_none())
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, DescriptorError> {
        serde_json::to_vec(self).map_err(|_| DescriptorError::Encode)
    }

    /// Parse and validate the JSON wire form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let d: Descriptor = serde_json::from_slice(bytes).map_err(|_| DescriptorError::Decode)?;
        d.validate()?;
        Ok(d)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.version != DESCRIPTOR_VERSION {
            return Err(DescriptorError::Version);
        }
        if self.block_size == 0 {
            return Err(DescriptorError::BlockSize);
        }
        let expected = self.file_size.div_ceil(self.block_size as u64);
        if self.triples.len() as u64 != expected {
            return Err(DescriptorError::TripleCount);
        }
        for t in &self.triples {
            if t.data.is_empty() || t.rand1.is_empty() {
                return Err(DescriptorError::Triple);
            }
            if t.data == t.rand1 {
                return Err(DescriptorError::Triple);
            }
            if let Some(r2) = &t.rand2 {
                if r2.is_empty() || r2 == &t.data || r2 == &t.rand1 {
                    return Err(DescriptorError::Triple);
                }
            }
        }
        Ok(())
    }
}
