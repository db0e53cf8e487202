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

//! Tag bloom filters for privacy-preserving search.
//!
//! Tags never travel in the clear; an announcement carries only this filter.
//! Membership tests accept a bounded false-positive rate, which is a feature:
//! observers cannot enumerate tags from the wire form.
//!
//! The filter itself is a [`bloomfilter::Bloom`] sized for the expected tag
//! count and false-positive rate. Hashing is seeded with a fixed crate-wide
//! key so filters built on different nodes agree bit for bit; this module
//! adds tag normalization and the compact base64 wire form on top.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bloomfilter::Bloom;
use thiserror::Error;

/// Default expected tag count.
pub const DEFAULT_EXPECTED_TAGS: usize = 10;
/// Default false-positive rate.
pub const DEFAULT_FP_RATE: f64 = 0.01;

/// Upper bound on decoded filter size; rejects memory bombs off the wire.
const MAX_BITS: u32 = 1 << 20;

/// Fixed hashing seed. Every node derives the same hash keys from it, which
/// is what makes the wire form portable between peers.
const HASH_SEED: [u8; 32] = *b"noisefs/tag-bloom/seed/v1\0\0\0\0\0\0\0";

/// Bloom filter errors.
#[derive(Debug, Error)]
pub enum BloomError {
    /// Wire string is not a valid encoded filter.
    #[error("bloom decode")]
    Decode,
    /// Parameters out of range.
    #[error("bloom parameters")]
    Params,
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Hash keys every seeded filter shares.
fn seeded_sip_keys() -> [(u64, u64); 2] {
    Bloom::<String>::new_with_seed(1, 1, &HASH_SEED).sip_keys()
}

/// Bloom filter over normalized tags.
pub struct TagBloom {
    inner: Bloom<String>,
}

impl TagBloom {
    /// Filter sized for `expected_tags` at `fp_rate`.
    pub fn new(expected_tags: usize, fp_rate: f64) -> Result<Self, BloomError> {
        if expected_tags == 0 || !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(BloomError::Params);
        }
        let inner = Bloom::new_for_fp_rate_with_seed(expected_tags, fp_rate, &HASH_SEED);
        if inner.number_of_bits() > MAX_BITS as u64 || inner.number_of_hash_functions() > 255 {
            return Err(BloomError::Params);
        }
        Ok(Self { inner })
    }

    /// Filter with the default sizing.
    pub fn with_defaults() -> Self {
        // In-range defaults cannot fail the parameter checks.
        Self::new(DEFAULT_EXPECTED_TAGS, DEFAULT_FP_RATE).unwrap_or_else(|_| Self {
            inner: Bloom::new_with_seed(12, DEFAULT_EXPECTED_TAGS, &HASH_SEED),
        })
    }

    /// Bit count `m`.
    pub fn bit_len(&self) -> u32 {
        self.inner.number_of_bits() as u32
    }

    /// Hash count `k`.
    pub fn hash_count(&self) -> u8 {
        self.inner.number_of_hash_functions().min(u8::MAX as u32) as u8
    }

    /// Insert a tag (one-way).
    pub fn add(&mut self, tag: &str) {
        self.inner.set(&normalize(tag));
    }

    /// Probabilistic membership test; no false negatives.
    pub fn test(&self, tag: &str) -> bool {
        self.inner.check(&normalize(tag))
    }

    /// Fraction of set bits; spam-density signal.
    pub fn density(&self) -> f64 {
        let m = self.inner.number_of_bits();
        if m == 0 {
            return 0.0;
        }
        let ones: u64 = self
            .inner
            .bitmap()
            .iter()
            .map(|b| b.count_ones() as u64)
            .sum();
        ones as f64 / m as f64
    }

    /// Wire form: `k(1) ‖ m(4, BE) ‖ bits`, base64.
    pub fn encode(&self) -> String {
        let bits = self.inner.bitmap();
        let mut raw = Vec::with_capacity(5 + bits.len());
        raw.push(self.hash_count());
        raw.extend_from_slice(&self.bit_len().to_be_bytes());
        raw.extend_from_slice(&bits);
        BASE64.encode(raw)
    }

    /// Exact-bit decode of the wire form.
    pub fn decode(encoded: &str) -> Result<Self, BloomError> {
        let raw = BASE64.decode(encoded).map_err(|_| BloomError::Decode)?;
        if raw.len() < 5 {
            return Err(BloomError::Decode);
        }
        let k = raw[0];
        let m = u32::from_be_bytes([raw[1], raw[2], raw[3], raw[4]]);
        if k == 0 || m == 0 || m > MAX_BITS {
            return Err(BloomError::Decode);
        }
        let bits = &raw[5..];
        if bits.len() != m.div_ceil(8) as usize {
            return Err(BloomError::Decode);
        }
        let inner = Bloom::from_existing(bits, m as u64, k as u32, seeded_sip_keys());
        Ok(Self { inner })
    }
}

impl Clone for TagBloom {
    fn clone(&self) -> Self {
        Self {
            inner: Bloom::from_existing(
                &self.inner.bitmap(),
                self.inner.number_of_bits(),
                self.inner.number_of_hash_functions(),
                self.inner.sip_keys(),
            ),
        }
    }
}

impl PartialEq for TagBloom {
    fn eq(&self, other: &Self) -> bool {
        self.inner.number_of_bits() == other.inner.number_of_bits()
            && self.inner.number_of_hash_functions() == other.inner.number_of_hash_functions()
            && self.inner.bitmap() == other.inner.bitmap()
    }
}

impl Eq for TagBloom {}

impl fmt::Debug for TagBloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagBloom")
            .field("bits", &self.bit_len())
            .field("hashes", &self.hash_count())
            .field("density", &self.density())
            .finish()
    }
}

/// Build a filter from a tag list with default sizing.
pub fn bloom_from_tags<I, S>(tags: I) -> TagBloom
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut filter = TagBloom::with_defaults();
    for tag in tags {
        filter.add(tag.as_ref());
    }
    filter
}
