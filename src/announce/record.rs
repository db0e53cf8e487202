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

//! The announcement wire record.
//!
//! Bit-exact JSON with compact field names; anything above 4 KiB is
//! rejected. The record deliberately leaks little: a topic hash instead of a
//! topic, a bloom filter instead of tags, a size class instead of a size.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Announcement wire version.
pub const ANNOUNCEMENT_VERSION: &str = "1.0";

/// Hard cap on the serialized record.
pub const MAX_WIRE_BYTES: usize = 4096;

/// Record errors.
#[derive(Debug, Error)]
pub enum RecordError {
    /// JSON decode failed.
    #[error("announcement decode")]
    Decode,
    /// JSON encode failed.
    #[error("announcement encode")]
    Encode,
    /// Serialized record exceeds [`MAX_WIRE_BYTES`].
    #[error("announcement too large")]
    TooLarge,
    /// Unknown wire version.
    #[error("unsupported announcement version")]
    Version,
    /// Empty descriptor CID.
    #[error("empty descriptor")]
    EmptyDescriptor,
    /// Empty topic hash.
    #[error("empty topic hash")]
    EmptyTopicHash,
    /// Timestamp must be positive.
    #[error("invalid timestamp")]
    BadTimestamp,
    /// TTL must be positive.
    #[error("invalid ttl")]
    BadTtl,
    /// A signature requires a peer id.
    #[error("signature without peer id")]
    SignatureWithoutPeer,
    /// Unknown category or size class name.
    #[error("unknown enum value")]
    BadEnum,
}

/// Content category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Video content.
    Video,
    /// Audio content.
    Audio,
    /// Documents.
    Document,
    /// Datasets.
    Data,
    /// Software.
    Software,
    /// Images.
    Image,
    /// Archives.
    Archive,
    /// Everything else.
    Other,
}

impl FromStr for Category {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Category::Video),
            "audio" => Ok(Category::Audio),
            "document" => Ok(Category::Document),
            "data" => Ok(Category::Data),
            "software" => Ok(Category::Software),
            "image" => Ok(Category::Image),
            "archive" => Ok(Category::Archive),
            "other" => Ok(Category::Other),
            _ => Err(RecordError::BadEnum),
        }
    }
}

/// Coarse size bucket; exact sizes never hit the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    /// Under 1 MiB.
    Tiny,
    /// Under 10 MiB.
    Small,
    /// Under 100 MiB.
    Medium,
    /// Under 1 GiB.
    Large,
    /// 1 GiB and up.
    Huge,
}

impl SizeClass {
    /// Bucket for an exact byte size.
    pub fn from_file_size(bytes: u64) -> Self {
        const MIB: u64 = 1 << 20;
        const GIB: u64 = 1 << 30;
        if bytes < MIB {
            SizeClass::Tiny
        } else if bytes < 10 * MIB {
            SizeClass::Small
        } else if bytes < 100 * MIB {
            SizeClass::Medium
        } else if bytes < GIB {
            SizeClass::Large
        } else {
            SizeClass::Huge
        }
    }
}

impl FromStr for SizeClass {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tiny" => Ok(SizeClass::Tiny),
            "small" => Ok(SizeClass::Small),
            "medium" => Ok(SizeClass::Medium),
            "large" => Ok(SizeClass::Large),
            "huge" => Ok(SizeClass::Huge),
            _ => Err(RecordError::BadEnum),
        }
    }
}

/// A content announcement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Wire version.
    #[serde(rename = "v")]
    pub version: String,
    /// Descriptor CID being announced.
    #[serde(rename = "d")]
    pub descriptor: String,
    /// SHA-256 hex of the topic path.
    #[serde(rename = "t")]
    pub topic_hash: String,
    /// Encoded tag bloom filter.
    #[serde(rename = "tb", default, skip_serializing_if = "Option::is_none")]
    pub tag_bloom: Option<String>,
    /// Content category.
    #[serde(rename = "c")]
    pub category: Category,
    /// Size bucket.
    #[serde(rename = "s")]
    pub size_class: SizeClass,
    /// Creation time, unix seconds.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Seconds the record stays fresh past `timestamp`.
    #[serde(rename = "ttl")]
    pub ttl: u64,
    /// Distinguishes repeated announcements of one descriptor.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Announcer's peer id; required when signed.
    #[serde(rename = "pid", default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    /// Base64 signature over the canonical content.
    #[serde(rename = "sig", default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Announcement {
    /// Unsigned record with no bloom or nonce.
    pub fn new(
        descriptor: &str,
        topic_hash: &str,
        category: Category,
        size_class: SizeClass,
        ttl: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            version: ANNOUNCEMENT_VERSION.to_string(),
            descriptor: descriptor.to_string(),
            topic_hash: topic_hash.to_string(),
            tag_bloom: None,
            category,
            size_class,
            timestamp,
            ttl,
            nonce: None,
            peer_id: None,
            signature: None,
        }
    }

    /// Structural validation.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.version != ANNOUNCEMENT_VERSION {
            return Err(RecordError::Version);
        }
        if self.descriptor.is_empty() {
            return Err(RecordError::EmptyDescriptor);
        }
        if self.topic_hash.is_empty() {
            return Err(RecordError::EmptyTopicHash);
        }
        if self.timestamp <= 0 {
            return Err(RecordError::BadTimestamp);
        }
        if self.ttl == 0 {
            return Err(RecordError::BadTtl);
        }
        if self.signature.is_some() && self.peer_id.is_none() {
            return Err(RecordError::SignatureWithoutPeer);
        }
        Ok(())
    }

    /// Whether the record is past `timestamp + ttl` at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.timestamp.saturating_add_unsigned(self.ttl)
    }

    /// Serialize, enforcing the wire cap.
    pub fn to_json(&self) -> Result<Vec<u8>, RecordError> {
        let bytes = serde_json::to_vec(self).map_err(|_| RecordError::Encode)?;
        if bytes.len() > MAX_WIRE_BYTES {
            return Err(RecordError::TooLarge);
        }
        Ok(bytes)
    }

    /// Parse and validate; enforces the wire cap.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() > MAX_WIRE_BYTES {
            return Err(RecordError::TooLarge);
        }
        let a: Announcement = serde_json::from_slice(bytes).map_err(|_| RecordError::Decode)?;
        a.validate()?;
        Ok(a)
    }
}
