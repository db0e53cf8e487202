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

//! NoiseFS - privacy-preserving distributed file storage over a
//! content-addressed block network.
//!
//! This crate provides:
//! - Triple-XOR block anonymization with descriptor-based reconstruction
//! - An adaptive multi-tier block cache with model-scored eviction and
//!   randomizer-aware reuse
//! - Privacy-preserving content discovery: topic-hashed, bloom-filtered
//!   announcements over CABS pub/sub and DHT with signature verification,
//!   admission control, and local search

/// Discovery subsystem: announcements, topics, store, search.
pub mod announce;
/// Content-addressed block store boundary and adapter.
pub mod cabs;
/// Adaptive multi-tier block cache.
pub mod cache;
/// Node configuration.
pub mod config;
/// Core anonymization engine.
pub mod core;
/// Observability (Prometheus metrics).
pub mod monitoring;
/// Background task ownership and cancellation.
pub mod tasks;
