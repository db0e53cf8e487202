// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node configuration.
//!
//! JSON file selected by `NOISEFS_CONFIG`, falling back to
//! `<data_dir>/config.json`, falling back to defaults. `NOISEFS_DATA_DIR`
//! overrides the data directory either way.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::announce::publisher::PublisherConfig;
use crate::announce::security::SecurityConfig;
use crate::announce::store::StoreConfig;
use crate::announce::subscriber::SubscriberConfig;
use crate::cabs::adapter::AdapterConfig;
use crate::cache::CacheConfig;
use crate::core::pipeline::PipelineConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable.
    #[error("config read")]
    Read,
    /// Config file is not valid JSON.
    #[error("config parse")]
    Parse,
}

/// Root configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Data directory (keys, subscriptions, announcement records).
    pub data_dir: String,
    /// Optional JSON file seeding the topic hierarchy.
    pub topics_seed: String,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Pipeline settings.
    pub pipeline: PipelineConfig,
    /// Block store adapter settings.
    pub adapter: AdapterConfig,
    /// Publisher settings.
    pub publisher: PublisherConfig,
    /// Subscriber settings.
    pub subscriber: SubscriberConfig,
    /// Admission control settings.
    pub security: SecurityConfig,
    /// Announcement store settings.
    pub store: StoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            topics_seed: String::new(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            adapter: AdapterConfig::default(),
            publisher: PublisherConfig::default(),
            subscriber: SubscriberConfig::default(),
            security: SecurityConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Announcement store directory, defaulting under the data dir.
    pub fn store_dir(&self) -> PathBuf {
        if self.store.dir.as_os_str().is_empty() {
            PathBuf::from(&self.data_dir).join("announcements")
        } else {
            self.store.dir.clone()
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from the environment-selected file.
pub fn load() -> Result<NodeConfig, ConfigError> {
    let data_dir = env("NOISEFS_DATA_DIR");

    let explicit = env("NOISEFS_CONFIG").map(PathBuf::from);
    let fallback = PathBuf::from(data_dir.as_deref().unwrap_or("./data")).join("config.json");

    let mut cfg = match explicit {
        Some(path) => {
            let bytes = fs::read(&path).map_err(|_| ConfigError::Read)?;
            serde_json::from_slice(&bytes).map_err(|_| ConfigError::Parse)?
        }
        None => {
            if fallback.exists() {
                let bytes = fs::read(&fallback).map_err(|_| ConfigError::Read)?;
                serde_json::from_slice(&bytes).map_err(|_| ConfigError::Parse)?
            } else {
                NodeConfig::default()
            }
        }
    };

    if let Some(dir) = data_dir {
        cfg.data_dir = dir;
    }
    Ok(cfg)
}
