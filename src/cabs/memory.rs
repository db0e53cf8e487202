// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! In-process CABS backend.
//!
//! Content-addressed map plus broadcast pub/sub and a DHT map, all in
//! memory. This backs the test suite and the local demo mode; it is not a
//! network store.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::cabs::{Cabs, CabsError, Cid};
use crate::core::block::block_id;

const TOPIC_BUFFER: usize = 256;

/// In-memory content-addressed store with pub/sub and DHT maps.
#[derive(Default)]
pub struct MemoryCabs {
    blocks: RwLock<BTreeMap<String, Vec<u8>>>,
    dht: RwLock<BTreeMap<String, Vec<u8>>>,
    topics: Mutex<BTreeMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl MemoryCabs {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks (test observability).
    pub fn block_count(&self) -> usize {
        self.blocks.read().map(|m| m.len()).unwrap_or(0)
    }

    fn topic_sender(&self, topic: &str) -> Result<broadcast::Sender<Vec<u8>>, CabsError> {
        let mut topics = self.topics.lock().map_err(|_| CabsError::Backend)?;
        Ok(topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0)
            .clone())
    }
}

#[async_trait]
impl Cabs for MemoryCabs {
    async fn put(&self, data: Vec<u8>) -> Result<Cid, CabsError> {
        let cid = block_id(&data);
        let mut blocks = self.blocks.write().map_err(|_| CabsError::Backend)?;
        blocks.entry(cid.clone()).or_insert(data);
        Ok(cid)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, CabsError> {
        let blocks = self.blocks.read().map_err(|_| CabsError::Backend)?;
        blocks.get(cid).cloned().ok_or(CabsError::NotFound)
    }

    async fn get_from_peer(&self, cid: &str, _peer_id: &str) -> Result<Vec<u8>, CabsError> {
        // Single-process store: every peer hint resolves locally.
        self.get(cid).await
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), CabsError> {
        let tx = self.topic_sender(topic)?;
        // No subscribers is not an error for pub/sub.
        let _ = tx.send(data);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>, CabsError> {
        let tx = self.topic_sender(topic)?;
        let mut sub = tx.subscribe();
        let (fwd_tx, fwd_rx) = mpsc::channel(TOPIC_BUFFER);
        tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(msg) => {
                        if fwd_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(fwd_rx)
    }

    async fn dht_put(&self, key: &str, value: Vec<u8>) -> Result<(), CabsError> {
        let mut dht = self.dht.write().map_err(|_| CabsError::Backend)?;
        dht.insert(key.to_string(), value);
        Ok(())
    }

    async fn dht_get(&self, key: &str) -> Result<Option<Vec<u8>>, CabsError> {
        let dht = self.dht.read().map_err(|_| CabsError::Backend)?;
        Ok(dht.get(key).cloned())
    }
}
