// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use std::sync::Arc;

use noisefs::cache::{AdaptiveCache, BlockMeta, CacheConfig, CacheError, Tier};
use noisefs::core::block::Block;
use noisefs::monitoring::metrics::Metrics;

fn cache_with_capacity(capacity_bytes: u64) -> Arc<AdaptiveCache> {
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    Arc::new(AdaptiveCache::new(
        CacheConfig {
            capacity_bytes,
            ..CacheConfig::default()
        },
        metrics,
    ))
}

fn block_of(byte: u8, len: usize) -> Arc<Block> {
    Arc::new(Block::new(vec![byte; len]).expect("block"))
}

#[test]
fn put_then_get_returns_same_data() {
    let cache = cache_with_capacity(1 << 20);
    let block = block_of(7, 128);
    cache
        .put(block.id(), block.clone(), &BlockMeta::user_data())
        .expect("put");
    let (got, _tier) = cache.get(block.id()).expect("hit");
    assert_eq!(got.data(), block.data());
    assert!(got.verify_integrity());
}

#[test]
fn get_miss_is_not_an_error() {
    let cache = cache_with_capacity(1 << 20);
    assert!(cache.get("absent").is_none());
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
}

#[test]
fn oversized_item_fails_with_capacity_exhausted() {
    let cache = cache_with_capacity(256);
    let block = block_of(1, 512);
    let block_id = block.id().to_string();
    let err = cache
        .put(&block_id, block, &BlockMeta::user_data())
        .expect_err("oversized put must fail");
    assert!(matches!(err, CacheError::CapacityExhausted));
}

#[test]
fn full_cache_evicts_to_admit_equal_sized_item() {
    let cache = cache_with_capacity(4 * 256);
    for byte in 0u8..4 {
        let b = block_of(byte, 256);
        let b_id = b.id().to_string();
        cache.put(&b_id, b, &BlockMeta::user_data()).expect("fill");
    }
    assert_eq!(cache.stats().items, 4);

    let newcomer = block_of(9, 256);
    cache
        .put(newcomer.id(), newcomer.clone(), &BlockMeta::user_data())
        .expect("put at capacity");

    let stats = cache.stats();
    assert!(stats.evictions >= 1, "expected at least one eviction");
    assert!(stats.bytes <= 4 * 256);
    assert!(cache.get(newcomer.id()).is_some());
}

#[test]
fn randomizers_enter_hot_and_are_selectable_by_size() {
    let cache = cache_with_capacity(1 << 20);
    let rand = block_of(3, 128);
    let data = block_of(4, 128);
    let other_size = block_of(5, 64);
    cache
        .put(rand.id(), rand.clone(), &BlockMeta::randomizer())
        .expect("put rand");
    cache
        .put(data.id(), data.clone(), &BlockMeta::user_data())
        .expect("put data");
    cache
        .put(other_size.id(), other_size.clone(), &BlockMeta::randomizer())
        .expect("put other");

    let (_b, tier) = cache.get(rand.id()).expect("hit");
    assert_eq!(tier, Tier::Hot);

    let candidates = cache.get_randomizers(10, 128);
    let cids: Vec<&str> = candidates.iter().map(|(cid, _)| cid.as_str()).collect();
    assert!(cids.contains(&rand.id()));
    assert!(!cids.contains(&data.id()), "plain data is never a candidate");
    assert!(!cids.contains(&other_size.id()), "size must match");
}

#[test]
fn popularity_counter_tracks_reuse() {
    let cache = cache_with_capacity(1 << 20);
    let rand = block_of(3, 128);
    cache
        .put(rand.id(), rand.clone(), &BlockMeta::randomizer())
        .expect("put");
    cache.increment_popularity(rand.id());
    cache.increment_popularity(rand.id());
    assert_eq!(cache.stats().randomizer_uses, 2);
}

#[test]
fn maintenance_keeps_bytes_under_capacity_pressure() {
    let cache = cache_with_capacity(10 * 128);
    for byte in 0u8..9 {
        let b = block_of(byte, 128);
        let b_id = b.id().to_string();
        cache.put(&b_id, b, &BlockMeta::user_data()).expect("fill");
    }
    // 9/10 of capacity used; maintenance frees 10% of capacity.
    cache.run_maintenance(noisefs::tasks::now_unix());
    let stats = cache.stats();
    assert!(stats.bytes <= 8 * 128, "expected proactive free, saw {}", stats.bytes);
    assert!(stats.evictions >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_put_preserves_content_addressing() {
    let cache = cache_with_capacity(1 << 20);
    let blocks: Vec<Arc<Block>> = (0u8..10).map(|b| block_of(b, 64)).collect();

    let mut handles = Vec::new();
    for task in 0..100 {
        let cache = cache.clone();
        let block = blocks[task % blocks.len()].clone();
        handles.push(tokio::spawn(async move {
            cache
                .put(block.id(), block.clone(), &BlockMeta::user_data())
                .expect("put");
            if let Some((got, _)) = cache.get(block.id()) {
                assert_eq!(got.id(), block.id());
                assert_eq!(got.data(), block.data());
                assert!(got.verify_integrity());
            }
        }));
    }
    for h in handles {
        h.await.expect("task");
    }

    // Every distinct block is present exactly once.
    let stats = cache.stats();
    assert_eq!(stats.items, blocks.len());
}
