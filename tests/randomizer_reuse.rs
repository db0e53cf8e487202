// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Randomizer reuse is what pushes storage overhead toward 1.5x; a second
//! upload of similar content must draw from the cached randomizer pool.

use std::collections::BTreeSet;
use std::sync::Arc;

use noisefs::cabs::adapter::{AdapterConfig, BlockStoreAdapter};
use noisefs::cabs::memory::MemoryCabs;
use noisefs::cabs::Cabs;
use noisefs::cache::{AdaptiveCache, CacheConfig};
use noisefs::core::descriptor::Descriptor;
use noisefs::core::pipeline::{Pipeline, PipelineConfig};
use noisefs::monitoring::metrics::Metrics;
use noisefs::tasks::CancelFlag;

const BLOCK_SIZE: u32 = 256;

async fn descriptor_of(adapter: &BlockStoreAdapter, cid: &str) -> Descriptor {
    let block = adapter.get_block(cid).await.expect("descriptor block");
    Descriptor::from_json(block.data()).expect("descriptor parse")
}

fn randomizer_cids(d: &Descriptor) -> BTreeSet<String> {
    d.triples
        .iter()
        .flat_map(|t| {
            let mut v = vec![t.rand1.clone()];
            if let Some(r2) = &t.rand2 {
                v.push(r2.clone());
            }
            v
        })
        .collect()
}

#[tokio::test]
async fn second_upload_reuses_cached_randomizers() {
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let cabs: Arc<dyn Cabs> = Arc::new(MemoryCabs::new());
    let cache = Arc::new(AdaptiveCache::new(CacheConfig::default(), metrics.clone()));
    let adapter = Arc::new(BlockStoreAdapter::new(
        cabs,
        cache.clone(),
        AdapterConfig::default(),
        metrics.clone(),
    ));
    let pipeline = Pipeline::new(
        adapter.clone(),
        cache.clone(),
        PipelineConfig {
            block_size: BLOCK_SIZE,
        },
        metrics,
    );
    let cancel = CancelFlag::new();

    // Four blocks of unique content.
    let mut payload = Vec::with_capacity(4 * BLOCK_SIZE as usize);
    for block in 0u8..4 {
        payload.extend(std::iter::repeat(block + 1).take(BLOCK_SIZE as usize));
    }

    let cid_a = pipeline
        .upload_bytes(&payload, "a.bin", None, &cancel)
        .await
        .expect("upload a");
    let desc_a = descriptor_of(&adapter, &cid_a).await;
    let rand_a = randomizer_cids(&desc_a);
    // The first block seeds the pool; later blocks already draw from it.
    assert!(rand_a.len() >= 2);

    let cid_b = pipeline
        .upload_bytes(&payload, "b.bin", None, &cancel)
        .await
        .expect("upload b");
    let desc_b = descriptor_of(&adapter, &cid_b).await;
    let rand_b = randomizer_cids(&desc_b);

    // Everything the second upload used came out of the cached pool.
    assert!(rand_b.is_subset(&rand_a), "expected full reuse from the pool");
    let overlap = rand_b.intersection(&rand_a).count();
    assert!(overlap * 2 >= rand_b.len(), "expected at least 50% overlap");

    let stats = cache.stats();
    assert!(
        stats.randomizer_uses >= 4,
        "expected at least 4 reuse events, saw {}",
        stats.randomizer_uses
    );

    // Reuse must not break reconstruction of either file.
    let (bytes_a, _) = pipeline.download(&cid_a, None, &cancel).await.expect("download a");
    let (bytes_b, _) = pipeline.download(&cid_b, None, &cancel).await.expect("download b");
    assert_eq!(bytes_a, payload);
    assert_eq!(bytes_b, payload);
}
