// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use noisefs::core::descriptor::{Descriptor, DescriptorError, Triple};
use proptest::prelude::*;

fn filled(filename: &str, block_size: u32, file_size: u64) -> Descriptor {
    let mut d = Descriptor::new(filename, block_size, 1_700_000_000);
    let blocks = file_size.div_ceil(block_size as u64);
    let mut remaining = file_size;
    for i in 0..blocks {
        let true_bytes = remaining.min(block_size as u64);
        remaining -= true_bytes;
        d.push_triple(
            format!("anon-{i}"),
            format!("rand1-{i}"),
            format!("rand2-{i}"),
            true_bytes,
        );
    }
    d
}

proptest! {
    #[test]
    fn prop_triples_match_ceil_of_size_over_block(
        block_size in 1u32..4096,
        file_size in 1u64..1_000_000,
    ) {
        let d = filled("f.bin", block_size, file_size);
        prop_assert_eq!(
            d.triples.len() as u64,
            file_size.div_ceil(block_size as u64)
        );
        prop_assert!(d.validate().is_ok());
    }

    #[test]
    fn prop_json_round_trip(
        block_size in 1u32..1024,
        file_size in 1u64..100_000,
        filename in "[a-zA-Z0-9._ -]{1,40}",
    ) {
        let d = filled(&filename, block_size, file_size);
        let back = Descriptor::from_json(&d.to_json().unwrap()).unwrap();
        prop_assert_eq!(d, back);
    }
}

#[test]
fn wrong_version_rejected() {
    let mut d = filled("f", 8, 16);
    d.version = "2.0".to_string();
    assert!(matches!(
        Descriptor::from_json(&serde_json::to_vec(&d).unwrap()),
        Err(DescriptorError::Version)
    ));
}

#[test]
fn zero_block_size_rejected() {
    let mut d = filled("f", 8, 16);
    d.block_size = 0;
    assert!(matches!(d.validate(), Err(DescriptorError::BlockSize)));
}

#[test]
fn triple_count_mismatch_rejected() {
    let mut d = filled("f", 8, 16);
    d.triples.pop();
    assert!(matches!(d.validate(), Err(DescriptorError::TripleCount)));
}

#[test]
fn duplicate_cids_in_triple_rejected() {
    let mut d = filled("f", 8, 8);
    d.triples[0].rand2 = Some(d.triples[0].rand1.clone());
    assert!(matches!(d.validate(), Err(DescriptorError::Triple)));
}

#[test]
fn empty_cid_rejected() {
    let mut d = filled("f", 8, 8);
    d.triples[0].data = String::new();
    assert!(matches!(d.validate(), Err(DescriptorError::Triple)));
}

#[test]
fn legacy_two_part_triples_parse() {
    let json = serde_json::json!({
        "filename": "old.bin",
        "file_size": 8,
        "block_size": 8,
        "triples": [{"d": "anon-0", "r1": "rand-0"}],
        "created_at": 1_600_000_000,
        "version": "1.0",
    });
    let d = Descriptor::from_json(&serde_json::to_vec(&json).unwrap()).expect("legacy parse");
    assert!(d.has_legacy_pairs());
    assert_eq!(d.triples[0], Triple {
        data: "anon-0".to_string(),
        rand1: "rand-0".to_string(),
        rand2: None,
    });
}

#[test]
fn wire_field_names_are_compact() {
    let d = filled("f", 8, 8);
    let wire = String::from_utf8(d.to_json().unwrap()).unwrap();
    assert!(wire.contains("\"d\":"));
    assert!(wire.contains("\"r1\":"));
    assert!(wire.contains("\"r2\":"));
    assert!(wire.contains("\"filename\":"));
    assert!(wire.contains("\"version\":\"1.0\""));
}
