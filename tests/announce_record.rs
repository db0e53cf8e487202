// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use noisefs::announce::bloom::{bloom_from_tags, TagBloom};
use noisefs::announce::record::{
    Announcement, Category, RecordError, SizeClass, MAX_WIRE_BYTES,
};
use noisefs::announce::topics::{
    dht_key, hash_topic, normalize_path, pubsub_topic_name, TopicHierarchy,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn sample(ts: i64, ttl: u64) -> Announcement {
    Announcement::new(
        "QmDescriptor",
        &hash_topic("files/docs"),
        Category::Document,
        SizeClass::Small,
        ttl,
        ts,
    )
}

#[test]
fn expiry_boundaries_are_exact() {
    let a = sample(1_000, 60);
    assert!(!a.is_expired(1_000 + 60 - 1));
    assert!(!a.is_expired(1_000 + 60));
    assert!(a.is_expired(1_000 + 60 + 1));
}

#[test]
fn zero_ttl_and_bad_timestamps_rejected() {
    assert!(matches!(sample(1_000, 0).validate(), Err(RecordError::BadTtl)));
    assert!(matches!(
        sample(0, 60).validate(),
        Err(RecordError::BadTimestamp)
    ));
    assert!(matches!(
        sample(-5, 60).validate(),
        Err(RecordError::BadTimestamp)
    ));
}

#[test]
fn signature_requires_peer_id() {
    let mut a = sample(1_000, 60);
    a.signature = Some("c2ln".to_string());
    assert!(matches!(
        a.validate(),
        Err(RecordError::SignatureWithoutPeer)
    ));
    a.peer_id = Some("12D3KooWExample".to_string());
    assert!(a.validate().is_ok());
}

#[test]
fn wire_round_trip_preserves_every_field() {
    let mut a = sample(1_000, 60);
    a.tag_bloom = Some(bloom_from_tags(["pdf", "science"]).encode());
    a.nonce = Some("abc123".to_string());

    let wire = a.to_json().expect("encode");
    let back = Announcement::from_json(&wire).expect("decode");
    assert_eq!(a, back);
}

#[test]
fn wire_uses_compact_field_names() {
    let a = sample(1_000, 60);
    let wire = String::from_utf8(a.to_json().expect("encode")).expect("utf8");
    for key in ["\"v\":", "\"d\":", "\"t\":", "\"c\":", "\"s\":", "\"ts\":", "\"ttl\":"] {
        assert!(wire.contains(key), "missing {key} in {wire}");
    }
    assert!(!wire.contains("\"descriptor\""));
    assert!(!wire.contains("\"tb\":"), "absent options are omitted");
}

#[test]
fn oversized_records_rejected_both_ways() {
    let mut a = sample(1_000, 60);
    a.descriptor = "Q".repeat(MAX_WIRE_BYTES);
    assert!(matches!(a.to_json(), Err(RecordError::TooLarge)));

    let huge = vec![b'x'; MAX_WIRE_BYTES + 1];
    assert!(matches!(
        Announcement::from_json(&huge),
        Err(RecordError::TooLarge)
    ));
}

#[test]
fn size_class_thresholds() {
    const MIB: u64 = 1 << 20;
    const GIB: u64 = 1 << 30;
    assert_eq!(SizeClass::from_file_size(0), SizeClass::Tiny);
    assert_eq!(SizeClass::from_file_size(MIB - 1), SizeClass::Tiny);
    assert_eq!(SizeClass::from_file_size(MIB), SizeClass::Small);
    assert_eq!(SizeClass::from_file_size(10 * MIB), SizeClass::Medium);
    assert_eq!(SizeClass::from_file_size(100 * MIB), SizeClass::Large);
    assert_eq!(SizeClass::from_file_size(GIB), SizeClass::Huge);
}

#[test]
fn topic_hash_is_lowercase_hex() {
    let h = hash_topic("files/docs");
    assert_eq!(h.len(), 64);
    assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_ne!(h, hash_topic("files/docs/papers"));
}

#[test]
fn pubsub_and_dht_names_derive_from_hash() {
    let h = hash_topic("files");
    assert_eq!(pubsub_topic_name(&h), format!("noisefs-topic-{}", &h[..16]));
    assert_eq!(dht_key(&h), format!("/noisefs/announce/{h}"));
}

#[test]
fn topic_normalization_and_hierarchy_growth() {
    assert_eq!(normalize_path(" Files/My Docs ").expect("norm"), "files/my-docs");
    assert!(normalize_path("").is_err());
    assert!(normalize_path("a//b").is_err());
    assert!(normalize_path("a/b!c").is_err());

    let mut h = TopicHierarchy::new();
    h.add_topic("files/docs/papers", BTreeMap::new()).expect("add");
    assert!(h.contains("files"));
    assert!(h.contains("files/docs"));
    assert!(h.contains("files/docs/papers"));
    assert_eq!(
        h.self_and_descendants("files/docs"),
        vec!["files/docs".to_string(), "files/docs/papers".to_string()]
    );
    // Unknown paths still cover themselves.
    assert_eq!(h.self_and_descendants("other"), vec!["other".to_string()]);
}

#[test]
fn bloom_has_no_false_negatives_and_round_trips() {
    let mut filter = TagBloom::new(10, 0.01).expect("params");
    for tag in ["pdf", "Science", "  2024  "] {
        filter.add(tag);
    }
    // Normalization: trim + lowercase.
    assert!(filter.test("pdf"));
    assert!(filter.test("science"));
    assert!(filter.test("2024"));
    assert!(filter.test("SCIENCE "));

    let decoded = TagBloom::decode(&filter.encode()).expect("decode");
    assert_eq!(filter, decoded);
    assert_eq!(decoded.bit_len(), filter.bit_len());
    assert_eq!(decoded.hash_count(), filter.hash_count());
}

#[test]
fn bloom_rejects_garbage() {
    assert!(TagBloom::decode("!!!not-base64!!!").is_err());
    assert!(TagBloom::decode("AAAA").is_err());
    assert!(TagBloom::new(0, 0.01).is_err());
    assert!(TagBloom::new(10, 1.5).is_err());
}

proptest! {
    #[test]
    fn prop_bloom_added_tags_always_test_positive(
        tags in prop::collection::vec("[a-zA-Z0-9 ]{1,16}", 1..10)
    ) {
        let filter = bloom_from_tags(&tags);
        for tag in &tags {
            prop_assert!(filter.test(tag));
        }
        let decoded = TagBloom::decode(&filter.encode()).unwrap();
        for tag in &tags {
            prop_assert!(decoded.test(tag));
        }
    }

    #[test]
    fn prop_announcement_json_round_trip(
        ts in 1i64..i64::MAX / 4,
        ttl in 1u64..u64::MAX / 4,
        nonce in prop::option::of("[a-z0-9]{1,12}"),
    ) {
        let mut a = sample(ts, ttl);
        a.nonce = nonce;
        let back = Announcement::from_json(&a.to_json().unwrap()).unwrap();
        prop_assert_eq!(a, back);
    }
}
