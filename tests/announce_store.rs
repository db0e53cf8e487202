// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use std::fs;
use std::sync::Arc;

use noisefs::announce::record::{Announcement, Category, SizeClass};
use noisefs::announce::store::{
    record_id, sanitize_component, AnnouncementStore, StoreConfig, StoreError,
};
use noisefs::announce::topics::hash_topic;
use noisefs::monitoring::metrics::Metrics;
use proptest::prelude::*;

fn open_store(dir: &std::path::Path) -> AnnouncementStore {
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    AnnouncementStore::open(
        StoreConfig {
            dir: dir.to_path_buf(),
            ..StoreConfig::default()
        },
        metrics,
    )
    .expect("open store")
}

fn record(descriptor: &str, nonce: Option<&str>, ts: i64, ttl: u64) -> Announcement {
    let mut a = Announcement::new(
        descriptor,
        &hash_topic("files/docs"),
        Category::Document,
        SizeClass::Tiny,
        ttl,
        ts,
    );
    a.nonce = nonce.map(str::to_string);
    a
}

#[test]
fn add_and_query_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());

    let a = record("QmAlpha", Some("n1"), 1_000, 600);
    assert!(store.add(a.clone(), "peer-1").expect("add"));

    let id = record_id("QmAlpha", Some("n1")).expect("id");
    assert!(store.get_by_id(&id).is_some());
    assert_eq!(store.get_by_topic(&a.topic_hash).len(), 1);
    assert_eq!(store.get_by_descriptor("QmAlpha").len(), 1);
    assert_eq!(store.get_recent(0, 10).len(), 1);
    assert_eq!(store.get_all().len(), 1);
    assert_eq!(store.stats(1_100).total, 1);
}

#[test]
fn re_add_is_idempotent_on_disk_and_in_memory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());

    let a = record("QmAlpha", Some("n1"), 1_000, 600);
    assert!(store.add(a.clone(), "peer-1").expect("first add"));
    assert!(!store.add(a, "peer-2").expect("second add is a no-op"));

    assert_eq!(store.len(), 1);
    let files: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .flatten()
        .collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn differing_nonces_coexist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());

    assert!(store.add(record("QmAlpha", Some("n1"), 1_000, 600), "p").expect("n1"));
    assert!(store.add(record("QmAlpha", Some("n2"), 1_000, 600), "p").expect("n2"));
    assert_eq!(store.get_by_descriptor("QmAlpha").len(), 2);
}

#[test]
fn traversal_descriptor_rejected_without_creating_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());

    let a = record("../../etc/passwd", Some("n1"), 1_000, 600);
    let err = store.add(a, "peer-1").expect_err("traversal must fail");
    assert!(matches!(err, StoreError::UnsafeName));

    assert_eq!(store.len(), 0);
    let files: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .flatten()
        .collect();
    assert!(files.is_empty(), "no file may be created on rejection");
}

#[test]
fn cleanup_removes_expired_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(dir.path());

    let ts = 1_000;
    store.add(record("QmShort", Some("n1"), ts, 60), "p").expect("add");

    // Still fresh halfway through the ttl.
    assert_eq!(store.cleanup(ts + 30), (0, 0));
    assert_eq!(store.get_by_descriptor("QmShort").len(), 1);

    // Gone after expiry.
    let (expired, _) = store.cleanup(ts + 120);
    assert_eq!(expired, 1);
    assert!(store.get_by_descriptor("QmShort").is_empty());
    let files: Vec<_> = fs::read_dir(dir.path())
        .expect("read dir")
        .flatten()
        .collect();
    assert!(files.is_empty());
}

#[test]
fn cleanup_trims_oldest_past_max_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let store = AnnouncementStore::open(
        StoreConfig {
            dir: dir.path().to_path_buf(),
            max_records: 2,
            ..StoreConfig::default()
        },
        metrics,
    )
    .expect("open");

    for i in 0..4 {
        store
            .add(record(&format!("QmTrim{i}"), Some("n"), 1_000, 86_400), "p")
            .expect("add");
    }
    let (_, trimmed) = store.cleanup(1_100);
    assert_eq!(trimmed, 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = open_store(dir.path());
        store.add(record("QmDurable", Some("n1"), 1_000, 600), "p").expect("add");
    }
    let store = open_store(dir.path());
    assert_eq!(store.len(), 1);
    assert_eq!(store.get_by_descriptor("QmDurable").len(), 1);
}

#[test]
fn sanitize_rejects_and_maps() {
    assert!(matches!(sanitize_component(""), Err(StoreError::UnsafeName)));
    assert!(matches!(sanitize_component("a/b"), Err(StoreError::UnsafeName)));
    assert!(matches!(sanitize_component("a\\b"), Err(StoreError::UnsafeName)));
    assert!(matches!(sanitize_component("a..b"), Err(StoreError::UnsafeName)));
    assert!(matches!(sanitize_component("a\0b"), Err(StoreError::UnsafeName)));

    assert_eq!(sanitize_component("Qm-Alpha_9").expect("ok"), "Qm-Alpha_9");
    assert_eq!(sanitize_component("a.b:c").expect("ok"), "a_b_c");
    assert_eq!(sanitize_component(&"x".repeat(80)).expect("ok").len(), 50);
}

proptest! {
    #[test]
    fn prop_sanitized_names_are_always_safe(raw in "\\PC{1,80}") {
        match sanitize_component(&raw) {
            Ok(name) => {
                prop_assert!(!name.is_empty());
                prop_assert!(name.len() <= 50);
                prop_assert!(name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            }
            Err(StoreError::UnsafeName) => {}
            Err(e) => prop_assert!(false, "unexpected error {e:?}"),
        }
    }

    #[test]
    fn prop_record_ids_never_traverse(
        d in "\\PC{1,60}",
        n in prop::option::of("\\PC{1,20}"),
    ) {
        if let Ok(id) = record_id(&d, n.as_deref()) {
            prop_assert!(!id.contains('/'));
            prop_assert!(!id.contains('\\'));
            prop_assert!(!id.contains(".."));
            prop_assert!(!id.contains('\0'));
        }
    }
}
