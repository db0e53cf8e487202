// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Full discovery path over the in-process backend: publish, receive,
//! admit, store, search.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use libp2p::identity::Keypair;
use noisefs::announce::bloom::bloom_from_tags;
use noisefs::announce::publisher::{AnnouncePublisher, PublishError, PublisherConfig};
use noisefs::announce::record::{Announcement, Category, SizeClass};
use noisefs::announce::search::{SearchEngine, SearchQuery};
use noisefs::announce::security::{SecurityConfig, SecurityManager};
use noisefs::announce::signing::sign_announcement;
use noisefs::announce::store::{AnnouncementStore, StoreConfig};
use noisefs::announce::subscriber::{
    AnnounceSubscriber, AnnouncementHandler, SubscriberConfig, SubscriptionState,
};
use noisefs::announce::topics::{hash_topic, TopicHierarchy};
use noisefs::cabs::memory::MemoryCabs;
use noisefs::cabs::Cabs;
use noisefs::monitoring::metrics::Metrics;
use noisefs::tasks::now_unix;

struct Rig {
    publisher: Arc<AnnouncePublisher>,
    subscriber: Arc<AnnounceSubscriber>,
    store: Arc<AnnouncementStore>,
    search: SearchEngine,
    keypair: Keypair,
}

fn rig(data_dir: &Path, security: SecurityConfig) -> Rig {
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let cabs: Arc<dyn Cabs> = Arc::new(MemoryCabs::new());
    let topics = Arc::new(RwLock::new(TopicHierarchy::new()));
    let store = Arc::new(
        AnnouncementStore::open(
            StoreConfig {
                dir: data_dir.join("announcements"),
                ..StoreConfig::default()
            },
            metrics.clone(),
        )
        .expect("store"),
    );
    let security = Arc::new(SecurityManager::new(security, metrics.clone()));
    let publisher = Arc::new(AnnouncePublisher::new(
        cabs.clone(),
        PublisherConfig::default(),
        metrics.clone(),
    ));
    let subscriber = Arc::new(AnnounceSubscriber::new(
        cabs,
        store.clone(),
        security.clone(),
        topics.clone(),
        SubscriberConfig::default(),
        data_dir.to_path_buf(),
        metrics,
    ));
    let search = SearchEngine::new(store.clone(), topics, security);
    Rig {
        publisher,
        subscriber,
        store,
        search,
        keypair: Keypair::generate_ed25519(),
    }
}

fn tagged_announcement(topic: &str, tags: &[&str], ttl: u64, keypair: &Keypair) -> Announcement {
    let mut a = Announcement::new(
        "QmFlowDescriptor",
        &hash_topic(topic),
        Category::Document,
        SizeClass::Small,
        ttl,
        now_unix(),
    );
    a.tag_bloom = Some(bloom_from_tags(tags).encode());
    a.nonce = Some("flow-1".to_string());
    sign_announcement(&mut a, keypair).expect("sign");
    a
}

async fn wait_for_store(store: &AnnouncementStore) {
    for _ in 0..50 {
        if !store.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("announcement never reached the store");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_receive_store_search_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let r = rig(dir.path(), SecurityConfig::default());

    let seen = Arc::new(AtomicUsize::new(0));
    let sink = seen.clone();
    let handler: Arc<dyn AnnouncementHandler> = Arc::new(move |_a: &Announcement| {
        sink.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let topic = "files/docs";
    r.subscriber.subscribe(topic, handler).await.expect("subscribe");
    assert!(r
        .subscriber
        .states()
        .iter()
        .any(|(t, s)| t == topic && *s == SubscriptionState::Active));

    let announcement = tagged_announcement(topic, &["pdf", "science", "2024"], 60, &r.keypair);
    let ts = announcement.timestamp;
    r.publisher.publish(&announcement).await.expect("publish");

    wait_for_store(&r.store).await;
    assert_eq!(r.store.get_by_descriptor("QmFlowDescriptor").len(), 1);
    assert!(!r.store.get_recent(0, 10).is_empty());

    // Handlers fire once per newly stored record.
    for _ in 0..50 {
        if seen.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // Tag search: required tag matches, excluded tag filters out.
    let hits = r.search.search(
        &SearchQuery {
            require_tags: vec!["science".to_string()],
            ..SearchQuery::default()
        },
        ts + 30,
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.announcement.descriptor, "QmFlowDescriptor");

    let excluded = r.search.search(
        &SearchQuery {
            require_tags: vec!["science".to_string()],
            exclude_tags: vec!["pdf".to_string()],
            ..SearchQuery::default()
        },
        ts + 30,
    );
    assert!(excluded.is_empty());

    // Topic-prefix search covers the subscribed node.
    let by_topic = r.search.search(
        &SearchQuery {
            topic_prefix: Some("files/docs".to_string()),
            ..SearchQuery::default()
        },
        ts + 30,
    );
    assert_eq!(by_topic.len(), 1);

    // Past the ttl the record cleans up and queries go quiet.
    let (expired, _) = r.store.cleanup(ts + 120);
    assert_eq!(expired, 1);
    assert!(r.store.get_by_descriptor("QmFlowDescriptor").is_empty());

    r.subscriber.unsubscribe(topic).await.expect("unsubscribe");
    assert!(dir.path().join("subscriptions.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_topic_rate_limit_applies() {
    let dir = tempfile::tempdir().expect("tempdir");
    let r = rig(dir.path(), SecurityConfig::default());

    let a = tagged_announcement("files/docs", &["pdf"], 600, &r.keypair);
    r.publisher.publish(&a).await.expect("first publish");
    let err = r
        .publisher
        .publish(&a)
        .await
        .expect_err("second publish within the window must fail");
    assert!(matches!(err, PublishError::RateLimited));
    assert_eq!(r.publisher.active_topics().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn required_signature_policy_drops_unsigned() {
    let dir = tempfile::tempdir().expect("tempdir");
    let r = rig(
        dir.path(),
        SecurityConfig {
            require_signature: true,
            ..SecurityConfig::default()
        },
    );

    let handler: Arc<dyn AnnouncementHandler> =
        Arc::new(|_a: &Announcement| -> anyhow::Result<()> { Ok(()) });
    r.subscriber
        .subscribe("files/docs", handler)
        .await
        .expect("subscribe");

    // Unsigned record: publisher sends it, the subscriber's security ladder
    // silently drops it.
    let mut unsigned = Announcement::new(
        "QmUnsigned",
        &hash_topic("files/docs"),
        Category::Document,
        SizeClass::Tiny,
        600,
        now_unix(),
    );
    unsigned.nonce = Some("u1".to_string());
    r.publisher.publish(&unsigned).await.expect("publish");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(r.store.is_empty(), "unsigned record must not be stored");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn parent_subscription_covers_descendants() {
    let dir = tempfile::tempdir().expect("tempdir");
    let r = rig(dir.path(), SecurityConfig::default());

    // The child topic is known before subscribing to the parent.
    {
        // Growing the tree through the subscriber API keeps the search and
        // listener views consistent.
        let handler: Arc<dyn AnnouncementHandler> =
            Arc::new(|_a: &Announcement| -> anyhow::Result<()> { Ok(()) });
        r.subscriber
            .subscribe("files/docs/papers", handler.clone())
            .await
            .expect("child subscribe");
        r.subscriber
            .subscribe("files", handler)
            .await
            .expect("parent subscribe");
    }

    let a = tagged_announcement("files/docs/papers", &["pdf"], 600, &r.keypair);
    r.publisher.publish(&a).await.expect("publish");
    wait_for_store(&r.store).await;

    // A search scoped to the parent prefix finds the child's record.
    let hits = r.search.search(
        &SearchQuery {
            topic_prefix: Some("files".to_string()),
            ..SearchQuery::default()
        },
        now_unix(),
    );
    assert_eq!(hits.len(), 1);
}
