#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! NoiseFS demo node entrypoint.
//!
//! Wires the full engine (pipeline, adaptive cache, announcements) over the
//! in-process CABS backend. Real deployments attach a network CABS behind
//! the `Cabs` trait; this binary demonstrates the engine end to end inside
//! one process.
//!
//! Subcommands: `demo <file>`, `upload <file>`, `download <cid> <out>`,
//! `announce <descriptor> <topic> <category> <size-class> <ttl> [tags...]`,
//! `subscribe <topic>`, `unsubscribe <topic>`, `stats`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use tracing::info;

use noisefs::announce::bloom::bloom_from_tags;
use noisefs::announce::identity::load_or_create_identity;
use noisefs::announce::publisher::AnnouncePublisher;
use noisefs::announce::record::{Announcement, Category, SizeClass};
use noisefs::announce::search::{SearchEngine, SearchQuery};
use noisefs::announce::security::SecurityManager;
use noisefs::announce::signing::sign_announcement;
use noisefs::announce::store::{AnnouncementStore, StoreConfig};
use noisefs::announce::subscriber::{AnnounceSubscriber, AnnouncementHandler};
use noisefs::announce::topics::{hash_topic, normalize_path, TopicHierarchy};
use noisefs::cabs::adapter::BlockStoreAdapter;
use noisefs::cabs::memory::MemoryCabs;
use noisefs::cabs::Cabs;
use noisefs::cache::{AdaptiveCache, PreloadFn};
use noisefs::config::{self, NodeConfig};
use noisefs::core::pipeline::Pipeline;
use noisefs::monitoring::metrics::Metrics;
use noisefs::tasks::{now_unix, CancelFlag};

struct Node {
    cfg: NodeConfig,
    cache: Arc<AdaptiveCache>,
    pipeline: Pipeline,
    publisher: Arc<AnnouncePublisher>,
    subscriber: Arc<AnnounceSubscriber>,
    store: Arc<AnnouncementStore>,
    search: SearchEngine,
    preload: PreloadFn,
}

fn build_node(cfg: NodeConfig) -> anyhow::Result<Node> {
    let metrics = Arc::new(Metrics::new().map_err(|e| anyhow::anyhow!("metrics: {e}"))?);
    let cabs: Arc<dyn Cabs> = Arc::new(MemoryCabs::new());

    let cache = Arc::new(AdaptiveCache::new(cfg.cache.clone(), metrics.clone()));
    let adapter = Arc::new(BlockStoreAdapter::new(
        cabs.clone(),
        cache.clone(),
        cfg.adapter.clone(),
        metrics.clone(),
    ));
    let pipeline = Pipeline::new(
        adapter.clone(),
        cache.clone(),
        cfg.pipeline.clone(),
        metrics.clone(),
    );

    let hierarchy = if cfg.topics_seed.is_empty() {
        TopicHierarchy::new()
    } else {
        let bytes = std::fs::read(&cfg.topics_seed)?;
        TopicHierarchy::from_seed_json(&bytes).map_err(|e| anyhow::anyhow!("topics seed: {e}"))?
    };
    let topics = Arc::new(RwLock::new(hierarchy));
    let store = Arc::new(AnnouncementStore::open(
        StoreConfig {
            dir: cfg.store_dir(),
            ..cfg.store.clone()
        },
        metrics.clone(),
    )?);
    let security = Arc::new(SecurityManager::new(cfg.security.clone(), metrics.clone()));
    let publisher = Arc::new(AnnouncePublisher::new(
        cabs.clone(),
        cfg.publisher.clone(),
        metrics.clone(),
    ));
    let subscriber = Arc::new(AnnounceSubscriber::new(
        cabs,
        store.clone(),
        security.clone(),
        topics.clone(),
        cfg.subscriber.clone(),
        PathBuf::from(&cfg.data_dir),
        metrics.clone(),
    ));
    let search = SearchEngine::new(store.clone(), topics, security);

    let fetch_adapter = adapter.clone();
    let preload: PreloadFn = Arc::new(move |cid: String| {
        let adapter = fetch_adapter.clone();
        Box::pin(async move { adapter.get_block(&cid).await.ok().map(|b| (*b).clone()) })
    });

    Ok(Node {
        cfg,
        cache,
        pipeline,
        publisher,
        subscriber,
        store,
        search,
        preload,
    })
}

fn print_handler() -> Arc<dyn AnnouncementHandler> {
    Arc::new(|a: &Announcement| -> anyhow::Result<()> {
        println!(
            "announcement: descriptor={} topic_hash={} category={:?}",
            a.descriptor, a.topic_hash, a.category
        );
        Ok(())
    })
}

async fn cmd_upload(node: &Node, path: &str) -> anyhow::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let filename = PathBuf::from(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let cid = node
        .pipeline
        .upload(file, &filename, None, &CancelFlag::new())
        .await
        .map_err(|e| anyhow::anyhow!("upload: {e}"))?;
    Ok(cid)
}

async fn cmd_announce(node: &Node, args: &[String]) -> anyhow::Result<()> {
    let [descriptor, topic, category, size_class, ttl] = &args[..5] else {
        anyhow::bail!("usage: announce <descriptor> <topic> <category> <size-class> <ttl> [tags...]");
    };
    let tags = &args[5..];

    let normalized = normalize_path(topic).map_err(|e| anyhow::anyhow!("topic: {e}"))?;
    let mut announcement = Announcement::new(
        descriptor,
        &hash_topic(&normalized),
        Category::from_str(category).map_err(|e| anyhow::anyhow!("category: {e}"))?,
        SizeClass::from_str(size_class).map_err(|e| anyhow::anyhow!("size class: {e}"))?,
        ttl.parse()?,
        now_unix(),
    );
    if !tags.is_empty() {
        announcement.tag_bloom = Some(bloom_from_tags(tags).encode());
    }
    announcement.nonce = Some(format!("{:x}", now_unix()));

    let (peer_id, keypair) = load_or_create_identity(&node.cfg.data_dir)
        .map_err(|e| anyhow::anyhow!("identity: {e}"))?;
    sign_announcement(&mut announcement, &keypair)
        .map_err(|e| anyhow::anyhow!("sign: {e}"))?;
    info!(peer = %peer_id, topic = %normalized, "announcing");

    node.publisher
        .publish(&announcement)
        .await
        .map_err(|e| anyhow::anyhow!("publish: {e}"))?;
    Ok(())
}

fn cmd_stats(node: &Node) -> anyhow::Result<()> {
    let snapshot = serde_json::json!({
        "build": option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "cache": node.cache.stats(),
        "store": node.store.stats(now_unix()),
        "active_topics": node.publisher.active_topics(),
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Full single-process round trip: upload twice (showing randomizer reuse),
/// announce, subscribe, search, download, verify.
async fn cmd_demo(node: &Node, path: &str) -> anyhow::Result<()> {
    let original = tokio::fs::read(path).await?;
    let cancel = CancelFlag::new();

    let cid = cmd_upload(node, path).await?;
    println!("descriptor: {cid}");

    // Second upload of the same bytes reuses cached randomizers.
    let _ = node
        .pipeline
        .upload_bytes(&original, "copy", None, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!("re-upload: {e}"))?;

    let topic = "demo/files";
    node.subscriber
        .subscribe(topic, print_handler())
        .await
        .map_err(|e| anyhow::anyhow!("subscribe: {e}"))?;

    let announce_args = vec![
        cid.clone(),
        topic.to_string(),
        "data".to_string(),
        format!("{:?}", SizeClass::from_file_size(original.len() as u64)).to_lowercase(),
        "600".to_string(),
        "demo".to_string(),
    ];
    cmd_announce(node, &announce_args).await?;

    // Let the listener tasks drain the pub/sub channel.
    for _ in 0..50 {
        if !node.store.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    let hits = node.search.search(
        &SearchQuery {
            require_tags: vec!["demo".to_string()],
            ..SearchQuery::default()
        },
        now_unix(),
    );
    println!("search hits: {}", hits.len());

    let (bytes, filename) = node
        .pipeline
        .download(&cid, None, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!("download: {e}"))?;
    anyhow::ensure!(bytes == original, "round trip mismatch");
    println!("round trip ok: {filename} ({} bytes)", bytes.len());

    node.subscriber.shutdown().await;
    cmd_stats(node)?;
    Ok(())
}

async fn run(cfg: NodeConfig, args: Vec<String>) -> anyhow::Result<()> {
    let node = build_node(cfg)?;
    let cache_tasks = node.cache.start(Some(node.preload.clone()));
    let store_tasks = node.store.start();
    let publisher_tasks = node.publisher.start();

    let result = match args.first().map(String::as_str) {
        Some("demo") => match args.get(1) {
            Some(path) => cmd_demo(&node, path).await,
            None => Err(anyhow::anyhow!("usage: demo <file>")),
        },
        Some("upload") => match args.get(1) {
            Some(path) => {
                let cid = cmd_upload(&node, path).await?;
                println!("{cid}");
                Ok(())
            }
            None => Err(anyhow::anyhow!("usage: upload <file>")),
        },
        Some("download") => match (args.get(1), args.get(2)) {
            (Some(cid), Some(out)) => {
                let (bytes, _filename) = node
                    .pipeline
                    .download(cid, None, &CancelFlag::new())
                    .await
                    .map_err(|e| anyhow::anyhow!("download: {e}"))?;
                tokio::fs::write(out, bytes).await?;
                Ok(())
            }
            _ => Err(anyhow::anyhow!("usage: download <cid> <out>")),
        },
        Some("announce") if args.len() >= 6 => cmd_announce(&node, &args[1..]).await,
        Some("subscribe") => match args.get(1) {
            Some(topic) => {
                node.subscriber
                    .subscribe(topic, print_handler())
                    .await
                    .map_err(|e| anyhow::anyhow!("subscribe: {e}"))?;
                println!("subscribed to {topic}; ctrl-c to stop");
                let _ = tokio::signal::ctrl_c().await;
                node.subscriber.shutdown().await;
                Ok(())
            }
            None => Err(anyhow::anyhow!("usage: subscribe <topic>")),
        },
        Some("unsubscribe") => match args.get(1) {
            Some(topic) => node
                .subscriber
                .unsubscribe(topic)
                .await
                .map_err(|e| anyhow::anyhow!("unsubscribe: {e}")),
            None => Err(anyhow::anyhow!("usage: unsubscribe <topic>")),
        },
        Some("stats") => cmd_stats(&node),
        _ => Err(anyhow::anyhow!(
            "usage: noisefs <demo|upload|download|announce|subscribe|unsubscribe|stats> ..."
        )),
    };

    publisher_tasks.shutdown().await;
    store_tasks.shutdown().await;
    cache_tasks.shutdown().await;
    result
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(cfg, args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
