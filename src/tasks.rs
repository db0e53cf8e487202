// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Ownership of long-running background loops.
//!
//! Components that run periodic work (cache maintenance, DHT polling, store
//! cleanup, publisher refresh) own their tasks through a [`TaskGroup`]:
//! started explicitly, stopped through a shared shutdown signal, awaited on
//! shutdown. No detached tasks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Cooperative cancellation flag for in-flight operations.
///
/// Cloning shares the flag. Long operations check [`CancelFlag::is_cancelled`]
/// between units of work and abort without publishing partial results.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A set of background tasks sharing one shutdown signal.
pub struct TaskGroup {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    /// Empty group with a fresh shutdown channel.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Receiver tasks select on to observe shutdown.
    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Track a spawned task handle.
    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Number of tracked tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the group tracks no tasks.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal shutdown and await every task.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for h in self.handles {
            if let Err(e) = h.await {
                if !e.is_cancelled() {
                    warn!(?e, "background task exited abnormally");
                }
            }
        }
    }

    /// Signal shutdown and abort tasks without awaiting completion.
    pub fn abort(self) {
        let _ = self.shutdown_tx.send(true);
        for h in self.handles {
            h.abort();
        }
    }
}
