use crate::ManagerMetrics;
use ahash::AHashMap as HashMap;
use anyhow::{bail, Result};
use futures::prelude::*;
use meshcfg_core::{
    cache::Notify,
    config::{ProxyConfig, Source},
};
use meshcfg_proxycfg::{ConfigSnapshot, SnapshotRx, State};
use parking_lot::RwLock;
use std::{
    collections::hash_map::Entry,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Runs a snapshot assembler for each registered proxy.
///
/// Each proxy's task runs under a child of the manager's scope, so shutting
/// the manager down tears down every proxy's subscriptions. A proxy whose
/// task fails is unregistered.
pub struct Manager {
    source: Source,
    notify: Arc<dyn Notify>,
    scope: CancellationToken,
    proxies: Arc<RwLock<HashMap<String, Proxy>>>,
    generations: AtomicU64,
    metrics: ManagerMetrics,
}

struct Proxy {
    config: ProxyConfig,
    scope: CancellationToken,
    snapshots: SnapshotRx,

    /// Distinguishes a proxy's task from the tasks that replaced it.
    generation: u64,
}

// === impl Manager ===

impl Manager {
    pub fn new(
        source: Source,
        notify: Arc<dyn Notify>,
        scope: CancellationToken,
        metrics: ManagerMetrics,
    ) -> Self {
        Self {
            source,
            notify,
            scope,
            proxies: Default::default(),
            generations: AtomicU64::new(0),
            metrics,
        }
    }

    /// Starts assembling snapshots for a proxy.
    ///
    /// Re-registering a proxy with the same configuration returns the existing
    /// watch; a changed configuration, or a task that has already failed,
    /// restarts the proxy's task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, proxy_id: impl ToString, config: ProxyConfig) -> Result<SnapshotRx> {
        if self.scope.is_cancelled() {
            bail!("manager is shut down");
        }

        let proxy_id = proxy_id.to_string();
        let mut proxies = self.proxies.write();
        match proxies.entry(proxy_id.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let running = current.snapshots.has_changed().is_ok();
                if running && current.config == config {
                    return Ok(current.snapshots.clone());
                }
                if running {
                    tracing::debug!(proxy = %proxy_id, "restarting proxy with new configuration");
                } else {
                    tracing::debug!(proxy = %proxy_id, "restarting failed proxy");
                }
                current.scope.cancel();
                let proxy = self.spawn(proxy_id, config);
                let snapshots = proxy.snapshots.clone();
                entry.insert(proxy);
                Ok(snapshots)
            }
            Entry::Vacant(entry) => {
                let proxy = self.spawn(proxy_id, config);
                let snapshots = proxy.snapshots.clone();
                entry.insert(proxy);
                self.metrics.proxies.inc();
                Ok(snapshots)
            }
        }
    }

    /// Stops assembling snapshots for a proxy and cancels its subscriptions.
    pub fn deregister(&self, proxy_id: &str) -> bool {
        match self.proxies.write().remove(proxy_id) {
            Some(proxy) => {
                proxy.scope.cancel();
                self.metrics.proxies.dec();
                true
            }
            None => false,
        }
    }

    /// Streams a registered proxy's valid snapshots, starting with the current one.
    ///
    /// The stream ends when the proxy is deregistered.
    pub fn watch(&self, proxy_id: &str) -> Option<impl Stream<Item = Arc<ConfigSnapshot>> + Send> {
        let rx = self.proxies.read().get(proxy_id)?.snapshots.clone();
        Some(WatchStream::new(rx).filter_map(future::ready))
    }

    /// Returns the latest valid snapshot of a registered proxy.
    pub fn snapshot(&self, proxy_id: &str) -> Option<Arc<ConfigSnapshot>> {
        self.proxies
            .read()
            .get(proxy_id)
            .and_then(|proxy| proxy.snapshots.borrow().clone())
    }

    /// Cancels every proxy's task. Later registrations fail.
    pub fn shutdown(&self) {
        self.scope.cancel();
        let mut proxies = self.proxies.write();
        tracing::debug!(proxies = proxies.len(), "shutting down");
        proxies.clear();
        self.metrics.proxies.set(0);
    }

    fn spawn(&self, proxy_id: String, config: ProxyConfig) -> Proxy {
        let scope = self.scope.child_token();
        let (state, updates) = State::new(
            &proxy_id,
            self.source.clone(),
            config.clone(),
            self.notify.clone(),
            scope.clone(),
        );
        let (tx, snapshots) = watch::channel(None);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let span = tracing::info_span!("proxy", id = %proxy_id);
        let proxies = self.proxies.clone();
        let gauge = self.metrics.proxies.clone();
        let failures = self.metrics.failures.clone();
        tokio::spawn(
            async move {
                let Err(error) = state.run(updates, tx).await else {
                    return;
                };
                failures.inc();
                tracing::error!(%error, "proxy snapshot task failed");

                let mut proxies = proxies.write();
                if proxies
                    .get(&proxy_id)
                    .is_some_and(|p| p.generation == generation)
                {
                    proxies.remove(&proxy_id);
                    gauge.dec();
                }
            }
            .instrument(span),
        );
        self.metrics.registrations.inc();

        Proxy {
            config,
            scope,
            snapshots,
            generation,
        }
    }
}
