use crate::{snapshot::WatchHandle, ConfigSnapshot, Error};
use ahash::AHashMap as HashMap;
use meshcfg_core::{
    cache::{Notify, Request, UpdateEvent, UpdateTx},
    config::{ProxyConfig, Source, Upstream},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Bounds the number of undelivered updates across all of a proxy's subscriptions.
const UPDATE_BUFFER_CAPACITY: usize = 256;

/// Publishes a proxy's snapshots. `None` until the first valid snapshot is assembled.
pub type SnapshotTx = watch::Sender<Option<Arc<ConfigSnapshot>>>;
pub type SnapshotRx = watch::Receiver<Option<Arc<ConfigSnapshot>>>;

/// Assembles the configuration snapshot of a single connect proxy.
///
/// All of the proxy's subscriptions deliver onto one queue, which is drained
/// by a single task, so the snapshot is never mutated concurrently. Every
/// subscription is registered under a child of `scope`: cancelling it tears
/// down all of the proxy's watches.
pub struct State {
    pub(crate) proxy_id: String,
    pub(crate) source: Source,
    pub(crate) config: ProxyConfig,

    /// The proxy's upstreams, by identifier.
    pub(crate) upstreams: HashMap<String, Upstream>,

    notify: Arc<dyn Notify>,
    scope: CancellationToken,
    tx: UpdateTx,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Uninitialized,

    /// Subscriptions are registered but the snapshot is not yet valid.
    Initializing,

    /// A valid snapshot has been published.
    Steady,
}

// === impl State ===

impl State {
    pub fn new(
        proxy_id: impl ToString,
        source: Source,
        config: ProxyConfig,
        notify: Arc<dyn Notify>,
        scope: CancellationToken,
    ) -> (Self, mpsc::Receiver<UpdateEvent>) {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER_CAPACITY);
        let upstreams = config
            .upstreams
            .iter()
            .map(|u| (u.identifier(), u.clone()))
            .collect();
        let state = Self {
            proxy_id: proxy_id.to_string(),
            source,
            config,
            upstreams,
            notify,
            scope,
            tx,
        };
        (state, rx)
    }

    pub fn proxy_id(&self) -> &str {
        &self.proxy_id
    }

    /// Registers a subscription under a new child of the proxy's scope.
    ///
    /// If the substrate refuses the registration, the child scope is cancelled
    /// before the error is returned.
    pub(crate) fn subscribe(
        &self,
        correlation_id: String,
        request: Request,
    ) -> Result<WatchHandle, Error> {
        tracing::trace!(%correlation_id, request = request.kind(), "subscribing");
        let scope = self.scope.child_token();
        match self
            .notify
            .notify(scope.clone(), request, correlation_id.clone(), self.tx.clone())
        {
            Ok(()) => Ok(WatchHandle::new(scope)),
            Err(source) => {
                scope.cancel();
                Err(Error::Subscription {
                    correlation_id,
                    source,
                })
            }
        }
    }

    /// Initializes the proxy's watches and folds updates into its snapshot
    /// until the proxy's scope is cancelled.
    ///
    /// Valid snapshots are published on `snapshots` after every applied
    /// update. Updates that fail are logged and skipped, leaving the last
    /// good snapshot in place. The task fails on initialization errors and
    /// on protocol violations. Otherwise it runs until the proxy's scope is
    /// cancelled. However the task ends, all of the proxy's subscriptions are
    /// cancelled.
    pub async fn run(
        self,
        mut updates: mpsc::Receiver<UpdateEvent>,
        snapshots: SnapshotTx,
    ) -> Result<(), Error> {
        let _cancel = self.scope.clone().drop_guard();

        let mut phase = Phase::Uninitialized;
        tracing::debug!(?phase, upstreams = self.upstreams.len(), "starting");
        let mut snapshot = self.initialize()?;
        phase = Phase::Initializing;

        // `self` holds a sender for re-derived watches, so the queue never
        // closes while the loop runs. Only cancellation ends it.
        loop {
            let event = tokio::select! {
                biased;
                _ = self.scope.cancelled() => {
                    tracing::debug!(?phase, "cancelled");
                    return Ok(());
                }
                Some(event) = updates.recv() => event,
            };

            let correlation_id = event.correlation_id.clone();
            if let Err(error) = self.handle_update(event, &mut snapshot) {
                if error.is_fatal() {
                    return Err(error);
                }
                tracing::error!(%error, %correlation_id, "failed to handle update");
                continue;
            }

            if !snapshot.is_valid() {
                continue;
            }
            if phase == Phase::Initializing {
                tracing::debug!("snapshot ready");
                phase = Phase::Steady;
            }
            snapshots.send_replace(Some(Arc::new(snapshot.clone())));
        }
    }
}
