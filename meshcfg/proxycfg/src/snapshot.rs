use ahash::AHashMap as HashMap;
use meshcfg_core::{
    ca::{IndexedCaRoots, IssuedCert},
    catalog::{CheckServiceNode, CheckType, ServiceId},
    config::{ProxyConfig, Source},
    discovery_chain::CompiledDiscoveryChain,
    Intention, IntentionAction,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything currently known about a connect proxy's dependencies.
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    pub proxy_id: String,
    pub service: String,
    pub namespace: String,
    pub datacenter: String,

    pub roots: Option<Arc<IndexedCaRoots>>,
    pub leaf: Option<Arc<IssuedCert>>,

    /// Intentions whose destination is the proxy's service, by descending precedence.
    pub intentions: Vec<Intention>,

    /// Set once the first intentions update has been applied. Until then an
    /// empty `intentions` list means "unknown" rather than "none".
    pub intentions_set: bool,

    pub default_intention_action: IntentionAction,

    pub upstreams: UpstreamsSnapshot,
}

/// Upstream state, keyed by upstream identifier.
#[derive(Clone, Debug, Default)]
pub struct UpstreamsSnapshot {
    pub discovery_chain: HashMap<String, Arc<CompiledDiscoveryChain>>,

    /// Live endpoint watches for each upstream's chain targets, keyed by target id.
    pub watched_upstreams: HashMap<String, HashMap<String, WatchHandle>>,
    pub watched_upstream_endpoints: HashMap<String, HashMap<String, Vec<CheckServiceNode>>>,

    /// Live mesh gateway watches for each upstream, keyed by datacenter.
    pub watched_gateways: HashMap<String, HashMap<String, WatchHandle>>,
    pub watched_gateway_endpoints: HashMap<String, HashMap<String, Vec<CheckServiceNode>>>,

    pub watched_service_checks: HashMap<ServiceId, Vec<CheckType>>,
    pub prepared_query_endpoints: HashMap<String, Vec<CheckServiceNode>>,
}

/// Cancels a subscription.
#[derive(Clone, Debug)]
pub struct WatchHandle(CancellationToken);

// === impl ConfigSnapshot ===

impl ConfigSnapshot {
    pub(crate) fn new(proxy_id: impl ToString, source: &Source, config: &ProxyConfig) -> Self {
        Self {
            proxy_id: proxy_id.to_string(),
            service: config.destination_service_name.clone(),
            namespace: config.namespace.clone(),
            datacenter: source.datacenter.clone(),
            roots: None,
            leaf: None,
            intentions: Vec::new(),
            intentions_set: false,
            default_intention_action: config.default_intention_action,
            upstreams: UpstreamsSnapshot::default(),
        }
    }

    /// Returns true once the snapshot holds enough to configure a proxy.
    pub fn is_valid(&self) -> bool {
        self.roots.is_some() && self.leaf.is_some() && self.intentions_set
    }
}

// === impl UpstreamsSnapshot ===

impl UpstreamsSnapshot {
    /// Returns true if `target` of `upstream` has a live endpoint watch.
    pub fn is_watching_target(&self, upstream: &str, target: &str) -> bool {
        self.watched_upstreams
            .get(upstream)
            .map(|targets| targets.contains_key(target))
            .unwrap_or(false)
    }

    /// Returns true if `upstream` has a live gateway watch in `datacenter`.
    pub fn is_watching_gateway(&self, upstream: &str, datacenter: &str) -> bool {
        self.watched_gateways
            .get(upstream)
            .map(|dcs| dcs.contains_key(datacenter))
            .unwrap_or(false)
    }
}

// === impl WatchHandle ===

impl WatchHandle {
    pub(crate) fn new(scope: CancellationToken) -> Self {
        Self(scope)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Idempotent.
    pub(crate) fn cancel(&self) {
        self.0.cancel()
    }
}
