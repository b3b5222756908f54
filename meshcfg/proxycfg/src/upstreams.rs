use crate::{
    snapshot::{UpstreamsSnapshot, WatchHandle},
    watch::CorrelationId,
    Error, State,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use meshcfg_core::{
    cache::Request,
    discovery_chain::{CompiledDiscoveryChain, MeshGatewayMode},
};
use std::sync::Arc;

impl State {
    /// Replaces the watches of `upstream` with those its newly resolved
    /// `chain` requires.
    ///
    /// Every target gets a fresh endpoint watch and every datacenter whose
    /// gateways a target routes through gets a gateway watch. New watches are
    /// registered before any existing one is touched: if a registration
    /// fails, the new watches are cancelled and `upstreams` is left as it was.
    /// Otherwise the previous target watches and their endpoints are dropped,
    /// gateway watches that are no longer needed are dropped, and the chain is
    /// stored.
    ///
    /// A chain equal to the stored one changes nothing.
    pub(crate) fn reconcile_upstream(
        &self,
        upstream: &str,
        chain: Arc<CompiledDiscoveryChain>,
        upstreams: &mut UpstreamsSnapshot,
    ) -> Result<(), Error> {
        if upstreams.discovery_chain.get(upstream) == Some(&chain) {
            tracing::trace!(%upstream, "discovery chain unchanged");
            return Ok(());
        }

        let mut targets = HashMap::with_capacity(chain.targets.len());
        let mut gateway_dcs = HashSet::new();
        for target in chain.targets.values() {
            let correlation_id = CorrelationId::UpstreamTarget {
                target: &target.id,
                upstream,
            };
            let request = Request::HealthServices {
                datacenter: target.datacenter.clone(),
                service: target.service.clone(),
                namespace: target.namespace.clone(),
                filter: Some(target.subset.filter.clone()).filter(|f| !f.is_empty()),
            };
            match self.subscribe(correlation_id.to_string(), request) {
                Ok(handle) => {
                    targets.insert(target.id.clone(), handle);
                }
                Err(error) => {
                    cancel_all(targets.into_iter().map(|(_, h)| h));
                    return Err(error);
                }
            }

            match target.mesh_gateway.mode {
                MeshGatewayMode::Remote => {
                    gateway_dcs.insert(target.datacenter.clone());
                }
                MeshGatewayMode::Local => {
                    gateway_dcs.insert(self.source.datacenter.clone());
                }
                MeshGatewayMode::None | MeshGatewayMode::Default => {}
            }
        }

        let mut gateways = HashMap::new();
        for dc in &gateway_dcs {
            if upstreams.is_watching_gateway(upstream, dc) {
                continue;
            }
            let correlation_id = CorrelationId::MeshGateway {
                datacenter: dc,
                upstream,
            };
            let request = Request::MeshGateways {
                datacenter: dc.clone(),
            };
            match self.subscribe(correlation_id.to_string(), request) {
                Ok(handle) => {
                    gateways.insert(dc.clone(), handle);
                }
                Err(error) => {
                    cancel_all(targets.into_iter().chain(gateways).map(|(_, h)| h));
                    return Err(error);
                }
            }
        }

        // Every registration succeeded; nothing below can fail.

        let previous = upstreams
            .watched_upstreams
            .insert(upstream.to_string(), targets)
            .unwrap_or_default();
        for (target, handle) in previous {
            tracing::trace!(%upstream, %target, "cancelling target watch");
            handle.cancel();
        }
        upstreams
            .watched_upstream_endpoints
            .insert(upstream.to_string(), HashMap::new());

        let watched_gateways = upstreams
            .watched_gateways
            .entry(upstream.to_string())
            .or_default();
        let stale = watched_gateways
            .keys()
            .filter(|dc| !gateway_dcs.contains(*dc))
            .cloned()
            .collect::<Vec<_>>();
        for dc in stale {
            if let Some(handle) = watched_gateways.remove(&dc) {
                tracing::trace!(%upstream, datacenter = %dc, "cancelling gateway watch");
                handle.cancel();
            }
            if let Some(endpoints) = upstreams.watched_gateway_endpoints.get_mut(upstream) {
                endpoints.remove(&dc);
            }
        }
        watched_gateways.extend(gateways);

        tracing::debug!(
            %upstream,
            targets = chain.targets.len(),
            gateways = gateway_dcs.len(),
            "updated discovery chain watches"
        );
        upstreams
            .discovery_chain
            .insert(upstream.to_string(), chain);
        Ok(())
    }
}

pub(crate) fn cancel_all(handles: impl IntoIterator<Item = WatchHandle>) {
    for handle in handles {
        handle.cancel();
    }
}
