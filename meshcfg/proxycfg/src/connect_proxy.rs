use crate::{upstreams::cancel_all, watch::CorrelationId, ConfigSnapshot, Error, State};
use meshcfg_core::{
    cache::{Request, UpdateEvent, UpdateResult},
    catalog::ServiceId,
    config::{ReducedUpstreamConfig, Upstream, UpstreamDestType},
};
use std::time::Duration;

/// How stale a prepared query's cached result may be.
const PREPARED_QUERY_MAX_AGE: Duration = Duration::from_secs(10);

impl State {
    /// Registers the proxy's baseline and per-upstream subscriptions and
    /// returns an empty snapshot.
    ///
    /// Fails without registering anything if an upstream has an unknown
    /// destination type. If the substrate refuses any registration, the ones
    /// already made are cancelled.
    pub fn initialize(&self) -> Result<ConfigSnapshot, Error> {
        let upstreams = self
            .config
            .upstreams
            .iter()
            .map(|u| -> anyhow::Result<_> { Ok((u, u.dest_type()?)) })
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(Error::Config)?;

        let dc = &self.source.datacenter;
        let service_id = ServiceId::new(
            &self.config.destination_service_id,
            &self.config.namespace,
        );
        let mut watches = vec![
            (
                CorrelationId::Roots.to_string(),
                Request::CaRoots {
                    datacenter: dc.clone(),
                },
            ),
            (
                CorrelationId::Leaf.to_string(),
                Request::CaLeaf {
                    datacenter: dc.clone(),
                    service: self.config.destination_service_name.clone(),
                    namespace: self.config.namespace.clone(),
                },
            ),
            (
                CorrelationId::Intentions.to_string(),
                Request::IntentionMatch {
                    datacenter: dc.clone(),
                    namespace: self.config.namespace.clone(),
                    name: self.config.destination_service_name.clone(),
                },
            ),
            (
                CorrelationId::ServiceChecks {
                    service_id: &service_id.to_string(),
                }
                .to_string(),
                Request::ServiceHttpChecks { service_id },
            ),
        ];

        for (upstream, dest_type) in upstreams {
            let id = upstream.identifier();
            let watch = match dest_type {
                UpstreamDestType::PreparedQuery => (
                    CorrelationId::PreparedQuery { upstream: &id }.to_string(),
                    Request::PreparedQuery {
                        datacenter: self.upstream_datacenter(upstream).to_string(),
                        query_id_or_name: upstream.destination_name.clone(),
                        max_age: PREPARED_QUERY_MAX_AGE,
                    },
                ),
                UpstreamDestType::Service => (
                    CorrelationId::DiscoveryChain { upstream: &id }.to_string(),
                    self.discovery_chain_request(&id, upstream),
                ),
            };
            watches.push(watch);
        }

        // Either every watch is registered or none are left running.
        let mut handles = Vec::with_capacity(watches.len());
        for (correlation_id, request) in watches {
            match self.subscribe(correlation_id, request) {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    cancel_all(handles);
                    return Err(error);
                }
            }
        }

        Ok(ConfigSnapshot::new(&self.proxy_id, &self.source, &self.config))
    }

    /// Applies a single update to `snapshot`.
    ///
    /// Events that fail leave the snapshot unchanged. Events for watches that
    /// have since been torn down are skipped.
    pub fn handle_update(
        &self,
        event: UpdateEvent,
        snapshot: &mut ConfigSnapshot,
    ) -> Result<(), Error> {
        let UpdateEvent {
            correlation_id,
            result,
        } = event;
        let result = match result {
            Ok(result) => result,
            Err(source) => {
                return Err(Error::Upstream {
                    correlation_id,
                    source,
                })
            }
        };

        let mismatch = |expected: &'static str, actual: &UpdateResult| Error::TypeMismatch {
            correlation_id: correlation_id.clone(),
            expected,
            actual: actual.kind(),
        };

        match CorrelationId::parse(&correlation_id)? {
            CorrelationId::Roots => match result {
                UpdateResult::Roots(roots) => snapshot.roots = Some(roots),
                other => return Err(mismatch("roots", &other)),
            },

            CorrelationId::Leaf => match result {
                UpdateResult::Leaf(leaf) => snapshot.leaf = Some(leaf),
                other => return Err(mismatch("leaf", &other)),
            },

            CorrelationId::Intentions => match result {
                UpdateResult::Intentions(resp) => {
                    // Only one entry is queried: the proxy's destination.
                    snapshot.intentions = resp.matches.into_iter().next().unwrap_or_default();
                    snapshot.intentions_set = true;
                }
                other => return Err(mismatch("intentions", &other)),
            },

            CorrelationId::PreparedQuery { upstream } => match result {
                UpdateResult::PreparedQuery(nodes) => {
                    if !self.upstreams.contains_key(upstream) {
                        tracing::debug!(%upstream, "skipping update for unknown upstream");
                        return Ok(());
                    }
                    snapshot
                        .upstreams
                        .prepared_query_endpoints
                        .insert(upstream.to_string(), nodes);
                }
                other => return Err(mismatch("prepared-query", &other)),
            },

            CorrelationId::DiscoveryChain { upstream } => match result {
                UpdateResult::DiscoveryChain(chain) => {
                    if !self.upstreams.contains_key(upstream) {
                        tracing::debug!(%upstream, "skipping update for unknown upstream");
                        return Ok(());
                    }
                    self.reconcile_upstream(upstream, chain, &mut snapshot.upstreams)?;
                }
                other => return Err(mismatch("discovery-chain", &other)),
            },

            CorrelationId::UpstreamTarget { target, upstream } => match result {
                UpdateResult::HealthServices(nodes) => {
                    if !snapshot.upstreams.is_watching_target(upstream, target) {
                        tracing::debug!(%upstream, %target, "skipping update for stale target");
                        return Ok(());
                    }
                    snapshot
                        .upstreams
                        .watched_upstream_endpoints
                        .entry(upstream.to_string())
                        .or_default()
                        .insert(target.to_string(), nodes);
                }
                other => return Err(mismatch("health-services", &other)),
            },

            CorrelationId::MeshGateway {
                datacenter,
                upstream,
            } => match result {
                UpdateResult::MeshGateways(nodes) => {
                    if !snapshot.upstreams.is_watching_gateway(upstream, datacenter) {
                        tracing::debug!(%upstream, %datacenter, "skipping update for stale gateway");
                        return Ok(());
                    }
                    snapshot
                        .upstreams
                        .watched_gateway_endpoints
                        .entry(upstream.to_string())
                        .or_default()
                        .insert(datacenter.to_string(), nodes);
                }
                other => return Err(mismatch("mesh-gateways", &other)),
            },

            CorrelationId::ServiceChecks { service_id } => match result {
                UpdateResult::ServiceChecks(checks) => {
                    let service_id = match service_id.parse::<ServiceId>() {
                        Ok(id) => id,
                        Err(never) => match never {},
                    };
                    snapshot
                        .upstreams
                        .watched_service_checks
                        .insert(service_id, checks);
                }
                other => return Err(mismatch("service-checks", &other)),
            },
        }

        Ok(())
    }

    fn upstream_datacenter<'u>(&'u self, upstream: &'u Upstream) -> &'u str {
        if upstream.datacenter.is_empty() {
            &self.source.datacenter
        } else {
            &upstream.datacenter
        }
    }

    fn discovery_chain_request(&self, id: &str, upstream: &Upstream) -> Request {
        let cfg = upstream.reduced_config().unwrap_or_else(|error| {
            tracing::warn!(%error, upstream = %id, "ignoring invalid upstream config");
            ReducedUpstreamConfig::default()
        });
        let namespace = if upstream.destination_namespace.is_empty() {
            self.config.namespace.clone()
        } else {
            upstream.destination_namespace.clone()
        };

        Request::DiscoveryChain {
            datacenter: self.source.datacenter.clone(),
            name: upstream.destination_name.clone(),
            evaluate_in_datacenter: self.upstream_datacenter(upstream).to_string(),
            evaluate_in_namespace: namespace,
            override_mesh_gateway: self.config.mesh_gateway.overlay_with(&upstream.mesh_gateway),
            override_connect_timeout: cfg.connect_timeout(),
            override_protocol: Some(cfg.protocol).filter(|p| !p.is_empty()),
        }
    }
}
