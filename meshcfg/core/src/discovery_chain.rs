use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Determines whether a target's traffic is routed directly or via a mesh gateway.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshGatewayMode {
    /// Inherit the mode from an outer configuration layer.
    #[default]
    #[serde(rename = "")]
    Default,

    /// Connect directly to the target's endpoints.
    None,

    /// Egress through a gateway in the local datacenter.
    Local,

    /// Egress through a gateway in the target's datacenter.
    Remote,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct MeshGatewayConfig {
    #[serde(default)]
    pub mode: MeshGatewayMode,
}

/// The resolved routing graph for an upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledDiscoveryChain {
    pub service_name: String,
    pub namespace: String,
    pub datacenter: String,
    #[serde(default)]
    pub protocol: String,

    /// Targets keyed by target id.
    #[serde(default)]
    pub targets: BTreeMap<String, DiscoveryTarget>,
}

/// A concrete backend a chain resolves to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryTarget {
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub service_subset: String,
    pub namespace: String,
    pub datacenter: String,
    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,
    #[serde(default)]
    pub subset: ServiceResolverSubset,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResolverSubset {
    /// A catalog filter expression selecting the subset's instances.
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub only_passing: bool,
}

// === impl MeshGatewayMode ===

impl fmt::Display for MeshGatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => "".fmt(f),
            Self::None => "none".fmt(f),
            Self::Local => "local".fmt(f),
            Self::Remote => "remote".fmt(f),
        }
    }
}

// === impl MeshGatewayConfig ===

impl MeshGatewayConfig {
    pub fn new(mode: MeshGatewayMode) -> Self {
        Self { mode }
    }

    /// Returns `other` if it sets a mode, otherwise a copy of `self`.
    pub fn overlay_with(&self, other: &Self) -> Self {
        if other.mode != MeshGatewayMode::Default {
            other.clone()
        } else {
            self.clone()
        }
    }
}

// === impl CompiledDiscoveryChain ===

impl CompiledDiscoveryChain {
    pub fn new(
        service_name: impl ToString,
        namespace: impl ToString,
        datacenter: impl ToString,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            namespace: namespace.to_string(),
            datacenter: datacenter.to_string(),
            protocol: "tcp".to_string(),
            targets: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: DiscoveryTarget) -> Self {
        self.targets.insert(target.id.clone(), target);
        self
    }
}

// === impl DiscoveryTarget ===

impl DiscoveryTarget {
    /// Creates a target with an id of the form `[subset.]service.namespace.datacenter`.
    pub fn new(
        service: impl ToString,
        service_subset: impl ToString,
        namespace: impl ToString,
        datacenter: impl ToString,
    ) -> Self {
        let service = service.to_string();
        let service_subset = service_subset.to_string();
        let namespace = namespace.to_string();
        let datacenter = datacenter.to_string();
        let id = if service_subset.is_empty() {
            format!("{service}.{namespace}.{datacenter}")
        } else {
            format!("{service_subset}.{service}.{namespace}.{datacenter}")
        };
        Self {
            id,
            service,
            service_subset,
            namespace,
            datacenter,
            mesh_gateway: MeshGatewayConfig::default(),
            subset: ServiceResolverSubset::default(),
        }
    }

    pub fn with_mesh_gateway(mut self, mode: MeshGatewayMode) -> Self {
        self.mesh_gateway = MeshGatewayConfig::new(mode);
        self
    }
}
