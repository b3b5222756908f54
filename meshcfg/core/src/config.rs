use crate::{discovery_chain::MeshGatewayConfig, IntentionAction, DEFAULT_NAMESPACE};
use anyhow::{anyhow, Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Identifies the local agent a proxy is registered with.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub datacenter: String,
    #[serde(default)]
    pub node: String,
}

/// A connect proxy's registration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub destination_service_name: String,
    pub destination_service_id: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// The action applied to traffic that no intention matches.
    #[serde(default = "default_intention_action")]
    pub default_intention_action: IntentionAction,

    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,

    #[serde(default)]
    pub upstreams: Vec<Upstream>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    /// One of `service` (or empty) and `prepared_query`. Validated when the
    /// proxy's watches are initialized.
    #[serde(default)]
    pub destination_type: String,

    #[serde(default)]
    pub destination_namespace: String,

    pub destination_name: String,

    #[serde(default)]
    pub datacenter: String,

    #[serde(default)]
    pub local_bind_port: u16,

    #[serde(default)]
    pub mesh_gateway: MeshGatewayConfig,

    /// Opaque, loosely-typed configuration.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpstreamDestType {
    Service,
    PreparedQuery,
}

/// The subset of an upstream's opaque config that still affects discovery.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReducedUpstreamConfig {
    #[serde(default)]
    pub protocol: String,

    #[serde(default, deserialize_with = "weak_u64")]
    pub connect_timeout_ms: u64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_intention_action() -> IntentionAction {
    IntentionAction::Deny
}

// === impl ProxyConfig ===

impl ProxyConfig {
    pub fn new(service: impl ToString) -> Self {
        let service = service.to_string();
        Self {
            destination_service_id: format!("{service}-sidecar-proxy"),
            destination_service_name: service,
            namespace: default_namespace(),
            default_intention_action: default_intention_action(),
            mesh_gateway: MeshGatewayConfig::default(),
            upstreams: vec![],
        }
    }
}

// === impl Upstream ===

impl Upstream {
    pub fn service(name: impl ToString) -> Self {
        Self {
            destination_name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn prepared_query(name: impl ToString) -> Self {
        Self {
            destination_type: UpstreamDestType::PREPARED_QUERY.to_string(),
            destination_name: name.to_string(),
            ..Default::default()
        }
    }

    /// Returns a string that uniquely identifies this upstream among a proxy's
    /// upstreams: `[prepared_query:][namespace/]name[?dc=datacenter]`.
    pub fn identifier(&self) -> String {
        let mut id = String::new();
        if self.destination_type == UpstreamDestType::PREPARED_QUERY {
            id.push_str(UpstreamDestType::PREPARED_QUERY);
            id.push(':');
        }
        if !self.destination_namespace.is_empty()
            && self.destination_namespace != DEFAULT_NAMESPACE
        {
            id.push_str(&self.destination_namespace);
            id.push('/');
        }
        id.push_str(&self.destination_name);
        if !self.datacenter.is_empty() {
            id.push_str("?dc=");
            id.push_str(&self.datacenter);
        }
        id
    }

    pub fn dest_type(&self) -> Result<UpstreamDestType> {
        self.destination_type.parse()
    }

    pub fn reduced_config(&self) -> Result<ReducedUpstreamConfig, serde_json::Error> {
        ReducedUpstreamConfig::from_opaque(&self.config)
    }
}

// === impl UpstreamDestType ===

impl UpstreamDestType {
    pub const SERVICE: &'static str = "service";
    pub const PREPARED_QUERY: &'static str = "prepared_query";
}

impl std::str::FromStr for UpstreamDestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            // Unset is treated as the default service type.
            "" | Self::SERVICE => Ok(Self::Service),
            Self::PREPARED_QUERY => Ok(Self::PreparedQuery),
            s => Err(anyhow!("unknown upstream type: {:?}", s)),
        }
    }
}

// === impl ReducedUpstreamConfig ===

impl ReducedUpstreamConfig {
    /// Decodes the recognized keys from an opaque config map, ignoring unknown
    /// keys and accepting numbers encoded as strings.
    pub fn from_opaque(
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(config.clone()))
    }

    /// The connect timeout override, if one is configured.
    pub fn connect_timeout(&self) -> Option<Duration> {
        if self.connect_timeout_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(self.connect_timeout_ms))
    }
}

fn weak_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Weak {
        Num(u64),
        Float(f64),
        Str(String),
    }

    match Weak::deserialize(d)? {
        Weak::Num(n) => Ok(n),
        Weak::Float(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as u64),
        Weak::Float(f) => Err(D::Error::custom(format!("invalid integer: {f}"))),
        Weak::Str(s) => s.trim().parse().map_err(D::Error::custom),
    }
}
