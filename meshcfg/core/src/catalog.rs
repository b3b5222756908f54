use crate::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node: String,
    pub address: String,
    pub datacenter: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    #[default]
    #[serde(rename = "")]
    Typical,
    ConnectProxy,
    MeshGateway,
}

/// A service instance registered on a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeService {
    #[serde(default)]
    pub kind: ServiceKind,
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub namespace: String,
    pub address: String,
    pub port: u16,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Passing,
    Warning,
    Critical,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub service_id: String,
}

/// A health-annotated endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckServiceNode {
    pub node: Node,
    pub service: NodeService,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

/// Identifies a service instance registered with the local agent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct ServiceId {
    pub id: String,
    pub namespace: String,
}

/// A health check definition that the agent exposes through a proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckType {
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub http: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub interval: Duration,
    #[serde(default)]
    pub timeout: Duration,
    #[serde(default)]
    pub proxy_http: String,
}

// === impl CheckServiceNode ===

impl CheckServiceNode {
    /// Returns the worst status among the node's checks. Nodes without checks are passing.
    pub fn aggregate_status(&self) -> HealthStatus {
        self.checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Passing, |worst, s| match (worst, s) {
                (HealthStatus::Critical, _) | (_, HealthStatus::Critical) => HealthStatus::Critical,
                (HealthStatus::Warning, _) | (_, HealthStatus::Warning) => HealthStatus::Warning,
                _ => HealthStatus::Passing,
            })
    }
}

// === impl ServiceId ===

impl ServiceId {
    pub fn new(id: impl ToString, namespace: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// Formats as `id` in the default namespace and `namespace/id` otherwise.
impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() || self.namespace == DEFAULT_NAMESPACE {
            self.id.fmt(f)
        } else {
            write!(f, "{}/{}", self.namespace, self.id)
        }
    }
}

impl std::str::FromStr for ServiceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once('/') {
            Some((ns, id)) => Self::new(id, ns),
            None => Self::new(s, DEFAULT_NAMESPACE),
        })
    }
}
