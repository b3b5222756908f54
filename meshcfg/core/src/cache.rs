//! The contract between the snapshot assembler and the push-notification substrate
//! that resolves subscription requests into streams of update events.

use crate::{
    ca::{IndexedCaRoots, IssuedCert},
    catalog::{CheckServiceNode, CheckType, ServiceId},
    discovery_chain::{CompiledDiscoveryChain, MeshGatewayConfig},
    intention::IndexedIntentionMatches,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Delivers update events for a subscription.
pub type UpdateTx = mpsc::Sender<UpdateEvent>;

/// Registers subscriptions.
///
/// An implementation delivers zero or more events tagged with `correlation_id` onto
/// `tx` until `scope` is cancelled. When data is already available, the initial
/// state should be delivered promptly after registration. Once `scope` is
/// cancelled no further events for the subscription are sent.
///
/// Registration may fail synchronously, e.g. when the request is invalid.
pub trait Notify: Send + Sync + 'static {
    fn notify(
        &self,
        scope: CancellationToken,
        request: Request,
        correlation_id: String,
        tx: UpdateTx,
    ) -> anyhow::Result<()>;
}

/// Describes the data a subscription is interested in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    CaRoots {
        datacenter: String,
    },

    CaLeaf {
        datacenter: String,
        service: String,
        namespace: String,
    },

    /// Intentions whose destination matches the given service.
    IntentionMatch {
        datacenter: String,
        namespace: String,
        name: String,
    },

    ServiceHttpChecks {
        service_id: ServiceId,
    },

    PreparedQuery {
        datacenter: String,
        query_id_or_name: String,
        max_age: Duration,
    },

    DiscoveryChain {
        datacenter: String,
        name: String,
        evaluate_in_datacenter: String,
        evaluate_in_namespace: String,
        override_mesh_gateway: MeshGatewayConfig,
        override_protocol: Option<String>,
        override_connect_timeout: Option<Duration>,
    },

    /// Healthy connect-capable instances of a service.
    HealthServices {
        datacenter: String,
        service: String,
        namespace: String,
        filter: Option<String>,
    },

    /// Mesh gateway instances in a datacenter.
    MeshGateways {
        datacenter: String,
    },
}

/// A result delivered for a subscription.
#[derive(Debug)]
pub struct UpdateEvent {
    pub correlation_id: String,
    pub result: anyhow::Result<UpdateResult>,
}

/// The payload of a successful update. Its variant is implied by the
/// subscription's request type.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateResult {
    Roots(Arc<IndexedCaRoots>),
    Leaf(Arc<IssuedCert>),
    Intentions(IndexedIntentionMatches),
    PreparedQuery(Vec<CheckServiceNode>),
    DiscoveryChain(Arc<CompiledDiscoveryChain>),
    HealthServices(Vec<CheckServiceNode>),
    MeshGateways(Vec<CheckServiceNode>),
    ServiceChecks(Vec<CheckType>),
}

// === impl UpdateEvent ===

impl UpdateEvent {
    pub fn ok(correlation_id: impl ToString, result: UpdateResult) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            result: Ok(result),
        }
    }

    pub fn err(correlation_id: impl ToString, error: anyhow::Error) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            result: Err(error),
        }
    }
}

// === impl UpdateResult ===

impl UpdateResult {
    /// A short name for the payload's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Roots(_) => "roots",
            Self::Leaf(_) => "leaf",
            Self::Intentions(_) => "intentions",
            Self::PreparedQuery(_) => "prepared-query",
            Self::DiscoveryChain(_) => "discovery-chain",
            Self::HealthServices(_) => "health-services",
            Self::MeshGateways(_) => "mesh-gateways",
            Self::ServiceChecks(_) => "service-checks",
        }
    }
}

// === impl Request ===

impl Request {
    /// A short name for the request's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CaRoots { .. } => "ca-roots",
            Self::CaLeaf { .. } => "ca-leaf",
            Self::IntentionMatch { .. } => "intention-match",
            Self::ServiceHttpChecks { .. } => "service-http-checks",
            Self::PreparedQuery { .. } => "prepared-query",
            Self::DiscoveryChain { .. } => "discovery-chain",
            Self::HealthServices { .. } => "health-services",
            Self::MeshGateways { .. } => "mesh-gateways",
        }
    }
}
