//! Correlation ids tag every subscription's events so that the assembler can
//! route them back to the snapshot field they update.

use crate::Error;
use std::fmt;

const ROOTS: &str = "roots";
const LEAF: &str = "leaf";
const INTENTIONS: &str = "intentions";
const PREPARED_QUERY_PREFIX: &str = "upstream:";
const DISCOVERY_CHAIN_PREFIX: &str = "discovery-chain:";
const UPSTREAM_TARGET_PREFIX: &str = "upstream-target:";
const MESH_GATEWAY_PREFIX: &str = "mesh-gateway:";
const SERVICE_CHECKS_PREFIX: &str = "svc-checks:";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CorrelationId<'a> {
    Roots,
    Leaf,
    Intentions,

    /// Endpoints of a prepared-query upstream.
    PreparedQuery { upstream: &'a str },

    DiscoveryChain { upstream: &'a str },

    /// Endpoints of one of an upstream's discovery-chain targets.
    UpstreamTarget { target: &'a str, upstream: &'a str },

    /// Mesh gateways in a datacenter that an upstream's targets route through.
    MeshGateway { datacenter: &'a str, upstream: &'a str },

    ServiceChecks { service_id: &'a str },
}

// === impl CorrelationId ===

impl<'a> CorrelationId<'a> {
    pub fn parse(s: &'a str) -> Result<Self, Error> {
        let unroutable = || Error::UnroutableEvent(s.to_string());

        match s {
            ROOTS => return Ok(Self::Roots),
            LEAF => return Ok(Self::Leaf),
            INTENTIONS => return Ok(Self::Intentions),
            _ => {}
        }

        if let Some(upstream) = s.strip_prefix(PREPARED_QUERY_PREFIX) {
            return non_empty(upstream)
                .map(|upstream| Self::PreparedQuery { upstream })
                .ok_or_else(unroutable);
        }
        if let Some(upstream) = s.strip_prefix(DISCOVERY_CHAIN_PREFIX) {
            return non_empty(upstream)
                .map(|upstream| Self::DiscoveryChain { upstream })
                .ok_or_else(unroutable);
        }
        if let Some(rest) = s.strip_prefix(UPSTREAM_TARGET_PREFIX) {
            // Target ids never contain colons, so the first one separates the
            // target from the upstream.
            return split_pair(rest)
                .map(|(target, upstream)| Self::UpstreamTarget { target, upstream })
                .ok_or_else(unroutable);
        }
        if let Some(rest) = s.strip_prefix(MESH_GATEWAY_PREFIX) {
            return split_pair(rest)
                .map(|(datacenter, upstream)| Self::MeshGateway {
                    datacenter,
                    upstream,
                })
                .ok_or_else(unroutable);
        }
        if let Some(service_id) = s.strip_prefix(SERVICE_CHECKS_PREFIX) {
            return non_empty(service_id)
                .map(|service_id| Self::ServiceChecks { service_id })
                .ok_or_else(unroutable);
        }

        Err(unroutable())
    }
}

impl fmt::Display for CorrelationId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roots => ROOTS.fmt(f),
            Self::Leaf => LEAF.fmt(f),
            Self::Intentions => INTENTIONS.fmt(f),
            Self::PreparedQuery { upstream } => write!(f, "{PREPARED_QUERY_PREFIX}{upstream}"),
            Self::DiscoveryChain { upstream } => write!(f, "{DISCOVERY_CHAIN_PREFIX}{upstream}"),
            Self::UpstreamTarget { target, upstream } => {
                write!(f, "{UPSTREAM_TARGET_PREFIX}{target}:{upstream}")
            }
            Self::MeshGateway {
                datacenter,
                upstream,
            } => write!(f, "{MESH_GATEWAY_PREFIX}{datacenter}:{upstream}"),
            Self::ServiceChecks { service_id } => write!(f, "{SERVICE_CHECKS_PREFIX}{service_id}"),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn split_pair(s: &str) -> Option<(&str, &str)> {
    let (a, b) = s.split_once(':')?;
    Some((non_empty(a)?, non_empty(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CorrelationId::Roots)]
    #[case(CorrelationId::Leaf)]
    #[case(CorrelationId::Intentions)]
    #[case(CorrelationId::PreparedQuery { upstream: "prepared_query:geo-db" })]
    #[case(CorrelationId::DiscoveryChain { upstream: "db?dc=dc2" })]
    #[case(CorrelationId::UpstreamTarget { target: "v2.db.default.dc1", upstream: "team-a/db" })]
    #[case(CorrelationId::MeshGateway { datacenter: "dc2", upstream: "db" })]
    #[case(CorrelationId::ServiceChecks { service_id: "web-sidecar-proxy" })]
    fn parses_rendered_ids(#[case] id: CorrelationId<'static>) {
        let rendered = id.to_string();
        assert_eq!(CorrelationId::parse(&rendered).unwrap(), id);
    }

    #[test]
    fn rendered_forms() {
        assert_eq!(
            CorrelationId::UpstreamTarget {
                target: "db.default.dc1",
                upstream: "db"
            }
            .to_string(),
            "upstream-target:db.default.dc1:db"
        );
        assert_eq!(
            CorrelationId::MeshGateway {
                datacenter: "dc2",
                upstream: "db"
            }
            .to_string(),
            "mesh-gateway:dc2:db"
        );
    }

    #[rstest]
    #[case("")]
    #[case("root")]
    #[case("roots:")]
    #[case("upstream:")]
    #[case("discovery-chain:")]
    #[case("upstream-target:db.default.dc1")]
    #[case("upstream-target::db")]
    #[case("upstream-target:db.default.dc1:")]
    #[case("mesh-gateway:dc2")]
    #[case("svc-checks:")]
    #[case("bogus:db")]
    fn rejects_unroutable_ids(#[case] id: &str) {
        assert!(matches!(
            CorrelationId::parse(id),
            Err(Error::UnroutableEvent(s)) if s == id
        ));
    }
}
