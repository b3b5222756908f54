use crate::{http_route::HttpRouteMatch, IdError, IdentityPattern};
use anyhow::{anyhow, Error, Result};
use serde::{Deserialize, Serialize};

/// The action an intention applies to matching traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentionAction {
    Allow,
    Deny,
}

/// A directional authorization rule from a source service to a destination service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Intention {
    #[serde(default)]
    pub id: String,
    pub source_ns: String,
    pub source_name: String,
    pub destination_ns: String,
    pub destination_name: String,
    pub action: IntentionAction,

    /// Higher values are evaluated first.
    pub precedence: i32,

    /// Optional L7 criteria. Empty means the intention applies to all requests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route_matches: Vec<HttpRouteMatch>,
}

/// The response to an intention match query: one list of intentions per
/// queried entry, each sorted by descending precedence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedIntentionMatches {
    pub matches: Vec<Vec<Intention>>,
    #[serde(default)]
    pub index: u64,
}

// === impl IntentionAction ===

impl IntentionAction {
    pub fn invert(self) -> Self {
        match self {
            Self::Allow => Self::Deny,
            Self::Deny => Self::Allow,
        }
    }
}

impl std::str::FromStr for IntentionAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            s => Err(anyhow!("invalid intention action: {:?}", s)),
        }
    }
}

impl std::fmt::Display for IntentionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => "allow".fmt(f),
            Self::Deny => "deny".fmt(f),
        }
    }
}

// === impl Intention ===

impl Intention {
    /// Builds the peer identity pattern selected by this intention's source.
    pub fn source_identity(&self) -> Result<IdentityPattern, IdError> {
        IdentityPattern::for_source(&self.source_ns, &self.source_name)
    }
}
