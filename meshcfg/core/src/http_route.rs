//! L7 match criteria carried by intentions.
//!
//! These are the configured forms; they are validated and translated into
//! matchers when a policy is compiled.

use serde::{Deserialize, Serialize};

/// One L7 match clause. All present criteria must match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,

    /// Matches if the request method is any of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

/// Matches a request header. Exactly one of the match kinds must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatch {
    pub name: String,

    #[serde(default)]
    pub present: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Inverts the result of the match.
    #[serde(default)]
    pub invert: bool,
}

// === impl HttpRouteMatch ===

impl HttpRouteMatch {
    /// Returns true if the match sets no criteria, i.e. it selects every request.
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.headers.is_empty() && self.methods.is_empty()
    }
}

// === impl HeaderMatch ===

impl HeaderMatch {
    pub fn present(name: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            present: true,
            ..Default::default()
        }
    }

    pub fn exact(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            exact: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn inverted(self) -> Self {
        Self {
            invert: true,
            ..self
        }
    }
}
