use crate::WILDCARD;
use std::fmt;

const SCHEME_PREFIX: &str = "spiffe://";
const ANY_SEGMENT_REGEX: &str = "[^/]+";
const VALID_SEGMENT_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._";

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum IdError {
    #[error("identity segment must not be empty")]
    EmptySegment,

    /// A segment can only contain chars in a limited char set.
    #[error(
        "identity segment {0:?} is limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadSegmentChar(String),

    /// Only `ns/name`, `ns/*` and `*/*` sources can be expressed.
    #[error("a wildcard namespace requires a wildcard name: {namespace}/{name}")]
    UnsupportedWildcard { namespace: String, name: String },
}

/// One positional segment of a peer identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Any,
    Exact(String),
}

/// Matches a connection's peer identity URI, which has the form
/// `spiffe://<trust-domain>/ns/<namespace>/dc/<datacenter>/svc/<service>`.
///
/// The trust domain and datacenter always match any value; the namespace and
/// service segments are either literal or any.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentityPattern {
    namespace: Segment,
    name: Segment,
}

// === impl Segment ===

impl Segment {
    fn parse(s: &str) -> Result<Self, IdError> {
        if s == WILDCARD {
            return Ok(Self::Any);
        }
        if s.is_empty() {
            return Err(IdError::EmptySegment);
        }
        if s.chars().any(|c| !VALID_SEGMENT_CHARS.contains(c)) {
            return Err(IdError::BadSegmentChar(s.to_string()));
        }
        Ok(Self::Exact(s.to_string()))
    }

    fn matches(&self, s: &str) -> bool {
        match self {
            Self::Any => !s.is_empty(),
            Self::Exact(v) => v == s,
        }
    }

    fn regex(&self) -> String {
        match self {
            Self::Any => ANY_SEGMENT_REGEX.to_string(),
            Self::Exact(v) => regex::escape(v),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => WILDCARD.fmt(f),
            Self::Exact(v) => v.fmt(f),
        }
    }
}

// === impl IdentityPattern ===

impl IdentityPattern {
    /// Builds the pattern for an intention's source namespace and name.
    pub fn for_source(namespace: &str, name: &str) -> Result<Self, IdError> {
        let namespace = Segment::parse(namespace)?;
        let name = Segment::parse(name)?;
        if namespace == Segment::Any && name != Segment::Any {
            return Err(IdError::UnsupportedWildcard {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &Segment {
        &self.namespace
    }

    pub fn name(&self) -> &Segment {
        &self.name
    }

    /// Returns true if `uri` is a well-formed service identity selected by this pattern.
    pub fn matches(&self, uri: &str) -> bool {
        let Some(rest) = uri.strip_prefix(SCHEME_PREFIX) else {
            return false;
        };
        let parts = rest.split('/').collect::<Vec<_>>();
        match parts.as_slice() {
            [trust_domain, "ns", ns, "dc", dc, "svc", svc] => {
                !trust_domain.is_empty()
                    && !dc.is_empty()
                    && self.namespace.matches(ns)
                    && self.name.matches(svc)
            }
            _ => false,
        }
    }

    /// Renders the anchored regular expression a data-plane string matcher
    /// evaluates against the peer URI SAN.
    pub fn regex(&self) -> String {
        format!(
            "^spiffe://{any}/ns/{ns}/dc/{any}/svc/{name}$",
            any = ANY_SEGMENT_REGEX,
            ns = self.namespace.regex(),
            name = self.name.regex(),
        )
    }
}

impl fmt::Display for IdentityPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(ns: &str, svc: &str) -> String {
        format!("spiffe://11111111-2222-3333-4444-555555555555.consul/ns/{ns}/dc/dc1/svc/{svc}")
    }

    #[test]
    fn wildcard_matches_any_source() {
        let p = IdentityPattern::for_source("*", "*").unwrap();
        assert!(p.matches(&uri("default", "web")));
        assert!(p.matches(&uri("other", "db")));
    }

    #[test]
    fn namespace_wildcard_name() {
        let p = IdentityPattern::for_source("default", "*").unwrap();
        assert!(p.matches(&uri("default", "web")));
        assert!(p.matches(&uri("default", "db")));
        assert!(!p.matches(&uri("other", "web")));
    }

    #[test]
    fn exact_source() {
        let p = IdentityPattern::for_source("default", "web").unwrap();
        assert!(p.matches(&uri("default", "web")));
        assert!(!p.matches(&uri("default", "web2")));
        assert!(!p.matches(&uri("other", "web")));
    }

    #[test]
    fn malformed_uris_never_match() {
        let p = IdentityPattern::for_source("*", "*").unwrap();
        assert!(!p.matches("spiffe://td/ns/default/dc/dc1/svc/"));
        assert!(!p.matches("spiffe:///ns/default/dc/dc1/svc/web"));
        assert!(!p.matches("spiffe://td/ns/default/dc/dc1/svc/web/extra"));
        assert!(!p.matches("http://td/ns/default/dc/dc1/svc/web"));
        assert!(!p.matches("web"));
    }

    #[test]
    fn wildcard_namespace_with_literal_name_is_unsupported() {
        let err = IdentityPattern::for_source("*", "web").unwrap_err();
        assert_eq!(
            err,
            IdError::UnsupportedWildcard {
                namespace: "*".to_string(),
                name: "web".to_string()
            }
        );
    }

    #[test]
    fn invalid_segments() {
        assert_eq!(
            IdentityPattern::for_source("", "web").unwrap_err(),
            IdError::EmptySegment
        );
        assert_eq!(
            IdentityPattern::for_source("default", "we/b").unwrap_err(),
            IdError::BadSegmentChar("we/b".to_string())
        );
    }

    #[test]
    fn regex_rendering_is_pure() {
        let a = IdentityPattern::for_source("default", "web.v1").unwrap();
        let b = IdentityPattern::for_source("default", "web.v1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.regex(), b.regex());
        assert_eq!(
            a.regex(),
            r"^spiffe://[^/]+/ns/default/dc/[^/]+/svc/web\.v1$"
        );
        assert_eq!(
            IdentityPattern::for_source("*", "*").unwrap().regex(),
            "^spiffe://[^/]+/ns/[^/]+/dc/[^/]+/svc/[^/]+$"
        );
    }

    #[test]
    fn rendered_regex_agrees_with_matcher() {
        let candidates = [
            uri("default", "web"),
            uri("default", "db"),
            uri("other", "web"),
            "spiffe://td/ns/default/dc//svc/web".to_string(),
        ];
        for (ns, name) in [("*", "*"), ("default", "*"), ("default", "web")] {
            let p = IdentityPattern::for_source(ns, name).unwrap();
            let re = regex::Regex::new(&p.regex()).unwrap();
            for c in &candidates {
                assert_eq!(p.matches(c), re.is_match(c), "{p} vs {c}");
            }
        }
    }
}
