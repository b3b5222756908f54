//! Boolean predicates over a connection's peer identity and request attributes.

use http::{HeaderMap, Method};
use meshcfg_core::IdentityPattern;
use regex::Regex;
use std::fmt;

/// The request path pseudo-header.
pub const PATH: &str = ":path";

/// The request method pseudo-header.
pub const METHOD: &str = ":method";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Always matches.
    Any,
    Match(Matcher),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Matches the URI SAN of the peer's certificate.
    PeerIdentity(IdentityPattern),
    Header(HeaderMatcher),
}

/// Matches a request header or pseudo-header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderMatcher {
    pub name: String,
    pub rule: StringMatch,
    pub invert: bool,
}

#[derive(Clone, Debug)]
pub enum StringMatch {
    Present,
    Exact(String),
    Prefix(String),
    Suffix(String),

    /// Must match the entire value.
    Regex(Regex),
}

/// The attributes a predicate is evaluated against.
#[derive(Clone, Debug, Default)]
pub struct Connection {
    /// The URI SAN presented by the peer, if the connection is authenticated.
    pub peer_identity: Option<String>,

    /// Set for HTTP traffic.
    pub http: Option<HttpRequest>,
}

#[derive(Clone, Debug, Default)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

// === impl Predicate ===

impl Predicate {
    /// Conjoins `preds`, matching everything when there are none.
    pub fn all(mut preds: Vec<Predicate>) -> Self {
        match preds.len() {
            0 => Self::Any,
            1 => preds.remove(0),
            _ => Self::And(preds),
        }
    }

    /// Disjoins `preds`, matching nothing when there are none.
    pub fn any_of(mut preds: Vec<Predicate>) -> Self {
        match preds.len() {
            0 => Self::negate(Self::Any),
            1 => preds.remove(0),
            _ => Self::Or(preds),
        }
    }

    pub fn negate(pred: Predicate) -> Self {
        Self::Not(Box::new(pred))
    }

    pub fn matches(&self, conn: &Connection) -> bool {
        match self {
            Self::Any => true,
            Self::Match(m) => m.matches(conn),
            Self::And(preds) => preds.iter().all(|p| p.matches(conn)),
            Self::Or(preds) => preds.iter().any(|p| p.matches(conn)),
            Self::Not(pred) => !pred.matches(conn),
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(_) | Self::Or(_) => write!(f, "({self})"),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, preds: &[Predicate], op: &str) -> fmt::Result {
            for (i, p) in preds.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                p.fmt_operand(f)?;
            }
            Ok(())
        }

        match self {
            Self::Any => "true".fmt(f),
            Self::Match(m) => m.fmt(f),
            Self::And(preds) => join(f, preds, "&&"),
            Self::Or(preds) => join(f, preds, "||"),
            Self::Not(pred) => write!(f, "!({pred})"),
        }
    }
}

impl From<Matcher> for Predicate {
    fn from(m: Matcher) -> Self {
        Self::Match(m)
    }
}

// === impl Matcher ===

impl Matcher {
    pub fn matches(&self, conn: &Connection) -> bool {
        match self {
            Self::PeerIdentity(pattern) => conn
                .peer_identity
                .as_deref()
                .map(|uri| pattern.matches(uri))
                .unwrap_or(false),
            Self::Header(h) => h.matches(conn.http.as_ref()),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerIdentity(pattern) => write!(
                f,
                "matches(connection.uri_san_peer_certificate, {})",
                quote(&pattern.regex())
            ),
            Self::Header(h) => h.fmt(f),
        }
    }
}

// === impl HeaderMatcher ===

impl HeaderMatcher {
    fn matches(&self, req: Option<&HttpRequest>) -> bool {
        let value = req.and_then(|req| match self.name.as_str() {
            PATH => Some(req.path.as_str()),
            METHOD => Some(req.method.as_str()),
            name => req.headers.get(name).and_then(|v| v.to_str().ok()),
        });
        let matched = match (&self.rule, value) {
            (_, None) => false,
            (StringMatch::Present, Some(_)) => true,
            (StringMatch::Exact(s), Some(v)) => v == s,
            (StringMatch::Prefix(s), Some(v)) => v.starts_with(s.as_str()),
            (StringMatch::Suffix(s), Some(v)) => v.ends_with(s.as_str()),
            (StringMatch::Regex(re), Some(v)) => re.is_match(v),
        };
        matched != self.invert
    }
}

impl fmt::Display for HeaderMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            "!".fmt(f)?;
        }
        let header = format!("request.headers[{}]", quote(&self.name));
        match &self.rule {
            StringMatch::Present => write!(f, "has({header})"),
            StringMatch::Exact(s) => write!(f, "{header} == {}", quote(s)),
            StringMatch::Prefix(s) => write!(f, "{header}.startsWith({})", quote(s)),
            StringMatch::Suffix(s) => write!(f, "{header}.endsWith({})", quote(s)),
            StringMatch::Regex(re) => write!(f, "{header}.matches({})", quote(re.as_str())),
        }
    }
}

// === impl StringMatch ===

impl StringMatch {
    /// Compiles a regex that must match an entire value.
    pub fn regex(s: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(&format!("^(?:{s})$"))?))
    }
}

impl PartialEq for StringMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Present, Self::Present) => true,
            (Self::Exact(l0), Self::Exact(r0)) => l0 == r0,
            (Self::Prefix(l0), Self::Prefix(r0)) => l0 == r0,
            (Self::Suffix(l0), Self::Suffix(r0)) => l0 == r0,
            (Self::Regex(l0), Self::Regex(r0)) => l0.as_str() == r0.as_str(),
            _ => false,
        }
    }
}

impl Eq for StringMatch {}

// === impl Connection ===

impl Connection {
    pub fn from_peer(uri: impl ToString) -> Self {
        Self {
            peer_identity: Some(uri.to_string()),
            http: None,
        }
    }

    pub fn with_request(mut self, method: Method, path: impl ToString) -> Self {
        self.http = Some(HttpRequest {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
        });
        self
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
