//! Compiles precedence-ordered intentions into a single-action authorization policy.
//!
//! Intentions are evaluated highest-precedence first, and the first match
//! decides. Proxy access-control filters have no notion of precedence: they
//! evaluate a flat set of rules sharing one action. Compilation collapses the
//! ordering by folding every intention whose action equals the default into
//! negative clauses on the lower-precedence intentions it outranks. The folded
//! intentions are then dropped, so every surviving rule carries the opposite
//! action and rule order is irrelevant.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod compile;
mod permission;
pub mod predicate;

#[cfg(test)]
mod tests;

pub use self::{
    compile::{compile, CompiledPolicy, RbacAction, Rule},
    predicate::{Connection, HttpRequest, Predicate},
};
use meshcfg_core::IdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The intention cannot be expressed as a policy rule.
    #[error("failed to compile intention {index}: {reason}")]
    Compilation {
        index: usize,
        #[source]
        reason: Unsupported,
    },

    /// Intentions must be strictly ordered by descending precedence.
    #[error("intention {index} has precedence {precedence}, which does not follow {previous}")]
    InvariantViolation {
        index: usize,
        previous: i32,
        precedence: i32,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Unsupported {
    #[error(transparent)]
    Identity(#[from] IdError),

    #[error("header match {0:?} must set exactly one of present, exact, prefix, suffix, or regex")]
    HeaderMatchKind(String),

    #[error("invalid header name {0:?}")]
    HeaderName(String),

    #[error("invalid method {0:?}")]
    Method(String),

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
}
