#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ca;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod discovery_chain;
pub mod http_route;
mod identity;
pub mod intention;

pub use self::{
    identity::{IdError, IdentityPattern, Segment},
    intention::{Intention, IntentionAction},
};

/// Matches any namespace or service name in an intention's source or destination.
pub const WILDCARD: &str = "*";

/// The namespace used when none is specified.
pub const DEFAULT_NAMESPACE: &str = "default";
