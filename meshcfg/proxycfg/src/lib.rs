//! Assembles per-proxy configuration snapshots from a dynamic set of
//! subscriptions.
//!
//! A [`State`] registers the subscriptions a connect proxy depends on and folds
//! their update events into a [`ConfigSnapshot`]. When an upstream's discovery
//! chain changes, the set of per-target subscriptions is re-derived from it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod connect_proxy;
mod error;
mod snapshot;
mod state;
mod upstreams;
pub mod watch;


pub use self::{
    error::Error,
    snapshot::{ConfigSnapshot, UpstreamsSnapshot, WatchHandle},
    state::{SnapshotRx, SnapshotTx, State},
};
