//! Compiles service intentions into proxy authorization policies and
//! assembles the configuration snapshots proxies are rendered from.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod manager;
mod metrics;


pub use self::{manager::Manager, metrics::ManagerMetrics};
pub use meshcfg_core as core;
pub use meshcfg_proxycfg::{self as proxycfg, ConfigSnapshot, SnapshotRx};
pub use meshcfg_rbac::{self as rbac, CompiledPolicy};
pub use meshcfg_submatview as submatview;

/// Compiles the authorization policy for a proxy's snapshot.
///
/// Returns `None` until the snapshot has received intentions, so that a
/// policy is never compiled from a list that is merely not yet known.
pub fn authz_policy(
    snapshot: &ConfigSnapshot,
    is_l7: bool,
) -> Result<Option<CompiledPolicy>, rbac::Error> {
    if !snapshot.intentions_set {
        return Ok(None);
    }
    let policy = rbac::compile(
        &snapshot.intentions,
        snapshot.default_intention_action,
        is_l7,
    )?;
    Ok(Some(policy))
}
