use crate::{
    permission::route_permission,
    predicate::{Connection, Matcher, Predicate},
    Error,
};
use meshcfg_core::{Intention, IntentionAction};
use std::fmt;

/// The action a proxy applies when any rule matches. The opposite action applies otherwise.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RbacAction {
    /// Grants access to the principals selected by the rules and denies the rest.
    Allow,

    /// Denies access to the principals selected by the rules and allows the rest.
    Deny,
}

/// A precedence-free authorization policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledPolicy {
    pub action: RbacAction,

    /// Independent rules; evaluation order does not matter.
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub name: String,

    /// Clauses over the peer's identity.
    pub principal: Predicate,

    /// Clauses over request attributes. Exclusions of outranking intentions
    /// that carry L7 criteria live here since they depend on the request.
    pub permission: Predicate,
}

/// Compiles intentions into a single-action policy.
///
/// `intentions` must be sorted by strictly descending precedence. Intentions
/// whose action equals `default_action` are folded into the rules they
/// outrank and never appear in the output. Route matches are only considered
/// when `is_l7` is set.
pub fn compile(
    intentions: &[Intention],
    default_action: IntentionAction,
    is_l7: bool,
) -> Result<CompiledPolicy, Error> {
    let action = RbacAction::for_default(default_action);

    let mut rules = Vec::new();
    // Outranking intentions with the default action, which lower-precedence
    // rules must not match.
    let mut identity_exclusions = Vec::new();
    let mut request_exclusions = Vec::new();

    let mut previous = None;
    for (index, ixn) in intentions.iter().enumerate() {
        if let Some(previous) = previous {
            if ixn.precedence >= previous {
                return Err(Error::InvariantViolation {
                    index,
                    previous,
                    precedence: ixn.precedence,
                });
            }
        }
        previous = Some(ixn.precedence);

        let identity = ixn
            .source_identity()
            .map_err(|e| Error::Compilation {
                index,
                reason: e.into(),
            })?;
        let principal = Predicate::from(Matcher::PeerIdentity(identity));
        let permission = if is_l7 {
            route_permission(&ixn.route_matches)
                .map_err(|reason| Error::Compilation { index, reason })?
        } else {
            None
        };

        if ixn.action == default_action {
            match permission {
                None => identity_exclusions.push(principal),
                Some(permission) => {
                    request_exclusions.push(Predicate::all(vec![principal, permission]))
                }
            }
            continue;
        }

        let principal = Predicate::all(
            std::iter::once(principal)
                .chain(identity_exclusions.iter().cloned().map(Predicate::negate))
                .collect(),
        );
        let permission = Predicate::all(
            permission
                .into_iter()
                .chain(request_exclusions.iter().cloned().map(Predicate::negate))
                .collect(),
        );
        rules.push(Rule {
            name: format!("compiled-intentions-{}", rules.len()),
            principal,
            permission,
        });
    }

    tracing::trace!(
        intentions = intentions.len(),
        rules = rules.len(),
        ?action,
        "compiled intentions"
    );
    Ok(CompiledPolicy { action, rules })
}

// === impl RbacAction ===

impl RbacAction {
    /// Rules list the exceptions to the default, so they carry the opposite action.
    pub fn for_default(default_action: IntentionAction) -> Self {
        match default_action {
            IntentionAction::Deny => Self::Allow,
            IntentionAction::Allow => Self::Deny,
        }
    }

    pub fn intention_action(self) -> IntentionAction {
        match self {
            Self::Allow => IntentionAction::Allow,
            Self::Deny => IntentionAction::Deny,
        }
    }
}

impl fmt::Display for RbacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => "ALLOW".fmt(f),
            Self::Deny => "DENY".fmt(f),
        }
    }
}

// === impl CompiledPolicy ===

impl CompiledPolicy {
    /// Decides whether `conn` is allowed or denied.
    pub fn decide(&self, conn: &Connection) -> IntentionAction {
        let action = self.action.intention_action();
        if self.rules.iter().any(|r| r.matches(conn)) {
            action
        } else {
            action.invert()
        }
    }
}

impl fmt::Display for CompiledPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action: {}", self.action)?;
        for rule in &self.rules {
            write!(f, "\n{rule}")?;
        }
        Ok(())
    }
}

// === impl Rule ===

impl Rule {
    pub fn matches(&self, conn: &Connection) -> bool {
        self.principal.matches(conn) && self.permission.matches(conn)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: principal={} permission={}",
            self.name, self.principal, self.permission
        )
    }
}
