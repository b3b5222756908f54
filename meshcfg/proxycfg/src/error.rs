#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The proxy's registration cannot be watched.
    #[error("invalid proxy configuration: {0}")]
    Config(#[source] anyhow::Error),

    /// The substrate refused to register a subscription.
    #[error("failed to subscribe to {correlation_id}: {source}")]
    Subscription {
        correlation_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A subscription delivered an error instead of a result.
    #[error("update for {correlation_id} failed: {source}")]
    Upstream {
        correlation_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("update for {correlation_id} carried {actual}, expected {expected}")]
    TypeMismatch {
        correlation_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unroutable correlation id {0:?}")]
    UnroutableEvent(String),
}

// === impl Error ===

impl Error {
    /// Protocol violations indicate a bug rather than a transient failure and
    /// are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::UnroutableEvent(_))
    }
}
