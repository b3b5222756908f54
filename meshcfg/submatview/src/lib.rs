//! Single-flight materialized views of streaming queries.
//!
//! Long-poll callers that ask for the same query share one [`Materializer`],
//! which keeps the query's latest result up to date in the background.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod materializer;
mod store;

pub use self::{
    materializer::Materializer,
    store::{NewMaterializer, Store},
};

/// A query result and the index it was observed at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View<T> {
    pub index: u64,
    pub value: T,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The materializer's updates ended before a new enough view arrived.
    #[error("view updates ended before index {min_index} was exceeded")]
    Closed { min_index: u64 },

    /// No view arrived before the caller's deadline.
    #[error("timed out waiting for a view")]
    Timeout,
}
