//! Durable event store
//!
//! One SQLite file per deployment holding the failure log, the learned
//! pattern statistics and both prediction tables. Every write is a single
//! statement so concurrent loops never hold a transaction across each other.

pub mod schema;
pub mod event_store;
pub mod predictions;

pub use event_store::EventStore;
