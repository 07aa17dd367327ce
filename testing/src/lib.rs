//! Test doubles for storefront-kit.
//!
//! Everything a service test needs without a network or a database: memory
//! implementations of the storage traits, a scripted [`transport::MockTransport`]
//! that records what was sent, and a [`database::MemoryDatabase`] that counts
//! transaction outcomes.

pub mod database;
pub mod stores;
pub mod transport;

pub use database::{MemoryDatabase, MemoryTx};
pub use stores::{
    MemoryAcknowledgeStore, MemoryCachePolicyStore, MemoryCallLogStore, MemoryResponseCacheStore,
};
pub use transport::{MockTransport, SentRequest};
