//! # Storefront Kit Core
//!
//! Core types and trait seams for the Storefront Kit toolkit: shared
//! infrastructure for e-commerce backend services that call each other over
//! HTTP inside locally-transactional units of work.
//!
//! ## Core Concepts
//!
//! - **`RequestScope`**: explicit per-logical-transaction state (identity,
//!   pending acknowledgments, commit decision) passed down the call chain
//!   instead of an ambient context bag
//! - **`CallLog`**: audit record of one outbound HTTP call's lifecycle
//!   (`calling → success | failed`)
//! - **Acknowledge protocol**: every outbound call made during a unit of work
//!   that asks for it is re-notified with the final `commit`/`rollback`
//!   decision once the local database transaction settles
//! - **Trait seams**: storage, transport and the database transaction are
//!   consumed through traits so production (sqlx/reqwest) and tests
//!   (in-memory/scripted) plug in the same way
//!
//! ## Architecture Principles
//!
//! - Dependency injection via constructor arguments, no package-level globals
//! - Explicit `Result` returns everywhere; errors are values, not panics
//! - Payloads cross the toolkit as opaque bytes plus a schema-less JSON view
//!   for logging; typed call sites own (de)serialization

pub mod acknowledge;
pub mod call_log;
pub mod cache;
pub mod error;
pub mod manager;
pub mod payload;
pub mod scope;
pub mod store;
pub mod transport;

pub use acknowledge::{AcknowledgeHook, AcknowledgeRecord, CommitStatus, Decision};
pub use call_log::{CallLog, CallStatus, Method};
pub use cache::{CachePolicy, ResponseCacheEntry};
pub use error::CallError;
pub use manager::{Database, ManagerError, TransactionManager};
pub use payload::{Metadata, Payload};
pub use scope::{Actor, AcknowledgeTarget, InboundRequest, PendingCall, RequestScope};
pub use store::{
    AcknowledgeStore, CachePolicyStore, CallLogStore, ResponseCacheStore, StorageError,
};
pub use transport::{Transport, TransportError, TransportResponse};
