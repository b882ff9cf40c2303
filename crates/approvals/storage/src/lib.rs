//! Record-store contracts for the approval routing engine.
//!
//! The engine talks to its record store exclusively through the traits in
//! this crate. The contract deliberately mirrors a generic CRUD store:
//! get, query, insert, and conditional update, where "conditional" means
//! the update names the state it expects to replace and fails with a
//! distinguishable conflict when the stored row has moved on. That
//! compare-and-swap discipline is what keeps concurrent approval attempts
//! from both succeeding.
//!
//! [`InMemoryRoutingStorage`] is the deterministic, test-friendly
//! reference adapter. Production deployments should use a transactional
//! backend for source-of-truth data.

#![deny(unsafe_code)]

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryRoutingStorage;
pub use traits::{
    ApprovalLogStore, ArtifactStore, DelegationStore, ProgressStore, QueryWindow, RoutingStorage,
    UserDirectory, WorkflowStore,
};
