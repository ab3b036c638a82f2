//! Evergreen Core - session domain types shared by the keeper and CLI
//!
//! This crate holds the persisted session record, the pure refresh
//! predicates, and the renewal policy. It performs no IO and spawns no
//! tasks; everything here is deterministic given a clock reading.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod policy;
pub mod session;

// Re-exports for convenience
pub use policy::RefreshPolicy;
pub use session::{LifecycleState, RenewalResponse, SessionRecord, UserProfile};
