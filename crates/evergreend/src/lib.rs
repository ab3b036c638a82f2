//! Evergreen Daemon - Session lifecycle keeper
//!
//! This crate provides the core infrastructure for the evergreen daemon:
//! - `manager` - Lifecycle actor that schedules and runs token renewals
//! - `transport` - HTTP transport for the renewal and sign-out endpoints
//! - `store` - Single-slot session persistence on disk
//! - `clock` - Wall-clock seam so lifecycle logic is testable
//! - `config` - Daemon configuration loaded from a TOML file
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   evergreend daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  ManagerHandle  │────▶│      ManagerActor           │   │
//! │  │ (cheap clones)  │     │  (session state owner)      │   │
//! │  └─────────────────┘     └──────┬───────────┬──────────┘   │
//! │                                 │           │               │
//! │                        renewals │           │ events        │
//! │                                 ▼           ▼               │
//! │  ┌─────────────────┐     ┌───────────┐  ┌──────────────┐   │
//! │  │  SessionStore   │◀────│ Refresh   │  │ broadcast::  │   │
//! │  │ (JSON slot)     │     │ Transport │  │ Sender       │   │
//! │  └─────────────────┘     └───────────┘  └──────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod clock;
pub mod config;
pub mod manager;
pub mod store;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use config::DaemonConfig;
pub use manager::{
    spawn_manager, InvalidationReason, ManagerError, ManagerHandle, SessionEvent,
};
pub use store::SessionStore;
pub use transport::{HttpRefreshTransport, RefreshTransport, TransportError};
