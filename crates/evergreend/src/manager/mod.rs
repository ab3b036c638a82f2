//! Session lifecycle manager - the single owner of session state.
//!
//! The manager keeps an authenticated session alive: it mirrors the
//! persisted session slot, renews the access token ahead of expiry,
//! retries failures with exponential backoff, and tells subscribers
//! when the session is established, renewed, or gone.
//!
//! ```text
//!                    ┌─────────────────┐
//!   ManagerHandle ──▶│  ManagerActor   │──▶ SessionStore (slot file)
//!   (commands)       │  (state + time) │──▶ RefreshTransport (HTTP)
//!                    └────────┬────────┘
//!                             │ broadcast
//!                             ▼
//!                       SessionEvent subscribers
//! ```
//!
//! All renewal triggers - the proactive timer, backoff retries, the
//! foreground nudge - funnel into one in-flight guard inside the
//! actor, so at most one renewal call is ever on the wire.

mod actor;
mod commands;
mod handle;

pub use actor::ManagerActor;
pub use commands::{InvalidationReason, ManagerCommand, ManagerError, SessionEvent};
pub use handle::ManagerHandle;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use evergreen_core::RefreshPolicy;

use crate::clock::Clock;
use crate::store::SessionStore;
use crate::transport::RefreshTransport;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 16;

/// Spawns the lifecycle actor and returns a handle to it.
///
/// This:
/// 1. Sanitizes the policy (degenerate values are clamped)
/// 2. Creates the command and event channels
/// 3. Spawns the actor task, which restores any persisted session
/// 4. Returns a cloneable handle
///
/// The actor runs until `cancel` fires or every handle is dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use evergreen_core::RefreshPolicy;
/// use evergreend::{spawn_manager, HttpRefreshTransport, SessionStore, SystemClock};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpRefreshTransport::new("https://app.pennyworth.dev", Duration::from_secs(30))?;
/// let handle = spawn_manager(
///     SessionStore::new(SessionStore::default_path()),
///     Arc::new(transport),
///     SystemClock,
///     RefreshPolicy::default(),
///     CancellationToken::new(),
/// );
///
/// let mut events = handle.subscribe();
/// # Ok(())
/// # }
/// ```
pub fn spawn_manager<C: Clock, T: RefreshTransport>(
    store: SessionStore,
    transport: Arc<T>,
    clock: C,
    policy: RefreshPolicy,
    cancel: CancellationToken,
) -> ManagerHandle {
    let policy = policy.validated();
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = ManagerActor::new(
        cmd_rx,
        event_tx.clone(),
        store,
        transport,
        clock,
        policy,
        cancel,
    );
    tokio::spawn(actor.run());

    ManagerHandle::new(cmd_tx, event_tx)
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
