//! Lifecycle actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the
//! `ManagerActor`:
//! - `ManagerCommand`: Commands sent to the actor
//! - `ManagerError`: Errors handles can observe
//! - `SessionEvent`: Events published for subscribers
//!
//! All types are designed for async message passing and follow the
//! panic-free policy.

use evergreen_core::{LifecycleState, SessionRecord, UserProfile};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Manager Commands
// ============================================================================

/// Commands sent to the lifecycle actor.
///
/// Request-response commands carry a oneshot channel for the reply;
/// `Foreground` is fire-and-forget because its only effect is a
/// possible renewal attempt.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Establish a session from a completed login.
    ///
    /// Computes the expiry from `expires_in_seconds`, persists the new
    /// record, and arms the renewal schedule. Replaces any session the
    /// actor was holding.
    Login {
        /// Freshly issued access token
        access_token: String,
        /// Identity snapshot from the login response
        user: Box<UserProfile>,
        /// Token lifetime in seconds, as reported by the server
        expires_in_seconds: i64,
        /// Channel to send the established record
        respond_to: oneshot::Sender<SessionRecord>,
    },

    /// End the session: notify the server best-effort, clear the slot,
    /// and emit the invalidation signal.
    Logout {
        /// Channel to acknowledge completion
        respond_to: oneshot::Sender<()>,
    },

    /// Drop the in-memory record and re-initialize from the slot, as
    /// if the daemon had just started.
    Reload {
        /// Channel to acknowledge completion
        respond_to: oneshot::Sender<()>,
    },

    /// The process returned to the foreground. Triggers a renewal
    /// attempt when the held record is due and nothing is in flight.
    Foreground,

    /// Get the currently held session record, if any.
    GetSession {
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<SessionRecord>>,
    },

    /// Get the current lifecycle state.
    GetState {
        /// Channel to send the result
        respond_to: oneshot::Sender<LifecycleState>,
    },
}

// ============================================================================
// Manager Errors
// ============================================================================

/// Errors that can occur when talking to the lifecycle actor.
///
/// Uses `thiserror` for ergonomic error handling and Display
/// implementations.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    /// The command or response channel was closed before a reply
    /// arrived.
    ///
    /// This typically indicates the actor was shut down.
    #[error("manager channel closed")]
    ChannelClosed,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published by the lifecycle actor to subscribers.
///
/// `Invalidated` is the one signal collaborators must act on (send the
/// user back to sign-in); the others keep subscribers' view of the
/// current record fresh.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was established by login or adopted from the slot.
    Established {
        /// The new record
        record: Box<SessionRecord>,
    },

    /// The session was renewed; a new record replaced the old one.
    Refreshed {
        /// The renewed record
        record: Box<SessionRecord>,
    },

    /// The session is gone: the slot is cleared and the actor holds no
    /// record.
    Invalidated {
        /// Why the session ended
        reason: InvalidationReason,
    },
}

/// Reason a session was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// Renewal kept failing and the record had expired by the time the
    /// retry budget ran out.
    RetriesExhausted,

    /// The liveness poll found the held record expired.
    Expired,

    /// The slot was cleared by another process while a session was
    /// held.
    ExternallyCleared,

    /// The user logged out.
    LoggedOut,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted => write!(f, "renewal retries exhausted"),
            Self::Expired => write!(f, "session expired"),
            Self::ExternallyCleared => write!(f, "session cleared externally"),
            Self::LoggedOut => write!(f, "logged out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_error_display() {
        assert_eq!(
            ManagerError::ChannelClosed.to_string(),
            "manager channel closed"
        );
    }

    #[test]
    fn test_invalidation_reason_display() {
        assert_eq!(
            InvalidationReason::RetriesExhausted.to_string(),
            "renewal retries exhausted"
        );
        assert_eq!(InvalidationReason::Expired.to_string(), "session expired");
        assert_eq!(
            InvalidationReason::ExternallyCleared.to_string(),
            "session cleared externally"
        );
        assert_eq!(InvalidationReason::LoggedOut.to_string(), "logged out");
    }

    #[test]
    fn test_session_event_variants_clone() {
        let user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");
        let record = SessionRecord::issued("tok-abc", user, 1_800, 1_000_000);

        let established = SessionEvent::Established {
            record: Box::new(record.clone()),
        };
        let _cloned = established.clone();

        let refreshed = SessionEvent::Refreshed {
            record: Box::new(record),
        };
        let _cloned = refreshed.clone();

        let invalidated = SessionEvent::Invalidated {
            reason: InvalidationReason::Expired,
        };
        let _cloned = invalidated.clone();
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<LifecycleState>();

        tokio::spawn(async move {
            tx.send(LifecycleState::Idle).ok();
        });

        let result = rx.await;
        assert_eq!(result.unwrap(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<LifecycleState>();
        drop(tx);

        assert!(rx.await.is_err());
    }
}
