//! Cheap-to-clone handle for talking to the lifecycle actor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel failures surface as [`ManagerError::ChannelClosed`]
//! - Query helpers degrade to `None` when the actor is gone

use tokio::sync::{broadcast, mpsc, oneshot};

use evergreen_core::{LifecycleState, SessionRecord, UserProfile};

use super::commands::{ManagerCommand, ManagerError, SessionEvent};

// ============================================================================
// Manager Handle
// ============================================================================

/// Handle for interacting with the lifecycle actor.
///
/// Cloneable; all clones talk to the same actor. Request/response
/// methods return [`ManagerError::ChannelClosed`] once the actor has
/// stopped.
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    sender: mpsc::Sender<ManagerCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl ManagerHandle {
    /// Creates a new handle from the actor's channel endpoints.
    pub(crate) fn new(
        sender: mpsc::Sender<ManagerCommand>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self { sender, events }
    }

    /// Establishes a session from a completed login and returns the
    /// record the actor persisted and scheduled.
    ///
    /// # Errors
    ///
    /// - `ManagerError::ChannelClosed` if the actor has shut down
    pub async fn login(
        &self,
        access_token: impl Into<String>,
        user: UserProfile,
        expires_in_seconds: i64,
    ) -> Result<SessionRecord, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Login {
                access_token: access_token.into(),
                user: Box::new(user),
                expires_in_seconds,
                respond_to: tx,
            })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }

    /// Ends the session: clears persistence, notifies the identity
    /// server best-effort, and emits the invalidation event. Resolves
    /// once local teardown is done.
    ///
    /// # Errors
    ///
    /// - `ManagerError::ChannelClosed` if the actor has shut down
    pub async fn logout(&self) -> Result<(), ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Logout { respond_to: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }

    /// Discards in-memory session state and re-initializes from the
    /// persisted slot.
    ///
    /// # Errors
    ///
    /// - `ManagerError::ChannelClosed` if the actor has shut down
    pub async fn reload(&self) -> Result<(), ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::Reload { respond_to: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }

    /// Nudges the actor to renew immediately if the session is due.
    /// Fire-and-forget.
    pub async fn foreground(&self) {
        // Ignore send error - a stopped actor has nothing to nudge
        let _ = self.sender.send(ManagerCommand::Foreground).await;
    }

    /// Returns the session the actor currently holds, or `None` when
    /// there is no session or the actor has stopped.
    pub async fn current_session(&self) -> Option<SessionRecord> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::GetSession { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()?
    }

    /// Returns the actor's current lifecycle state.
    pub async fn lifecycle_state(&self) -> Result<LifecycleState, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ManagerCommand::GetState { respond_to: tx })
            .await
            .map_err(|_| ManagerError::ChannelClosed)?;
        rx.await.map_err(|_| ManagerError::ChannelClosed)
    }

    /// Subscribes to session events. Each subscriber sees every event
    /// published after the call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Returns true while the actor can still receive commands.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handle() -> (ManagerHandle, mpsc::Receiver<ManagerCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(16);
        (ManagerHandle::new(cmd_tx, event_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_login_round_trips_through_channel() {
        let (handle, mut cmd_rx) = create_handle();
        let user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");

        let responder = tokio::spawn(async move {
            match cmd_rx.recv().await {
                Some(ManagerCommand::Login {
                    access_token,
                    user,
                    expires_in_seconds,
                    respond_to,
                }) => {
                    let record =
                        SessionRecord::issued(access_token, *user, expires_in_seconds, 1_000_000);
                    let _ = respond_to.send(record);
                }
                other => panic!("unexpected command: {other:?}"),
            }
        });

        let record = handle.login("tok-abc", user, 1_800).await.unwrap();
        assert_eq!(record.access_token, "tok-abc");
        assert_eq!(record.expires_at, 2_800_000);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_fails_when_actor_is_gone() {
        let (handle, cmd_rx) = create_handle();
        drop(cmd_rx);

        let user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");
        let result = handle.login("tok-abc", user, 1_800).await;
        assert!(matches!(result, Err(ManagerError::ChannelClosed)));
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_login_fails_when_responder_is_dropped() {
        let (handle, mut cmd_rx) = create_handle();

        let responder = tokio::spawn(async move {
            // Receive the command but drop the response channel.
            let _ = cmd_rx.recv().await;
        });

        let user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");
        let result = handle.login("tok-abc", user, 1_800).await;
        assert!(matches!(result, Err(ManagerError::ChannelClosed)));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_current_session_degrades_to_none() {
        let (handle, cmd_rx) = create_handle();
        drop(cmd_rx);

        assert_eq!(handle.current_session().await, None);
    }

    #[tokio::test]
    async fn test_foreground_is_fire_and_forget() {
        let (handle, mut cmd_rx) = create_handle();

        handle.foreground().await;
        assert!(matches!(cmd_rx.recv().await, Some(ManagerCommand::Foreground)));

        // Still fine after the actor is gone.
        drop(cmd_rx);
        handle.foreground().await;
    }

    #[tokio::test]
    async fn test_subscribe_sees_later_events() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(16);
        let (event_tx, _) = broadcast::channel(16);
        let handle = ManagerHandle::new(cmd_tx, event_tx.clone());

        let mut events = handle.subscribe();
        let user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");
        let record = SessionRecord::issued("tok-abc", user, 1_800, 1_000_000);
        event_tx
            .send(SessionEvent::Established {
                record: Box::new(record.clone()),
            })
            .unwrap();

        match events.try_recv() {
            Ok(SessionEvent::Established { record: r }) => assert_eq!(*r, record),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
