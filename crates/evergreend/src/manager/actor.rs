//! Lifecycle actor - owns the session record and the renewal schedule.
//!
//! The ManagerActor is the single owner of session state in the system.
//! It receives commands via an mpsc channel, runs renewal attempts in
//! spawned tasks, and publishes events via broadcast. All state
//! transitions happen inside this one task; the in-flight flag is
//! enough to serialize the proactive timer, backoff retries, foreground
//! nudges, and the liveness poll because they all land here.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use evergreen_core::{LifecycleState, RefreshPolicy, RenewalResponse, SessionRecord, UserProfile};

use crate::clock::Clock;
use crate::store::SessionStore;
use crate::transport::{RefreshTransport, TransportError};

use super::commands::{InvalidationReason, ManagerCommand, SessionEvent};

// ============================================================================
// Constants
// ============================================================================

/// Buffer for outcomes coming back from spawned renewal tasks. The
/// guard allows at most one in flight, so this never fills up.
const OUTCOME_BUFFER: usize = 4;

// ============================================================================
// Refresh Plumbing
// ============================================================================

/// Why a renewal attempt is being launched. Logged for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    /// The record was already inside the renewal window.
    Immediate,
    /// The proactive timer fired.
    Timer,
    /// A backoff delay after a failed attempt elapsed.
    Backoff,
    /// The process returned to the foreground with a due record.
    Foreground,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Timer => write!(f, "proactive timer"),
            Self::Backoff => write!(f, "backoff retry"),
            Self::Foreground => write!(f, "foreground"),
        }
    }
}

/// A completed renewal attempt, tagged with the run it belongs to.
///
/// The epoch lets the actor discard responses from attempts that were
/// superseded by login, logout, reload, or invalidation while the call
/// was on the wire.
#[derive(Debug)]
struct RefreshOutcome {
    epoch: u64,
    result: Result<RenewalResponse, TransportError>,
}

// ============================================================================
// Manager Actor
// ============================================================================

/// The lifecycle actor - owns the session record and all scheduling.
///
/// # Ownership
///
/// The actor owns:
/// - the in-memory [`SessionRecord`] mirror of the persisted slot
/// - the proactive and backoff deadlines (at most one of each)
/// - the in-flight guard and retry counter for the current renewal run
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands, timer
/// expirations, and renewal outcomes sequentially. Renewal network
/// calls run in spawned tasks and report back through a channel, so
/// the actor itself never blocks on the wire.
pub struct ManagerActor<C: Clock, T: RefreshTransport> {
    /// Command receiver
    receiver: mpsc::Receiver<ManagerCommand>,

    /// Event publisher for subscribers
    events: broadcast::Sender<SessionEvent>,

    /// Session slot on disk
    store: SessionStore,

    /// Renewal and sign-out endpoints
    transport: Arc<T>,

    /// Wall-clock source for expiry arithmetic
    clock: C,

    /// Scheduling knobs
    policy: RefreshPolicy,

    /// Shutdown signal
    cancel: CancellationToken,

    /// Sender cloned into spawned renewal tasks
    outcome_tx: mpsc::Sender<RefreshOutcome>,

    /// Outcomes reported by spawned renewal tasks
    outcome_rx: mpsc::Receiver<RefreshOutcome>,

    /// Current lifecycle state
    state: LifecycleState,

    /// The authoritative in-memory record; the slot mirrors it
    record: Option<SessionRecord>,

    /// True while a renewal call is on the wire
    in_flight: bool,

    /// Consecutive failed attempts in the current renewal cycle
    retry_count: u32,

    /// Incremented whenever scheduling state is reset; outcomes from
    /// older epochs are discarded
    refresh_epoch: u64,

    /// When the next proactive renewal is due, if one is armed
    proactive_deadline: Option<Instant>,

    /// When the next backoff retry is due, if one is armed
    backoff_deadline: Option<Instant>,
}

impl<C: Clock, T: RefreshTransport> ManagerActor<C, T> {
    /// Creates a new lifecycle actor.
    pub fn new(
        receiver: mpsc::Receiver<ManagerCommand>,
        events: broadcast::Sender<SessionEvent>,
        store: SessionStore,
        transport: Arc<T>,
        clock: C,
        policy: RefreshPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_BUFFER);
        Self {
            receiver,
            events,
            store,
            transport,
            clock,
            policy,
            cancel,
            outcome_tx,
            outcome_rx,
            state: LifecycleState::Idle,
            record: None,
            in_flight: false,
            retry_count: 0,
            refresh_epoch: 0,
            proactive_deadline: None,
            backoff_deadline: None,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Restores any persisted session, then processes commands, timer
    /// expirations, renewal outcomes, and the liveness poll until
    /// cancelled or all handles drop. This is the main entry point -
    /// call it in a spawned task.
    pub async fn run(mut self) {
        info!(
            state_path = %self.store.path().display(),
            "Lifecycle manager starting"
        );

        self.restore_from_slot();

        let mut poll = interval_at(
            Instant::now() + self.policy.poll_interval(),
            self.policy.poll_interval(),
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Lifecycle manager cancelled");
                    break;
                }
                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            debug!("All manager handles dropped");
                            break;
                        }
                    }
                }
                Some(outcome) = self.outcome_rx.recv() => {
                    self.handle_outcome(outcome);
                }
                () = wait_for(self.proactive_deadline) => {
                    self.proactive_deadline = None;
                    debug!("Proactive renewal timer fired");
                    self.start_refresh(RefreshTrigger::Timer);
                }
                () = wait_for(self.backoff_deadline) => {
                    self.backoff_deadline = None;
                    debug!(retry = self.retry_count, "Backoff delay elapsed");
                    self.start_refresh(RefreshTrigger::Backoff);
                }
                _ = poll.tick() => {
                    self.check_liveness();
                }
            }
        }

        info!(state = %self.state, "Lifecycle manager stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Login {
                access_token,
                user,
                expires_in_seconds,
                respond_to,
            } => {
                let record = self.establish(access_token, *user, expires_in_seconds);
                // Ignore send error - caller may have dropped the receiver
                let _ = respond_to.send(record);
            }
            ManagerCommand::Logout { respond_to } => {
                self.handle_logout();
                let _ = respond_to.send(());
            }
            ManagerCommand::Reload { respond_to } => {
                self.handle_reload();
                let _ = respond_to.send(());
            }
            ManagerCommand::Foreground => {
                self.handle_foreground();
            }
            ManagerCommand::GetSession { respond_to } => {
                let _ = respond_to.send(self.record.clone());
            }
            ManagerCommand::GetState { respond_to } => {
                let _ = respond_to.send(self.state);
            }
        }
    }

    // ========================================================================
    // Initialization
    // ========================================================================

    /// Adopts the persisted session, if there is a usable one.
    ///
    /// A valid record is mirrored into memory and scheduled; a stale
    /// record from a previous run is discarded rather than retried
    /// blindly. Neither case emits an event - subscribers learn about
    /// the restored session the first time it changes.
    fn restore_from_slot(&mut self) {
        match self.store.get() {
            None => {
                debug!("No persisted session found");
                self.state = LifecycleState::Idle;
            }
            Some(record) if record.is_valid(self.clock.now_ms()) => {
                info!(
                    user_id = %record.user.id,
                    expires_at = record.expires_at,
                    "Restored persisted session"
                );
                self.record = Some(record);
                self.schedule_renewal();
            }
            Some(_) => {
                info!("Discarding expired persisted session");
                self.store.clear();
                self.state = LifecycleState::Idle;
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Establishes a session from a completed login and arms the
    /// schedule. Replaces whatever session was held before.
    fn establish(
        &mut self,
        access_token: String,
        user: UserProfile,
        expires_in_seconds: i64,
    ) -> SessionRecord {
        let record = SessionRecord::issued(access_token, user, expires_in_seconds, self.clock.now_ms());

        info!(
            user_id = %record.user.id,
            expires_at = record.expires_at,
            "Session established"
        );

        self.store.set(&record);
        self.reset_run_state();
        self.record = Some(record.clone());
        let _ = self.events.send(SessionEvent::Established {
            record: Box::new(record.clone()),
        });
        self.schedule_renewal();
        record
    }

    /// Ends the session: best-effort server notification, then local
    /// teardown. Runs the full sequence even with no active session;
    /// the clear is idempotent and the signal still sends the
    /// application back to its sign-in surface.
    fn handle_logout(&mut self) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.sign_out().await {
                warn!(error = %e, "Sign-out notification failed");
            }
        });

        self.invalidate(InvalidationReason::LoggedOut);
    }

    /// Drops the in-memory record and re-initializes from the slot.
    /// Any renewal still in flight is abandoned.
    fn handle_reload(&mut self) {
        info!("Reloading session from the slot");
        self.reset_run_state();
        self.record = None;
        self.restore_from_slot();
    }

    /// Foreground trigger: renew now if the held record is due.
    ///
    /// Timers may be delayed while the process is suspended or the
    /// host throttles it; the proactive timer is an optimization, not
    /// the only renewal trigger.
    fn handle_foreground(&mut self) {
        let now_ms = self.clock.now_ms();
        let due = self
            .record
            .as_ref()
            .is_some_and(|r| r.should_refresh(now_ms, self.policy.refresh_lead_ms));

        if due {
            debug!("Foreground with a due record");
            self.start_refresh(RefreshTrigger::Foreground);
        }
    }

    // ========================================================================
    // Renewal Cycle
    // ========================================================================

    /// Arms the proactive schedule for the current record: an
    /// immediate attempt when already inside the renewal window, a
    /// timer otherwise. Arming replaces any previously armed timer.
    fn schedule_renewal(&mut self) {
        let now_ms = self.clock.now_ms();
        let (due, wait_ms) = match &self.record {
            Some(record) => (
                record.should_refresh(now_ms, self.policy.refresh_lead_ms),
                record.time_until_refresh(now_ms, self.policy.refresh_lead_ms),
            ),
            None => {
                self.state = LifecycleState::Idle;
                return;
            }
        };

        if due {
            debug!("Record already inside the renewal window");
            self.start_refresh(RefreshTrigger::Immediate);
            return;
        }

        self.proactive_deadline = Some(deadline_after(Duration::from_millis(wait_ms as u64)));
        self.state = LifecycleState::Scheduled;
        debug!(wait_ms, "Proactive renewal scheduled");
    }

    /// Launches a renewal attempt unless one is already on the wire.
    ///
    /// The in-flight guard is the sole mutual exclusion between the
    /// proactive timer, backoff retries, the foreground trigger, and
    /// anything else deciding a renewal is due; every trigger funnels
    /// through here.
    fn start_refresh(&mut self, trigger: RefreshTrigger) {
        if self.in_flight {
            debug!(trigger = %trigger, "Renewal already in flight, ignoring trigger");
            return;
        }
        if self.record.is_none() {
            debug!(trigger = %trigger, "No session to renew");
            return;
        }

        self.in_flight = true;
        self.state = LifecycleState::Refreshing;
        self.proactive_deadline = None;

        debug!(
            trigger = %trigger,
            attempt = self.retry_count.saturating_add(1),
            "Starting renewal attempt"
        );

        let transport = Arc::clone(&self.transport);
        let outcome_tx = self.outcome_tx.clone();
        let epoch = self.refresh_epoch;
        tokio::spawn(async move {
            let result = transport.refresh().await;
            // Ignore send error - the actor shut down while we ran
            let _ = outcome_tx.send(RefreshOutcome { epoch, result }).await;
        });
    }

    /// Applies a completed renewal attempt to the state machine.
    fn handle_outcome(&mut self, outcome: RefreshOutcome) {
        if outcome.epoch != self.refresh_epoch {
            debug!(
                epoch = outcome.epoch,
                current = self.refresh_epoch,
                "Discarding renewal outcome from a superseded run"
            );
            return;
        }

        self.in_flight = false;

        match outcome.result {
            Ok(renewal) => self.on_refresh_success(renewal),
            Err(e) => self.on_refresh_failure(&e),
        }
    }

    /// Adopts the renewed record and re-arms the proactive schedule.
    fn on_refresh_success(&mut self, renewal: RenewalResponse) {
        let record = SessionRecord::issued(
            renewal.access_token,
            renewal.user,
            renewal.expires_in,
            self.clock.now_ms(),
        );

        info!(
            user_id = %record.user.id,
            expires_at = record.expires_at,
            "Session renewed"
        );

        self.retry_count = 0;
        self.backoff_deadline = None;
        self.store.set(&record);
        self.record = Some(record.clone());
        let _ = self.events.send(SessionEvent::Refreshed {
            record: Box::new(record),
        });
        self.schedule_renewal();
    }

    /// Arms the next backoff retry, or runs exhaustion handling once
    /// the retry budget is spent.
    fn on_refresh_failure(&mut self, error: &TransportError) {
        self.retry_count = self.retry_count.saturating_add(1);

        if self.retry_count <= self.policy.max_retries {
            let delay = self.policy.backoff_delay(self.retry_count);
            warn!(
                error = %error,
                retry = self.retry_count,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Renewal attempt failed, backing off"
            );
            self.backoff_deadline = Some(deadline_after(delay));
            self.state = LifecycleState::BackoffWaiting;
            return;
        }

        self.on_retries_exhausted(error);
    }

    /// Conditional teardown after the retry budget is spent.
    ///
    /// The slot is consulted one last time: when it still holds a
    /// valid record (renewed out-of-band, or simply not yet expired),
    /// the session is kept and the cycle resets. Only a session that
    /// is independently gone by now is torn down.
    fn on_retries_exhausted(&mut self, error: &TransportError) {
        warn!(
            error = %error,
            attempts = self.retry_count,
            "Renewal retries exhausted"
        );

        match self.store.get() {
            Some(persisted) if persisted.is_valid(self.clock.now_ms()) => {
                info!(
                    user_id = %persisted.user.id,
                    expires_at = persisted.expires_at,
                    "Session still valid after exhausted retries, keeping it"
                );
                let renewed_elsewhere = self.record.as_ref() != Some(&persisted);
                self.retry_count = 0;
                self.backoff_deadline = None;
                self.record = Some(persisted.clone());
                if renewed_elsewhere {
                    let _ = self.events.send(SessionEvent::Refreshed {
                        record: Box::new(persisted),
                    });
                }
                self.schedule_renewal();
            }
            _ => self.invalidate(InvalidationReason::RetriesExhausted),
        }
    }

    // ========================================================================
    // Liveness Poll
    // ========================================================================

    /// Periodic check that the held session is still alive, and that
    /// the slot still agrees with it.
    ///
    /// Runs on its own cadence, independent of the renewal cycle. The
    /// slot is trusted as found: a newer valid record is adopted, an
    /// externally cleared slot ends the session here too.
    fn check_liveness(&mut self) {
        let now_ms = self.clock.now_ms();
        let held = self.record.clone();
        let persisted = self.store.get();

        match (held, persisted) {
            (None, None) => {}
            (None, Some(slot)) => {
                if slot.is_valid(now_ms) {
                    info!(
                        user_id = %slot.user.id,
                        "Adopting session established by another process"
                    );
                    self.retry_count = 0;
                    self.record = Some(slot.clone());
                    let _ = self.events.send(SessionEvent::Established {
                        record: Box::new(slot),
                    });
                    self.schedule_renewal();
                } else {
                    debug!("Discarding stale externally written session");
                    self.store.clear();
                }
            }
            (Some(_), None) => {
                warn!("Session slot cleared externally");
                self.invalidate(InvalidationReason::ExternallyCleared);
            }
            (Some(held), Some(slot)) => {
                if slot != held && slot.is_valid(now_ms) {
                    info!(
                        user_id = %slot.user.id,
                        "Adopting session renewed by another process"
                    );
                    self.retry_count = 0;
                    self.backoff_deadline = None;
                    self.record = Some(slot.clone());
                    let _ = self.events.send(SessionEvent::Refreshed {
                        record: Box::new(slot),
                    });
                    self.schedule_renewal();
                } else if !held.is_valid(now_ms) {
                    warn!(expires_at = held.expires_at, "Held session expired without renewal");
                    self.invalidate(InvalidationReason::Expired);
                }
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Ends the current session: clears the slot, drops the record,
    /// and emits the one outward invalidation signal.
    fn invalidate(&mut self, reason: InvalidationReason) {
        match reason {
            InvalidationReason::LoggedOut => info!(reason = %reason, "Session invalidated"),
            _ => warn!(reason = %reason, "Session invalidated"),
        }

        self.store.clear();
        self.reset_run_state();
        self.record = None;
        self.state = LifecycleState::Invalidated;
        let _ = self.events.send(SessionEvent::Invalidated { reason });
    }

    /// Clears all per-run scheduling state: timers, the retry counter,
    /// and the in-flight guard. Bumping the epoch makes any renewal
    /// still on the wire report into the void.
    fn reset_run_state(&mut self) {
        self.refresh_epoch = self.refresh_epoch.wrapping_add(1);
        self.in_flight = false;
        self.retry_count = 0;
        self.proactive_deadline = None;
        self.backoff_deadline = None;
        self.state = LifecycleState::Idle;
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Sleeps until the deadline, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// A deadline `delay` from now, saturating instead of overflowing for
/// absurdly distant expiries.
fn deadline_after(delay: Duration) -> Instant {
    Instant::now()
        .checked_add(delay)
        .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400 * 365 * 30))
}

// ============================================================================
// Tests
// ============================================================================
