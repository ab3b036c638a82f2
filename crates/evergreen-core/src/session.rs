//! Session domain entities and the refresh predicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// User Profile
// ============================================================================

/// Identity snapshot carried inside a session record.
///
/// Captured at issuance/renewal time and never refreshed independently.
/// Field names follow the identity server's camelCase wire format; unknown
/// fields in stored or received JSON are tolerated and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Account identifier assigned by the identity server.
    pub id: String,
    pub email: String,
    /// Display name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Creates a profile with no timestamps (e.g. seeded from the CLI).
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            created_at: None,
            updated_at: None,
        }
    }
}

impl fmt::Display for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

// ============================================================================
// Session Record
// ============================================================================

/// The persisted unit of authentication state.
///
/// A record is an immutable value object: renewal never mutates one in
/// place, it produces a wholly new record. Presence does not imply
/// validity - `expires_at` may already be in the past for a record left
/// over from an earlier run.
///
/// Persisted layout (one JSON object per slot):
///
/// ```json
/// { "accessToken": "...", "user": { "id": "...", "email": "...", "name": "..." }, "expiresAt": 1735689600000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Opaque credential presented to downstream APIs.
    pub access_token: String,
    /// Identity snapshot as of issuance/renewal.
    pub user: UserProfile,
    /// Absolute expiry instant in epoch milliseconds.
    pub expires_at: i64,
}

impl SessionRecord {
    /// Builds a record for a token issued at `now_ms` with a lifetime of
    /// `expires_in_seconds`.
    pub fn issued(
        access_token: impl Into<String>,
        user: UserProfile,
        expires_in_seconds: i64,
        now_ms: i64,
    ) -> Self {
        let expires_at = now_ms.saturating_add(expires_in_seconds.saturating_mul(1000));
        Self {
            access_token: access_token.into(),
            user,
            expires_at,
        }
    }

    /// Whether the token may still be presented: `expires_at` is strictly
    /// in the future.
    #[must_use]
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }

    /// Milliseconds until expiry, clamped to zero for expired records.
    #[must_use]
    pub fn time_until_expiry(&self, now_ms: i64) -> i64 {
        self.expires_at.saturating_sub(now_ms).max(0)
    }

    /// Whether a renewal attempt is due.
    ///
    /// True within `refresh_lead_ms` of expiry and also once expiry has
    /// passed: an expired record is still eligible for an attempt.
    /// Refresh-eligibility is a superset of validity.
    #[must_use]
    pub fn should_refresh(&self, now_ms: i64, refresh_lead_ms: i64) -> bool {
        self.time_until_expiry(now_ms) <= refresh_lead_ms
    }

    /// Milliseconds until a proactive renewal becomes due, clamped to zero.
    ///
    /// This is the delay to arm a proactive timer for.
    #[must_use]
    pub fn time_until_refresh(&self, now_ms: i64, refresh_lead_ms: i64) -> i64 {
        self.expires_at
            .saturating_sub(now_ms)
            .saturating_sub(refresh_lead_ms)
            .max(0)
    }
}

// ============================================================================
// Renewal Response
// ============================================================================

/// Successful body of the identity server's renewal endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewalResponse {
    pub access_token: String,
    /// Lifetime of the renewed token, in seconds.
    pub expires_in: i64,
    /// Possibly refreshed identity snapshot.
    pub user: UserProfile,
}

// ============================================================================
// Lifecycle State
// ============================================================================

/// Where the lifecycle manager currently stands with its record.
///
/// `Invalidated` is terminal for the current record only; a later login or
/// an adopted out-of-band session moves the machine back to `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No record held.
    #[default]
    Idle,
    /// Record valid, proactive renewal timer armed.
    Scheduled,
    /// A renewal network call is outstanding.
    Refreshing,
    /// A renewal failed; a retry timer is armed.
    BackoffWaiting,
    /// The record was torn down and the outward signal emitted.
    Invalidated,
}

impl LifecycleState {
    /// Returns the log/display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Refreshing => "refreshing",
            Self::BackoffWaiting => "backoff_waiting",
            Self::Invalidated => "invalidated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
