//! Single-slot session persistence.
//!
//! The store owns one JSON file holding at most one [`SessionRecord`].
//! Writing goes through a staging file plus rename, so the slot on disk
//! is always either the previous record or the new one, never a torn
//! write.
//!
//! # Failure Containment
//!
//! Persistence is an optimization for surviving restarts, not a
//! correctness requirement. `get` treats unreadable or malformed slots
//! as absent, and `set`/`clear` log failures instead of propagating
//! them; the lifecycle keeps running on its in-memory record either
//! way.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Store errors are logged but never fatal

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use evergreen_core::SessionRecord;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Constants
// ============================================================================

/// File name of the session slot inside the state directory.
pub const SLOT_FILE: &str = "session.json";

/// Directory under the platform state dir holding evergreen's files.
const STATE_DIR: &str = "evergreen";

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the fallible store operations.
///
/// The daemon goes through [`SessionStore::set`] and
/// [`SessionStore::clear`], which log these instead of returning them;
/// the CLI uses the `try_` variants to report failures to the user.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record could not be encoded as JSON.
    #[error("failed to encode session record: {message}")]
    Encode { message: String },

    /// The slot file could not be written or renamed into place.
    #[error("failed to write session slot at {path}: {message}")]
    Write { path: String, message: String },

    /// The slot file could not be removed.
    #[error("failed to clear session slot at {path}: {message}")]
    Clear { path: String, message: String },
}

// ============================================================================
// Session Store
// ============================================================================

/// Persistence for the single session slot.
///
/// Cloning is cheap; clones operate on the same slot path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by the given slot file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default slot location: `{state_dir}/evergreen/session.json`,
    /// falling back to `/tmp` when the platform has no state directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::state_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(STATE_DIR)
            .join(SLOT_FILE)
    }

    /// Path of the slot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the slot, returning `None` when it is absent, unreadable,
    /// or malformed. Only absence is silent; the other cases log a
    /// warning.
    #[must_use]
    pub fn get(&self) -> Option<SessionRecord> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read session slot; treating as absent"
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Session slot is malformed; treating as absent"
                );
                None
            }
        }
    }

    /// Persists the record, logging on failure instead of returning it.
    pub fn set(&self, record: &SessionRecord) {
        if let Err(e) = self.try_set(record) {
            warn!(error = %e, "Failed to persist session record");
        }
    }

    /// Persists the record, replacing any previous slot content.
    ///
    /// The record is written to a staging file next to the slot and
    /// renamed into place, so a failure part-way leaves the previous
    /// slot content intact.
    pub fn try_set(&self, record: &SessionRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                path: parent.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let bytes = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Encode {
            message: e.to_string(),
        })?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &bytes).map_err(|e| StoreError::Write {
            path: staging.display().to_string(),
            message: e.to_string(),
        })?;
        fs::rename(&staging, &self.path).map_err(|e| StoreError::Write {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        debug!(path = %self.path.display(), "Persisted session record");
        Ok(())
    }

    /// Clears the slot, logging on failure instead of returning it.
    pub fn clear(&self) {
        if let Err(e) = self.try_clear() {
            warn!(error = %e, "Failed to clear session slot");
        }
    }

    /// Removes the slot file. An already-absent slot is not an error.
    pub fn try_clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared session slot");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Clear {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use evergreen_core::UserProfile;
    use std::fs;
    use tempfile::TempDir;

    fn sample_record() -> SessionRecord {
        let mut user = UserProfile::new("usr-1", "maya@pennyworth.app", "Maya Lindqvist");
        user.created_at = "2024-03-01T10:00:00Z".parse().ok();
        SessionRecord::issued("tok-abc", user, 1_800, 1_000_000)
    }

    fn store_in(dir: &TempDir) -> SessionStore {
        SessionStore::new(dir.path().join(SLOT_FILE))
    }

    #[test]
    fn test_get_returns_none_when_slot_absent() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).get().is_none());
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = sample_record();

        store.set(&record);

        assert_eq!(store.get(), Some(record));
    }

    #[test]
    fn test_get_returns_none_on_malformed_slot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"{ not json").unwrap();

        assert!(store.get().is_none());
    }

    #[test]
    fn test_get_returns_none_on_wrong_shape() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), br#"{"accessToken": 42}"#).unwrap();

        assert!(store.get().is_none());
    }

    #[test]
    fn test_set_overwrites_previous_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set(&sample_record());

        let user = UserProfile::new("usr-2", "omar@pennyworth.app", "Omar Reyes");
        let replacement = SessionRecord::issued("tok-def", user, 3_600, 2_000_000);
        store.set(&replacement);

        assert_eq!(store.get(), Some(replacement));
    }

    #[test]
    fn test_set_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state/evergreen").join(SLOT_FILE));

        store.set(&sample_record());

        assert!(store.get().is_some());
    }

    #[test]
    fn test_set_leaves_no_staging_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.set(&sample_record());

        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_set_recovers_from_malformed_slot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"garbage").unwrap();
        assert!(store.get().is_none());

        let record = sample_record();
        store.set(&record);

        assert_eq!(store.get(), Some(record));
    }

    #[test]
    fn test_clear_removes_slot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set(&sample_record());

        store.clear();

        assert!(store.get().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.try_clear().is_ok());
        assert!(store.try_clear().is_ok());
    }

    #[test]
    fn test_default_path_ends_with_slot_file() {
        let path = SessionStore::default_path();
        assert!(path.ends_with("evergreen/session.json"), "got {}", path.display());
    }

    #[test]
    fn test_slot_is_valid_pretty_json() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set(&sample_record());

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"accessToken\""));
        assert!(text.contains("\"expiresAt\""));
        assert!(text.contains('\n'), "slot should be pretty-printed");
    }
}
