//! `ProfileStore`: async interface for profile persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::profile::{CollectionAccount, CompletionKind, IssuedCard, UserProfile};

/// Computes the updated profile from the stored one (if any).
///
/// An `Err` aborts the write; the message explains the refusal.
pub type ProfileMerge<'a> =
    dyn Fn(Option<UserProfile>) -> Result<UserProfile, String> + Send + Sync + 'a;

/// Result of an idempotent completion write.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionWrite {
    /// The event was new; the merged profile was stored.
    Applied(UserProfile),
    /// The event key was recorded earlier; nothing changed.
    AlreadyApplied(Option<UserProfile>),
    /// The merge refused the update; nothing changed.
    Rejected(String),
}

/// Backend-agnostic persistence for user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, handle: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Insert a profile mirrored from the account backend. Existing rows win.
    /// Returns whether a row was inserted.
    async fn insert_profile_if_absent(&self, profile: &UserProfile)
    -> Result<bool, DatabaseError>;

    /// Bring the stored row up to date with the account backend's view.
    ///
    /// Inserts `remote` when no row exists. Otherwise step flags and missing
    /// records are folded in forward-only and local bookkeeping is kept.
    /// Returns the row as stored afterwards.
    async fn sync_remote_profile(&self, remote: &UserProfile)
    -> Result<UserProfile, DatabaseError>;

    /// Users who completed every step and have not been congratulated yet.
    async fn list_awaiting_congratulation(&self) -> Result<Vec<UserProfile>, DatabaseError>;

    /// Set the congratulated flag. Returns false if it was already set.
    async fn mark_congratulated(
        &self,
        handle: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    // ── Completion events ───────────────────────────────────────────

    /// Whether `event_key` was already applied for `handle`.
    async fn has_completion(&self, handle: &str, event_key: &str) -> Result<bool, DatabaseError>;

    /// Atomically record `event_key` and store the merged profile.
    async fn apply_completion(
        &self,
        handle: &str,
        event_key: &str,
        kind: CompletionKind,
        merge: &ProfileMerge<'_>,
    ) -> Result<CompletionWrite, DatabaseError>;

    /// Attach an issued card unless one is already stored.
    /// Returns the card now on the profile.
    async fn attach_card_if_absent(
        &self,
        handle: &str,
        card: &IssuedCard,
    ) -> Result<Option<IssuedCard>, DatabaseError>;

    /// Attach a collection account unless one is already stored.
    /// Returns the account now on the profile.
    async fn attach_collection_account_if_absent(
        &self,
        handle: &str,
        account: &CollectionAccount,
    ) -> Result<Option<CollectionAccount>, DatabaseError>;
}
