//! Side-effect dispatcher: the only writer of profile state.
//!
//! Every completion goes through the same sequence: validate, tell the
//! account backend, record locally in one transaction keyed by the
//! event's idempotency key, then invalidate the cached profile.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::{AccountBackend, Provisioner, StepCompletion};
use crate::error::{BackendError, DatabaseError, DispatchError};
use crate::profile::{
    CollectionAccount, CompletionKind, IssuedCard, ProfileCache, UserProfile, WaitlistEntry,
};
use crate::store::{CompletionWrite, ProfileStore};

/// Reference recorded for policy-granted activations.
pub const FREE_ACTIVATION_REFERENCE: &str = "free-activation";

/// Data carried by a completion event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionPayload {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub card: Option<IssuedCard>,
    #[serde(default)]
    pub account: Option<CollectionAccount>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub waitlist_position: Option<u32>,
}

impl CompletionPayload {
    /// Idempotency key: the reference when present, else `kind:amount`.
    pub fn event_key(&self, kind: CompletionKind) -> String {
        match self.reference.as_deref().map(str::trim) {
            Some(reference) if !reference.is_empty() => reference.to_string(),
            _ => match self.amount {
                Some(amount) => format!("{kind}:{}", amount.normalize()),
                None => format!("{kind}:-"),
            },
        }
    }
}

/// What an `apply` call did.
#[derive(Debug, Clone)]
pub struct ProfileDelta {
    pub handle: String,
    pub kind: CompletionKind,
    /// The event key had been recorded before; amounts were not re-added.
    pub already_applied: bool,
    /// Profile after the call.
    pub profile: UserProfile,
    /// A card was attached by this call.
    pub card_issued: bool,
}

pub struct Dispatcher {
    store: Arc<dyn ProfileStore>,
    backend: Arc<dyn AccountBackend>,
    provisioner: Arc<dyn Provisioner>,
    cache: Arc<ProfileCache>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        backend: Arc<dyn AccountBackend>,
        provisioner: Arc<dyn Provisioner>,
        cache: Arc<ProfileCache>,
    ) -> Self {
        Self {
            store,
            backend,
            provisioner,
            cache,
        }
    }

    /// Apply a completed step for `handle`. Safe to call again with the same
    /// payload.
    pub async fn apply(
        &self,
        kind: CompletionKind,
        handle: &str,
        payload: CompletionPayload,
    ) -> Result<ProfileDelta, DispatchError> {
        validate(kind, handle, &payload)?;
        let event_key = payload.event_key(kind);

        let (mut profile, already_applied) =
            if self.store.has_completion(handle, &event_key).await? {
                debug!(handle, %kind, event_key = %event_key, "Completion redelivered");
                (self.require_local(handle).await?, true)
            } else {
                self.record(kind, handle, &event_key, &payload).await?
            };

        let mut card_issued = false;
        if kind == CompletionKind::Funding && profile.funding_completed && profile.card.is_none() {
            card_issued = self.issue_card(&mut profile).await;
        }

        self.cache.invalidate(handle).await;
        info!(handle, %kind, already_applied, card_issued, "Completion dispatched");

        Ok(ProfileDelta {
            handle: handle.to_string(),
            kind,
            already_applied,
            profile,
            card_issued,
        })
    }

    /// Backend command plus local transaction for a new event. The flag is
    /// set when a concurrent delivery recorded the event first.
    async fn record(
        &self,
        kind: CompletionKind,
        handle: &str,
        event_key: &str,
        payload: &CompletionPayload,
    ) -> Result<(UserProfile, bool), DispatchError> {
        let current = match kind {
            CompletionKind::Registration => self.store.get_profile(handle).await?,
            _ => Some(self.local_or_mirrored(kind, handle).await?),
        };
        // Refuse before the backend hears about it.
        merge_completion(kind, handle, current, payload).map_err(DispatchError::Validation)?;

        let command = StepCompletion {
            phone: handle.to_string(),
            step: kind,
            amount: payload.amount,
            reference: payload.reference.clone(),
        };
        self.backend
            .mark_step_complete(&command)
            .await
            .map_err(|e| backend_failure(kind.as_str(), handle, e))?;

        let merge = |current: Option<UserProfile>| merge_completion(kind, handle, current, payload);
        match self
            .store
            .apply_completion(handle, event_key, kind, &merge)
            .await?
        {
            CompletionWrite::Applied(profile) => Ok((profile, false)),
            CompletionWrite::AlreadyApplied(profile) => {
                Ok((profile.ok_or_else(|| not_found(handle))?, true))
            }
            CompletionWrite::Rejected(reason) => Err(DispatchError::Validation(reason)),
        }
    }

    /// Returns whether a card was attached.
    async fn issue_card(&self, profile: &mut UserProfile) -> bool {
        let handle = profile.handle.clone();
        let card = match self.provisioner.issue_card(profile).await {
            Ok(card) => card,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Card issuance failed; funding stays recorded");
                return false;
            }
        };
        match self.store.attach_card_if_absent(&handle, &card).await {
            Ok(stored) => {
                let attached = stored.as_ref() == Some(&card);
                profile.card = stored;
                attached
            }
            Err(e) => {
                warn!(handle = %handle, error = %e, "Failed to store issued card");
                false
            }
        }
    }

    async fn require_local(&self, handle: &str) -> Result<UserProfile, DispatchError> {
        self.store
            .get_profile(handle)
            .await?
            .ok_or_else(|| not_found(handle))
    }

    /// Local profile, mirroring it from the backend when only the backend
    /// knows the user.
    async fn local_or_mirrored(
        &self,
        kind: CompletionKind,
        handle: &str,
    ) -> Result<UserProfile, DispatchError> {
        if let Some(profile) = self.store.get_profile(handle).await? {
            return Ok(profile);
        }
        let remote = self
            .backend
            .fetch_profile(handle)
            .await
            .map_err(|e| backend_failure(kind.as_str(), handle, e))?
            .ok_or_else(|| DispatchError::Permanent {
                kind: kind.to_string(),
                handle: handle.to_string(),
                source: BackendError::NotFound {
                    service: "accounts".into(),
                    handle: handle.to_string(),
                },
            })?;
        self.store.insert_profile_if_absent(&remote).await?;
        self.require_local(handle).await
    }

    /// Stored collection account, provisioning one on first use.
    pub async fn ensure_collection_account(
        &self,
        handle: &str,
    ) -> Result<CollectionAccount, DispatchError> {
        let profile = self.require_local(handle).await?;
        if let Some(account) = profile.collection_account {
            return Ok(account);
        }

        let account = self
            .provisioner
            .provision_collection_account(&profile)
            .await
            .map_err(|e| backend_failure("collection_account", handle, e))?;
        let stored = self
            .store
            .attach_collection_account_if_absent(handle, &account)
            .await?
            .unwrap_or(account);

        self.cache.invalidate(handle).await;
        info!(handle, bank = %stored.bank_name, "Collection account assigned");
        Ok(stored)
    }

    /// Activate the card without payment.
    pub async fn grant_free_activation(&self, handle: &str) -> Result<ProfileDelta, DispatchError> {
        let payload = CompletionPayload {
            reference: Some(FREE_ACTIVATION_REFERENCE.to_string()),
            ..Default::default()
        };
        self.apply(CompletionKind::Activation, handle, payload).await
    }

    /// Record that the congratulation sequence went out. Returns false if it
    /// had already been recorded.
    pub async fn mark_congratulated(&self, handle: &str) -> Result<bool, DispatchError> {
        let updated = self.store.mark_congratulated(handle, Utc::now()).await?;
        self.cache.invalidate(handle).await;
        Ok(updated)
    }
}

// ── Validation and merge ────────────────────────────────────────────

fn not_found(handle: &str) -> DispatchError {
    DispatchError::Store(DatabaseError::NotFound {
        entity: "profile".into(),
        id: handle.to_string(),
    })
}

fn backend_failure(kind: &str, handle: &str, source: BackendError) -> DispatchError {
    if source.is_retryable() {
        DispatchError::Retryable {
            kind: kind.to_string(),
            handle: handle.to_string(),
            source,
        }
    } else {
        DispatchError::Permanent {
            kind: kind.to_string(),
            handle: handle.to_string(),
            source,
        }
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn validate(
    kind: CompletionKind,
    handle: &str,
    payload: &CompletionPayload,
) -> Result<(), DispatchError> {
    if handle.is_empty() || !handle.chars().all(|c| c.is_ascii_digit()) {
        return Err(DispatchError::Validation(format!(
            "handle '{handle}' must be a non-empty digit string"
        )));
    }
    if let Some(amount) = payload.amount.filter(|a| *a <= Decimal::ZERO) {
        return Err(DispatchError::Validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    match kind {
        CompletionKind::Funding if payload.amount.is_none() => Err(DispatchError::Validation(
            "funding requires an amount".into(),
        )),
        CompletionKind::Registration
            if !non_blank(&payload.email)
                && !non_blank(&payload.first_name)
                && !non_blank(&payload.last_name) =>
        {
            Err(DispatchError::Validation(
                "registration requires an email or a name".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// Profile after applying `kind`; `Err` explains a refusal.
fn merge_completion(
    kind: CompletionKind,
    handle: &str,
    current: Option<UserProfile>,
    payload: &CompletionPayload,
) -> Result<UserProfile, String> {
    let mut profile = match (kind, current) {
        (_, Some(p)) => p,
        (CompletionKind::Registration, None) => UserProfile::new(handle),
        (_, None) => return Err(format!("no profile for {handle}")),
    };

    if let Some(required) = kind.step().prerequisite() {
        if !required.is_satisfied_by(&profile) {
            return Err(format!("{kind} requires {required} first"));
        }
    }

    match kind {
        CompletionKind::Registration => {
            for (field, value) in [
                (&mut profile.first_name, &payload.first_name),
                (&mut profile.last_name, &payload.last_name),
                (&mut profile.email, &payload.email),
            ] {
                if non_blank(value) {
                    *field = value.as_ref().map(|v| v.trim().to_string());
                }
            }
            if let Some(position) = payload.waitlist_position {
                profile.waitlist = Some(WaitlistEntry { position });
            }
        }
        CompletionKind::KycBasic => profile.kyc_basic_completed = true,
        CompletionKind::IdentityVerification => profile.identity_verified = true,
        CompletionKind::Funding => {
            let amount = payload.amount.unwrap_or_default();
            profile.funding_completed = true;
            profile.funded_amount += amount;
            profile.balance = Some(profile.display_balance() + amount);
        }
        CompletionKind::Activation => profile.card_active = true,
    }

    if profile.card.is_none() {
        profile.card = payload.card.clone();
    }
    if profile.collection_account.is_none() {
        profile.collection_account = payload.account.clone();
    }
    profile.updated_at = Utc::now();

    profile.check_invariants().map_err(|violations| {
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    })?;
    Ok(profile)
}
