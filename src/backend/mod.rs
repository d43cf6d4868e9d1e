//! External account backend and provisioning partners.
//!
//! The account backend is the authority on registration and step
//! completion. Card issuance and bank collection accounts come from a
//! provisioning partner behind the `Provisioner` seam.

pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::BackendError;
use crate::profile::{CollectionAccount, CompletionKind, IssuedCard, UserProfile};

pub use http::{HttpAccountBackend, HttpProvisioner};

/// Command body for marking an onboarding step complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepCompletion {
    pub phone: String,
    pub step: CompletionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Read/command interface to the account backend.
#[async_trait]
pub trait AccountBackend: Send + Sync {
    /// Current profile for `handle`, or `None` if the backend has no such user.
    async fn fetch_profile(&self, handle: &str) -> Result<Option<UserProfile>, BackendError>;

    /// Record a completed step. Not-found and wrong-state answers are errors.
    async fn mark_step_complete(&self, completion: &StepCompletion) -> Result<(), BackendError>;
}

/// Card issuing and collection-account partner.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn issue_card(&self, profile: &UserProfile) -> Result<IssuedCard, BackendError>;

    async fn provision_collection_account(
        &self,
        profile: &UserProfile,
    ) -> Result<CollectionAccount, BackendError>;
}
