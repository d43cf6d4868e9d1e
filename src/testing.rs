//! In-process stand-ins for the backend, provisioner and channel.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;

use crate::backend::{AccountBackend, Provisioner, StepCompletion};
use crate::channels::{OutboundChannel, OutboundMessage};
use crate::error::{BackendError, ChannelError};
use crate::profile::{CollectionAccount, IssuedCard, UserProfile};

/// Failure a stub should return on its next calls.
#[derive(Debug, Clone, Copy)]
pub enum StubFailure {
    Timeout,
    NotFound,
    Rejected,
}

impl StubFailure {
    fn to_error(self, handle: &str) -> BackendError {
        match self {
            Self::Timeout => BackendError::Timeout {
                service: "stub".into(),
                timeout: Duration::from_secs(8),
            },
            Self::NotFound => BackendError::NotFound {
                service: "stub".into(),
                handle: handle.to_string(),
            },
            Self::Rejected => BackendError::Rejected {
                service: "stub".into(),
                status: 409,
                reason: "step not allowed".into(),
            },
        }
    }
}

// ── Account backend ─────────────────────────────────────────────────

#[derive(Default)]
pub struct StubBackend {
    profiles: Mutex<HashMap<String, UserProfile>>,
    fetch_failure: Mutex<Option<StubFailure>>,
    mark_failure: Mutex<Option<StubFailure>>,
    fetches: AtomicUsize,
    completions: Mutex<Vec<StepCompletion>>,
}

impl StubBackend {
    pub fn put_profile(&self, profile: UserProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.handle.clone(), profile);
    }

    pub fn fail_fetch(&self, failure: StubFailure) {
        *self.fetch_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_mark(&self, failure: StubFailure) {
        *self.mark_failure.lock().unwrap() = Some(failure);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> Vec<StepCompletion> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountBackend for StubBackend {
    async fn fetch_profile(&self, handle: &str) -> Result<Option<UserProfile>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.fetch_failure.lock().unwrap() {
            return Err(failure.to_error(handle));
        }
        Ok(self.profiles.lock().unwrap().get(handle).cloned())
    }

    async fn mark_step_complete(&self, completion: &StepCompletion) -> Result<(), BackendError> {
        if let Some(failure) = *self.mark_failure.lock().unwrap() {
            return Err(failure.to_error(&completion.phone));
        }
        self.completions.lock().unwrap().push(completion.clone());
        Ok(())
    }
}

// ── Provisioner ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct StubProvisioner {
    card_failure: Mutex<Option<StubFailure>>,
    account_failure: Mutex<Option<StubFailure>>,
    cards_issued: AtomicUsize,
    accounts_provisioned: AtomicUsize,
}

pub fn sample_card() -> IssuedCard {
    IssuedCard {
        number: "4111 2222 3333 4444".into(),
        expiry: "09/29".into(),
        cvv: "321".into(),
        billing_descriptor: Some("TOKI*CARD".into()),
    }
}

pub fn sample_account() -> CollectionAccount {
    CollectionAccount {
        bank_name: "Providus Bank".into(),
        account_number: "9812345678".into(),
        account_name: "TOKI-Ada Obi".into(),
        rate: dec!(1520),
    }
}

impl StubProvisioner {
    pub fn fail_cards(&self, failure: Option<StubFailure>) {
        *self.card_failure.lock().unwrap() = failure;
    }

    pub fn fail_accounts(&self, failure: Option<StubFailure>) {
        *self.account_failure.lock().unwrap() = failure;
    }

    pub fn cards_issued(&self) -> usize {
        self.cards_issued.load(Ordering::SeqCst)
    }

    pub fn accounts_provisioned(&self) -> usize {
        self.accounts_provisioned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provisioner for StubProvisioner {
    async fn issue_card(&self, profile: &UserProfile) -> Result<IssuedCard, BackendError> {
        if let Some(failure) = *self.card_failure.lock().unwrap() {
            return Err(failure.to_error(&profile.handle));
        }
        self.cards_issued.fetch_add(1, Ordering::SeqCst);
        Ok(sample_card())
    }

    async fn provision_collection_account(
        &self,
        profile: &UserProfile,
    ) -> Result<CollectionAccount, BackendError> {
        if let Some(failure) = *self.account_failure.lock().unwrap() {
            return Err(failure.to_error(&profile.handle));
        }
        self.accounts_provisioned.fetch_add(1, Ordering::SeqCst);
        Ok(sample_account())
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// Records every message; sends to handles in `failing` fail.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingChannel {
    pub fn fail_for(&self, handle: &str) {
        self.failing.lock().unwrap().insert(handle.to_string());
    }

    pub fn recover(&self, handle: &str) {
        self.failing.lock().unwrap().remove(handle);
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, handle: &str) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == handle)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        if self.failing.lock().unwrap().contains(to) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "handle marked as failing".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.clone()));
        Ok(())
    }
}
