//! reqwest clients for the account backend and the provisioning partner.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::{AccountBackend, Provisioner, StepCompletion};
use crate::error::BackendError;
use crate::profile::{CollectionAccount, IssuedCard, UserProfile, WaitlistEntry};

const ACCOUNTS: &str = "accounts";
const PROVISIONER: &str = "provisioner";

/// Bank used when the partner does not name one.
const DEFAULT_BANK_NAME: &str = "Providus Bank";

/// Build a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| BackendError::Unavailable {
            service: "http".into(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ── Error mapping ───────────────────────────────────────────────────

fn transport_error(service: &str, timeout: Duration, e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout {
            service: service.into(),
            timeout,
        }
    } else {
        BackendError::Unavailable {
            service: service.into(),
            reason: e.to_string(),
        }
    }
}

/// Map a non-success status to an error. 404 and 4xx are definitive,
/// 429 and 5xx are transient.
fn status_error(service: &str, handle: &str, status: StatusCode, body: String) -> BackendError {
    if status == StatusCode::NOT_FOUND {
        BackendError::NotFound {
            service: service.into(),
            handle: handle.into(),
        }
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        BackendError::Unavailable {
            service: service.into(),
            reason: format!("{status}: {body}"),
        }
    } else {
        BackendError::Rejected {
            service: service.into(),
            status: status.as_u16(),
            reason: body,
        }
    }
}

async fn ensure_success(
    service: &str,
    handle: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(service, handle, status, body))
}

fn retry_delay() -> Duration {
    let jitter = rand::thread_rng().gen_range(100..400);
    Duration::from_millis(jitter)
}

// ── Wire types ──────────────────────────────────────────────────────

/// User record as the account backend returns it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteUser {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    kyc_basic_completed: bool,
    funding_completed: bool,
    #[serde(alias = "verifyCompleted")]
    identity_verified: bool,
    card_active: bool,
    funded_amount: Option<Decimal>,
    balance: Option<Decimal>,
    virtual_account: Option<RemoteAccount>,
    card: Option<RemoteCard>,
    #[serde(alias = "congratsSent")]
    congratulated: Option<bool>,
    waitlist_position: Option<u32>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteCard {
    number: Option<String>,
    expiry: String,
    cvv: String,
    billing_descriptor: Option<String>,
}

impl RemoteCard {
    fn into_card(self) -> Option<IssuedCard> {
        let number = self.number.filter(|n| !n.trim().is_empty())?;
        Some(IssuedCard {
            number,
            expiry: self.expiry,
            cvv: self.cvv,
            billing_descriptor: self.billing_descriptor,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RemoteAccount {
    bank_name: Option<String>,
    account_number: String,
    account_name: Option<String>,
    rate: Option<Decimal>,
}

impl RemoteAccount {
    fn into_account(self, fallback_name: String, fallback_rate: Decimal) -> Option<CollectionAccount> {
        if self.account_number.trim().is_empty() {
            return None;
        }
        Some(CollectionAccount {
            bank_name: self.bank_name.unwrap_or_else(|| DEFAULT_BANK_NAME.to_string()),
            account_number: self.account_number,
            account_name: self.account_name.unwrap_or(fallback_name),
            rate: self.rate.unwrap_or(fallback_rate),
        })
    }
}

impl RemoteUser {
    fn into_profile(self, handle: &str, default_rate: Decimal) -> UserProfile {
        let mut profile = UserProfile::new(handle);
        let account_name = collection_account_name(&self.first_name, &self.last_name);
        profile.first_name = self.first_name;
        profile.last_name = self.last_name;
        profile.email = self.email;
        profile.kyc_basic_completed = self.kyc_basic_completed;
        profile.funding_completed = self.funding_completed;
        profile.identity_verified = self.identity_verified;
        profile.card_active = self.card_active;
        profile.funded_amount = self.funded_amount.unwrap_or(Decimal::ZERO);
        profile.balance = self.balance;
        profile.collection_account = self
            .virtual_account
            .and_then(|a| a.into_account(account_name, default_rate));
        profile.card = self.card.and_then(RemoteCard::into_card);
        profile.congratulated = self.congratulated.unwrap_or(false);
        profile.waitlist = self.waitlist_position.map(|position| WaitlistEntry { position });
        if let Some(created) = self.created_at {
            profile.created_at = created;
        }
        profile
    }
}

/// "TOKI-First Last", the name shown on a user's collection account.
pub fn collection_account_name(first: &Option<String>, last: &Option<String>) -> String {
    let name = [first.as_deref(), last.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() {
        "TOKI-Customer".to_string()
    } else {
        format!("TOKI-{name}")
    }
}

// ── Account backend ─────────────────────────────────────────────────

/// Account backend over HTTP: `GET {base}/user?phone=` and
/// `POST {base}/steps/complete`.
pub struct HttpAccountBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    default_rate: Decimal,
}

impl HttpAccountBackend {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        default_rate: Decimal,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            default_rate,
        })
    }

    async fn fetch_once(&self, handle: &str) -> Result<Option<UserProfile>, BackendError> {
        let resp = self
            .client
            .get(format!("{}/user", self.base_url))
            .query(&[("phone", handle)])
            .send()
            .await
            .map_err(|e| transport_error(ACCOUNTS, self.timeout, e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(ACCOUNTS, handle, resp).await?;

        let user: Option<RemoteUser> =
            resp.json().await.map_err(|e| BackendError::InvalidResponse {
                service: ACCOUNTS.into(),
                reason: e.to_string(),
            })?;
        Ok(user.map(|u| u.into_profile(handle, self.default_rate)))
    }
}

#[async_trait]
impl AccountBackend for HttpAccountBackend {
    async fn fetch_profile(&self, handle: &str) -> Result<Option<UserProfile>, BackendError> {
        match self.fetch_once(handle).await {
            Err(e) if e.is_retryable() => {
                let delay = retry_delay();
                tracing::warn!(handle, error = %e, ?delay, "Profile lookup failed, retrying once");
                tokio::time::sleep(delay).await;
                self.fetch_once(handle).await
            }
            other => other,
        }
    }

    async fn mark_step_complete(&self, completion: &StepCompletion) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(format!("{}/steps/complete", self.base_url))
            .json(completion)
            .send()
            .await
            .map_err(|e| transport_error(ACCOUNTS, self.timeout, e))?;

        ensure_success(ACCOUNTS, &completion.phone, resp).await?;
        tracing::debug!(handle = %completion.phone, step = %completion.step, "Backend step marked complete");
        Ok(())
    }
}

// ── Provisioner ─────────────────────────────────────────────────────

/// Provisioning partner over HTTP: `POST {base}/cards` and
/// `POST {base}/collection-accounts`.
pub struct HttpProvisioner {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    default_rate: Decimal,
}

impl HttpProvisioner {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        default_rate: Decimal,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            default_rate,
        })
    }

    async fn post(
        &self,
        path: &str,
        handle: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVISIONER, self.timeout, e))?;
        ensure_success(PROVISIONER, handle, resp).await
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn issue_card(&self, profile: &UserProfile) -> Result<IssuedCard, BackendError> {
        let body = json!({
            "phone": profile.handle,
            "firstName": profile.first_name,
            "lastName": profile.last_name,
            "email": profile.email,
        });
        let resp = self.post("cards", &profile.handle, body).await?;
        let card: RemoteCard = resp.json().await.map_err(|e| BackendError::InvalidResponse {
            service: PROVISIONER.into(),
            reason: e.to_string(),
        })?;
        card.into_card().ok_or_else(|| BackendError::InvalidResponse {
            service: PROVISIONER.into(),
            reason: "issued card has no number".into(),
        })
    }

    async fn provision_collection_account(
        &self,
        profile: &UserProfile,
    ) -> Result<CollectionAccount, BackendError> {
        let account_name = collection_account_name(&profile.first_name, &profile.last_name);
        let body = json!({
            "phone": profile.handle,
            "accountName": account_name,
        });
        let resp = self.post("collection-accounts", &profile.handle, body).await?;
        let account: RemoteAccount =
            resp.json().await.map_err(|e| BackendError::InvalidResponse {
                service: PROVISIONER.into(),
                reason: e.to_string(),
            })?;
        account
            .into_account(account_name, self.default_rate)
            .ok_or_else(|| BackendError::InvalidResponse {
                service: PROVISIONER.into(),
                reason: "collection account has no account number".into(),
            })
    }
}
