//! User profile data model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-user bank account used for NGN transfers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    /// NGN per USD quoted when the account was assigned.
    pub rate: Decimal,
}

/// Virtual card record as returned by the issuing partner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedCard {
    /// Formatted card number. Only ever shown in its own message.
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_descriptor: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitlistEntry {
    /// 1-based position on the pre-launch waitlist.
    pub position: u32,
}

/// Onboarding and funding state for one user, keyed by phone handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub kyc_basic_completed: bool,
    pub funding_completed: bool,
    pub identity_verified: bool,
    pub card_active: bool,
    /// Sum of all confirmed deposits.
    pub funded_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_account: Option<CollectionAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<IssuedCard>,
    pub congratulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congratulated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waitlist: Option<WaitlistEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// A freshly registered profile with no completed steps.
    pub fn new(handle: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            handle: handle.into(),
            first_name: None,
            last_name: None,
            email: None,
            kyc_basic_completed: false,
            funding_completed: false,
            identity_verified: false,
            card_active: false,
            funded_amount: Decimal::ZERO,
            balance: None,
            collection_account: None,
            card: None,
            congratulated: false,
            congratulated_at: None,
            waitlist: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", whichever parts are known.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Balance to display; unknown balances count as zero.
    pub fn display_balance(&self) -> Decimal {
        self.balance.unwrap_or(Decimal::ZERO)
    }

    /// All steps the completion sweeper waits for are done.
    pub fn is_fully_onboarded(&self) -> bool {
        self.kyc_basic_completed && self.funding_completed && self.identity_verified
    }

    /// Due for the one-time congratulation sequence.
    pub fn awaiting_congratulation(&self) -> bool {
        self.is_fully_onboarded() && !self.congratulated && !self.handle.is_empty()
    }

    /// Fold the account backend's view of this user into the local row.
    ///
    /// Step flags only move from false to true, and records the backend
    /// knows about fill gaps without replacing local ones. The backend's
    /// balance is authoritative when it reports one. Returns whether
    /// anything changed.
    pub fn absorb_remote(&mut self, remote: &UserProfile) -> bool {
        let before = self.clone();

        self.kyc_basic_completed |= remote.kyc_basic_completed;
        self.funding_completed |= remote.funding_completed;
        self.identity_verified |= remote.identity_verified;
        self.card_active |= remote.card_active;
        if remote.congratulated && !self.congratulated {
            self.congratulated = true;
            self.congratulated_at = remote.congratulated_at.or_else(|| Some(Utc::now()));
        }

        for (field, value) in [
            (&mut self.first_name, &remote.first_name),
            (&mut self.last_name, &remote.last_name),
            (&mut self.email, &remote.email),
        ] {
            if field.is_none() {
                *field = value.clone();
            }
        }
        if self.card.is_none() {
            self.card = remote.card.clone();
        }
        if self.collection_account.is_none() {
            self.collection_account = remote.collection_account.clone();
        }
        if self.waitlist.is_none() {
            self.waitlist = remote.waitlist;
        }

        self.funded_amount = self.funded_amount.max(remote.funded_amount);
        if remote.balance.is_some() {
            self.balance = remote.balance;
        }

        let changed = *self != before;
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }

    /// Report every broken structural invariant.
    pub fn check_invariants(&self) -> Result<(), Vec<ProfileInvariant>> {
        let mut violations = Vec::new();
        if self.funding_completed && !self.kyc_basic_completed {
            violations.push(ProfileInvariant::FundedWithoutKyc);
        }
        if self.card.is_some() && !self.funding_completed {
            violations.push(ProfileInvariant::CardWithoutFunding);
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// A structural rule a stored profile must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProfileInvariant {
    #[error("funding completed before basic KYC")]
    FundedWithoutKyc,
    #[error("card issued before funding completed")]
    CardWithoutFunding,
}

/// Reduce a raw sender id to its digits. Returns `None` if nothing is left.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() { None } else { Some(digits) }
}

// ── Activation policy ───────────────────────────────────────────────

/// Which users get card activation without paying the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationPolicy {
    /// Everyone pays.
    None,
    /// Any waitlist member activates for free.
    AnyWaitlistMember,
    /// Waitlist members strictly below this position activate for free.
    WaitlistBelow(u32),
}

impl ActivationPolicy {
    pub fn grants_free_activation(&self, profile: &UserProfile) -> bool {
        match (self, profile.waitlist) {
            (Self::None, _) | (_, None) => false,
            (Self::AnyWaitlistMember, Some(_)) => true,
            (Self::WaitlistBelow(limit), Some(entry)) => entry.position < *limit,
        }
    }
}

impl std::str::FromStr for ActivationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "none" => Ok(Self::None),
            "waitlist" => Ok(Self::AnyWaitlistMember),
            _ => match s.strip_prefix("waitlist_below:") {
                Some(n) => n
                    .parse()
                    .map(Self::WaitlistBelow)
                    .map_err(|e| format!("bad waitlist limit '{n}': {e}")),
                None => Err(format!(
                    "unknown activation policy '{s}' (expected none, waitlist or waitlist_below:<n>)"
                )),
            },
        }
    }
}

impl std::fmt::Display for ActivationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::AnyWaitlistMember => write!(f, "waitlist"),
            Self::WaitlistBelow(n) => write!(f, "waitlist_below:{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn funded_profile() -> UserProfile {
        let mut p = UserProfile::new("2348012345678");
        p.kyc_basic_completed = true;
        p.funding_completed = true;
        p.funded_amount = dec!(5);
        p
    }

    #[test]
    fn new_profile_is_blank() {
        let p = UserProfile::new("2348012345678");
        assert!(!p.kyc_basic_completed);
        assert_eq!(p.funded_amount, Decimal::ZERO);
        assert_eq!(p.display_balance(), Decimal::ZERO);
        assert!(p.check_invariants().is_ok());
    }

    #[test]
    fn invariants_detect_out_of_order_state() {
        let mut p = UserProfile::new("1");
        p.funding_completed = true;
        p.card = Some(IssuedCard {
            number: "4111 1111 1111 1111".into(),
            expiry: "09/29".into(),
            cvv: "123".into(),
            billing_descriptor: None,
        });
        assert_eq!(
            p.check_invariants(),
            Err(vec![ProfileInvariant::FundedWithoutKyc])
        );

        p.funding_completed = false;
        p.kyc_basic_completed = true;
        assert_eq!(
            p.check_invariants(),
            Err(vec![ProfileInvariant::CardWithoutFunding])
        );
    }

    #[test]
    fn full_name_skips_missing_parts() {
        let mut p = UserProfile::new("1");
        assert_eq!(p.full_name(), None);
        p.first_name = Some("Ada".into());
        assert_eq!(p.full_name().as_deref(), Some("Ada"));
        p.last_name = Some("Obi".into());
        assert_eq!(p.full_name().as_deref(), Some("Ada Obi"));
    }

    #[test]
    fn congratulation_predicate() {
        let mut p = funded_profile();
        assert!(!p.awaiting_congratulation());
        p.identity_verified = true;
        assert!(p.awaiting_congratulation());
        p.congratulated = true;
        assert!(!p.awaiting_congratulation());
    }

    #[test]
    fn absorbing_remote_state_only_moves_forward() {
        let mut local = UserProfile::new("1");
        local.first_name = Some("Ada".into());
        local.kyc_basic_completed = true;

        let mut remote = UserProfile::new("1");
        remote.first_name = Some("Adaeze".into());
        remote.email = Some("ada@example.com".into());
        remote.identity_verified = true;
        remote.waitlist = Some(WaitlistEntry { position: 12 });

        assert!(local.absorb_remote(&remote));
        assert!(local.kyc_basic_completed, "local progress kept");
        assert!(local.identity_verified, "remote progress adopted");
        assert_eq!(local.first_name.as_deref(), Some("Ada"));
        assert_eq!(local.email.as_deref(), Some("ada@example.com"));
        assert_eq!(local.waitlist, Some(WaitlistEntry { position: 12 }));

        // Nothing new the second time.
        assert!(!local.absorb_remote(&remote));
    }

    #[test]
    fn absorbing_remote_keeps_funding_and_takes_balance() {
        let mut local = funded_profile();
        local.balance = Some(dec!(5));

        let mut remote = UserProfile::new("2348012345678");
        remote.kyc_basic_completed = true;
        remote.funded_amount = dec!(2);
        remote.balance = Some(dec!(3.5));

        local.absorb_remote(&remote);
        assert!(local.funding_completed);
        assert_eq!(local.funded_amount, dec!(5));
        assert_eq!(local.balance, Some(dec!(3.5)));
    }

    #[test]
    fn normalize_handle_keeps_digits() {
        assert_eq!(normalize_handle("+234 801-234-5678").as_deref(), Some("2348012345678"));
        assert_eq!(normalize_handle("abc"), None);
        assert_eq!(normalize_handle(""), None);
    }

    #[test]
    fn activation_policy_parsing() {
        assert_eq!("none".parse(), Ok(ActivationPolicy::None));
        assert_eq!("Waitlist".parse(), Ok(ActivationPolicy::AnyWaitlistMember));
        assert_eq!(
            "waitlist_below:250".parse(),
            Ok(ActivationPolicy::WaitlistBelow(250))
        );
        assert!("waitlist_below:many".parse::<ActivationPolicy>().is_err());
        assert!("free".parse::<ActivationPolicy>().is_err());
    }

    #[test]
    fn activation_policy_display_round_trips() {
        for policy in [
            ActivationPolicy::None,
            ActivationPolicy::AnyWaitlistMember,
            ActivationPolicy::WaitlistBelow(500),
        ] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }

    #[test]
    fn activation_policy_rules() {
        let mut p = funded_profile();
        assert!(!ActivationPolicy::AnyWaitlistMember.grants_free_activation(&p));

        p.waitlist = Some(WaitlistEntry { position: 499 });
        assert!(ActivationPolicy::WaitlistBelow(500).grants_free_activation(&p));
        assert!(ActivationPolicy::AnyWaitlistMember.grants_free_activation(&p));
        assert!(!ActivationPolicy::None.grants_free_activation(&p));

        p.waitlist = Some(WaitlistEntry { position: 500 });
        assert!(!ActivationPolicy::WaitlistBelow(500).grants_free_activation(&p));
        assert!(ActivationPolicy::AnyWaitlistMember.grants_free_activation(&p));
    }

    #[test]
    fn profile_serde_roundtrip() {
        let mut p = funded_profile();
        p.balance = Some(dec!(12.5));
        p.collection_account = Some(CollectionAccount {
            bank_name: "Providus Bank".into(),
            account_number: "9812345678".into(),
            account_name: "TOKI-Ada Obi".into(),
            rate: dec!(1520),
        });

        let json = serde_json::to_string(&p).unwrap();
        let parsed: UserProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }
}
