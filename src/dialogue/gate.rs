//! Permission check between intent and action.
//!
//! Prerequisites form a partial order:
//! register < kyc < fund < {balance, card, activate}.

use crate::intent::Intent;
use crate::profile::{OnboardingStep, UserProfile};

/// What a user must have done before an intent is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Anyone, including unknown users.
    Public,
    Registered,
    KycBasic,
    Funded,
    /// Funded, with a card record on file.
    CardIssued,
}

pub fn requirement(intent: Intent) -> Requirement {
    match intent {
        Intent::Register
        | Intent::About
        | Intent::Help
        | Intent::How
        | Intent::Security
        | Intent::Fees
        | Intent::Features
        | Intent::Greeting => Requirement::Public,
        Intent::Kyc | Intent::Referral | Intent::Acknowledge | Intent::Followup | Intent::None => {
            Requirement::Registered
        }
        Intent::Fund | Intent::CryptoFund | Intent::FiatFund => Requirement::KycBasic,
        Intent::Balance | Intent::Activate => Requirement::Funded,
        Intent::Card => Requirement::CardIssued,
    }
}

/// Which corrective prompt to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Register,
    Kyc,
    Fund,
    /// Funded but the card has not arrived from the issuer yet.
    CardInProgress,
}

impl PromptKind {
    /// The step the user still has to complete.
    pub fn missing_step(&self) -> OnboardingStep {
        match self {
            Self::Register => OnboardingStep::Registered,
            Self::Kyc => OnboardingStep::KycBasic,
            Self::Fund | Self::CardInProgress => OnboardingStep::Funded,
        }
    }
}

/// A redirect issued instead of serving `blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptSpec {
    pub kind: PromptKind,
    pub blocked: Intent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub allowed: bool,
    pub redirect: Option<PromptSpec>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            redirect: None,
        }
    }

    fn redirect(kind: PromptKind, blocked: Intent) -> Self {
        Self {
            allowed: false,
            redirect: Some(PromptSpec { kind, blocked }),
        }
    }
}

/// Decide whether `intent` may be served for `profile` (`None` = unknown user).
pub fn authorize(intent: Intent, profile: Option<&UserProfile>) -> GateDecision {
    let required = requirement(intent);
    if required == Requirement::Public {
        return GateDecision::allow();
    }

    let Some(profile) = profile else {
        return GateDecision::redirect(PromptKind::Register, intent);
    };

    let needs_kyc = matches!(
        required,
        Requirement::KycBasic | Requirement::Funded | Requirement::CardIssued
    );
    if needs_kyc && !profile.kyc_basic_completed {
        return GateDecision::redirect(PromptKind::Kyc, intent);
    }

    let needs_funding = matches!(required, Requirement::Funded | Requirement::CardIssued);
    if needs_funding && !profile.funding_completed {
        return GateDecision::redirect(PromptKind::Fund, intent);
    }

    if required == Requirement::CardIssued && profile.card.is_none() {
        return GateDecision::redirect(PromptKind::CardInProgress, intent);
    }

    GateDecision::allow()
}
