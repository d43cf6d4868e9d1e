//! Onboarding steps and the completion events that advance them.

use serde::{Deserialize, Serialize};

use super::model::UserProfile;

/// A step of the onboarding journey.
///
/// The main line progresses Registered → KycBasic → Funded. Identity
/// verification and card activation are side steps that can complete in
/// any order once their own prerequisites hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Registered,
    KycBasic,
    Funded,
    IdentityVerified,
    CardActivated,
}

impl OnboardingStep {
    /// Whether `profile` has completed this step.
    pub fn is_satisfied_by(&self, profile: &UserProfile) -> bool {
        match self {
            Self::Registered => true,
            Self::KycBasic => profile.kyc_basic_completed,
            Self::Funded => profile.funding_completed,
            Self::IdentityVerified => profile.identity_verified,
            Self::CardActivated => profile.card_active,
        }
    }

    /// Next step on the main line, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        match self {
            Self::Registered => Some(Self::KycBasic),
            Self::KycBasic => Some(Self::Funded),
            Self::Funded | Self::IdentityVerified | Self::CardActivated => None,
        }
    }

    /// Step that must be complete before this one may be recorded.
    pub fn prerequisite(&self) -> Option<OnboardingStep> {
        match self {
            Self::Registered => None,
            Self::KycBasic | Self::IdentityVerified => Some(Self::Registered),
            Self::Funded => Some(Self::KycBasic),
            Self::CardActivated => Some(Self::Funded),
        }
    }

    /// Furthest main-line step `profile` has reached.
    pub fn progress_of(profile: &UserProfile) -> OnboardingStep {
        let mut current = Self::Registered;
        while let Some(next) = current.next() {
            if !next.is_satisfied_by(profile) {
                break;
            }
            current = next;
        }
        current
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Registered => "registered",
            Self::KycBasic => "kyc_basic",
            Self::Funded => "funded",
            Self::IdentityVerified => "identity_verified",
            Self::CardActivated => "card_activated",
        };
        write!(f, "{s}")
    }
}

/// An externally confirmed step completion, applied by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Registration,
    KycBasic,
    IdentityVerification,
    Funding,
    Activation,
}

impl CompletionKind {
    /// The step this completion satisfies.
    pub fn step(&self) -> OnboardingStep {
        match self {
            Self::Registration => OnboardingStep::Registered,
            Self::KycBasic => OnboardingStep::KycBasic,
            Self::IdentityVerification => OnboardingStep::IdentityVerified,
            Self::Funding => OnboardingStep::Funded,
            Self::Activation => OnboardingStep::CardActivated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::KycBasic => "kyc_basic",
            Self::IdentityVerification => "identity_verification",
            Self::Funding => "funding",
            Self::Activation => "activation",
        }
    }
}

impl std::fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
