//! Intent resolution: maps an utterance or a tapped choice to an intent.

pub mod catalog;
pub mod classifier;

use serde::{Deserialize, Serialize};

pub use catalog::{CATALOG, CATALOG_VERSION, GREETINGS, IntentPhrases};
pub use classifier::{FUZZY_THRESHOLD, classify, normalize, similarity};

/// Prefix of choice ids that name an intent directly.
pub const SELECTION_PREFIX: &str = "intent:";

/// Everything a user can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    Register,
    Kyc,
    Fund,
    CryptoFund,
    FiatFund,
    Balance,
    Card,
    Activate,
    Help,
    About,
    How,
    Security,
    Fees,
    Features,
    Referral,
    Acknowledge,
    Followup,
    Greeting,
    None,
}

impl Intent {
    pub const ALL: [Intent; 19] = [
        Intent::Register,
        Intent::Kyc,
        Intent::Fund,
        Intent::CryptoFund,
        Intent::FiatFund,
        Intent::Balance,
        Intent::Card,
        Intent::Activate,
        Intent::Help,
        Intent::About,
        Intent::How,
        Intent::Security,
        Intent::Fees,
        Intent::Features,
        Intent::Referral,
        Intent::Acknowledge,
        Intent::Followup,
        Intent::Greeting,
        Intent::None,
    ];

    /// Stable identifier used in choice ids and logs.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Kyc => "kyc",
            Self::Fund => "fund",
            Self::CryptoFund => "crypto-fund",
            Self::FiatFund => "fiat-fund",
            Self::Balance => "balance",
            Self::Card => "card",
            Self::Activate => "activate",
            Self::Help => "help",
            Self::About => "about",
            Self::How => "how",
            Self::Security => "security",
            Self::Fees => "fees",
            Self::Features => "features",
            Self::Referral => "referral",
            Self::Acknowledge => "acknowledge",
            Self::Followup => "followup",
            Self::Greeting => "greeting",
            Self::None => "none",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Intent> {
        Self::ALL.into_iter().find(|i| i.slug() == slug)
    }

    /// Choice id that resolves straight back to this intent.
    pub fn selection_id(&self) -> String {
        format!("{SELECTION_PREFIX}{}", self.slug())
    }

    /// Parse an `intent:<slug>` choice id.
    pub fn from_selection_id(id: &str) -> Option<Intent> {
        id.trim().strip_prefix(SELECTION_PREFIX).and_then(Self::from_slug)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}
