//! Phrase registry for intent matching.
//!
//! Entries are listed in substring-match priority order: specific and
//! informational intents come before the broad ones that would otherwise
//! shadow them, and action verbs (fund, balance, register) come before the
//! generic card phrases so "fund my card" is a funding request. Bump
//! `CATALOG_VERSION` whenever phrases or their order change.

use super::Intent;

pub const CATALOG_VERSION: u32 = 4;

/// Phrases registered for one intent.
#[derive(Debug)]
pub struct IntentPhrases {
    pub intent: Intent,
    pub phrases: &'static [&'static str],
}

/// Matched only as the whole message, and only for typed text.
pub const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

pub static CATALOG: &[IntentPhrases] = &[
    IntentPhrases {
        intent: Intent::CryptoFund,
        phrases: &[
            "fund with crypto",
            "crypto funding",
            "stablecoin",
            "cryptocurrency",
            "crypto",
            "usdt",
            "bitcoin",
            "btc",
        ],
    },
    IntentPhrases {
        intent: Intent::FiatFund,
        phrases: &[
            "bank transfer (ngn)",
            "fund with bank",
            "ngn funding",
            "bank transfer",
            "fiat",
        ],
    },
    IntentPhrases {
        intent: Intent::About,
        phrases: &["what is toki", "toki card", "about", "information", "info"],
    },
    IntentPhrases {
        intent: Intent::Activate,
        phrases: &[
            "pay activation",
            "activation fee",
            "card activation",
            "free activation",
            "activation",
        ],
    },
    IntentPhrases {
        intent: Intent::Security,
        phrases: &["is it safe", "security", "secure", "safe", "trust"],
    },
    IntentPhrases {
        intent: Intent::Fees,
        phrases: &["pricing", "charges", "price", "cost", "fee"],
    },
    IntentPhrases {
        intent: Intent::Features,
        phrases: &["features", "benefits", "advantages", "what can"],
    },
    IntentPhrases {
        intent: Intent::Referral,
        phrases: &["refer friend", "referral", "invite", "refer"],
    },
    IntentPhrases {
        intent: Intent::Kyc,
        phrases: &["id verification", "verification", "identity", "verify", "kyc"],
    },
    IntentPhrases {
        intent: Intent::Balance,
        phrases: &["check balance", "my balance", "balance", "wallet"],
    },
    IntentPhrases {
        intent: Intent::Fund,
        phrases: &["add money", "top up", "recharge", "deposit", "fund"],
    },
    IntentPhrases {
        intent: Intent::Register,
        phrases: &[
            "activate my card",
            "activate card",
            "activate",
            "open registration",
            "create account",
            "registration",
            "register",
            "sign up",
            "signup",
            "start",
        ],
    },
    IntentPhrases {
        intent: Intent::Card,
        phrases: &[
            "show card details",
            "show my card",
            "show card",
            "card details",
            "card number",
            "card info",
            "my card",
            "virtual card",
            "view card",
            "see card",
        ],
    },
    IntentPhrases {
        intent: Intent::How,
        phrases: &["how it works", "tutorial", "guide", "how"],
    },
    IntentPhrases {
        intent: Intent::Help,
        phrases: &["commands", "support", "assist", "help"],
    },
    IntentPhrases {
        intent: Intent::Followup,
        phrases: &["what next", "what now", "continue", "next", "then"],
    },
    IntentPhrases {
        intent: Intent::Acknowledge,
        phrases: &["thank you", "got it", "thanks", "okay", "cool", "ok"],
    },
];
