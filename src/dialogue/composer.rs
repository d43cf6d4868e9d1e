//! Response composer.
//!
//! Turns an intent plus a profile snapshot into the ordered messages to
//! send. Nothing here performs I/O; a turn whose send failed can be
//! composed again with the same result.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::channels::{Choice, ChoiceSet, OutboundMessage};
use crate::intent::Intent;
use crate::profile::{
    ActivationPolicy, CollectionAccount, CompletionKind, OnboardingStep, UserProfile,
};

use super::gate::{PromptKind, PromptSpec};

/// Balances below this get a low-balance hint.
const LOW_BALANCE_USD: Decimal = Decimal::TEN;

/// Result of the side effect that ran before composing, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectOutcome {
    /// `None` when provisioning failed.
    CollectionAccount(Option<CollectionAccount>),
    FreeActivation { granted: bool },
}

/// Per-turn inputs besides the intent and the profile.
#[derive(Debug, Clone)]
pub struct ComposeContext<'a> {
    pub handle: &'a str,
    /// Onboarding web app base URL, without a trailing slash.
    pub webapp_url: &'a str,
    pub activation_policy: ActivationPolicy,
    pub effect: Option<EffectOutcome>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn choice(intent: Intent, title: &str) -> Choice {
    Choice::new(intent.selection_id(), title)
}

fn buttons<const N: usize>(items: [(Intent, &str); N]) -> ChoiceSet {
    ChoiceSet::from_array(items.map(|(intent, title)| choice(intent, title)))
}

fn with_buttons<const N: usize>(
    body: impl Into<String>,
    items: [(Intent, &str); N],
) -> OutboundMessage {
    OutboundMessage::choices(body, buttons(items))
}

/// Dollar amount with exactly two decimals.
pub fn format_usd(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

fn first_name(profile: &UserProfile) -> &str {
    profile
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("there")
}

// ── Intent responses ────────────────────────────────────────────────

/// Messages answering `intent` for an authorized user.
pub fn compose(
    intent: Intent,
    profile: Option<&UserProfile>,
    ctx: &ComposeContext<'_>,
) -> Vec<OutboundMessage> {
    match intent {
        Intent::Greeting => vec![greeting()],
        Intent::Register => match profile {
            Some(p) => vec![already_registered(p)],
            None => vec![register_link(ctx)],
        },
        Intent::Kyc => match profile {
            Some(p) if p.kyc_basic_completed => vec![with_buttons(
                "✅ Your *KYC verification* is already complete.\n\nYou can fund your card now.",
                [(Intent::Fund, "Fund")],
            )],
            _ => vec![kyc_link(ctx)],
        },
        Intent::Fund => vec![with_buttons(
            "💳 *Choose your funding method:*",
            [(Intent::CryptoFund, "Crypto"), (Intent::FiatFund, "Bank Transfer (NGN)")],
        )],
        Intent::CryptoFund => vec![crypto_link(ctx)],
        Intent::FiatFund => fiat_funding(profile, ctx),
        Intent::Balance => vec![balance(profile)],
        Intent::Card => match profile.and_then(|p| p.card.as_ref()) {
            Some(card) => {
                let mut details = format!(
                    "*Your Toki USD Virtual Card* 💳\n\n• *Expiry:* {}\n• *CVV:* {}\n",
                    card.expiry, card.cvv
                );
                if let Some(descriptor) = &card.billing_descriptor {
                    details.push_str(&format!("• *Billing Name:* {descriptor}\n"));
                }
                details.push_str("\nYour card number is below ⬇️");
                vec![
                    with_buttons(details, [(Intent::Fund, "Fund"), (Intent::Help, "Help")]),
                    OutboundMessage::text(card.number.clone()),
                ]
            }
            None => vec![card_in_progress()],
        },
        Intent::Activate => activation(profile, ctx),
        Intent::Help => vec![with_buttons(
            "🤖 *Toki Card Bot - Commands*\n\n\
             *Getting Started:*\n\
             • Activate Card - Create your account\n\
             • KYC - Verify your identity\n\n\
             *Card Management:*\n\
             • Fund - Add money to your card\n\
             • Balance - Check your balance\n\
             • Show Card - View card details\n\n\
             *Information:*\n\
             • About - Learn about Toki Card\n\
             • Features - See what we offer\n\n\
             Just type any command or click a button!",
            [(Intent::Register, "Activate Card"), (Intent::About, "About")],
        )],
        Intent::About => vec![with_buttons(
            "*About Toki Card* 💳\n\n\
             Toki Card is your virtual USD card for seamless global payments.\n\n\
             ✅ Fund with crypto (USDT, BTC)\n\
             ✅ Spend anywhere online\n\
             ✅ Instant card creation\n\
             ✅ Secure & reliable\n\n\
             Ready to get started?",
            [(Intent::Register, "Activate Card"), (Intent::Features, "Features")],
        )],
        Intent::How => vec![with_buttons(
            "📖 *How Toki Card works*\n\n\
             1. *Activate Card* - register with your email\n\
             2. *KYC* - verify your basic details\n\
             3. *Fund* - deposit crypto or transfer NGN\n\
             4. *Show Card* - pay anywhere online with your USD card",
            [(Intent::Register, "Activate Card"), (Intent::Help, "Help")],
        )],
        Intent::Security => vec![with_buttons(
            "🔒 *Your security comes first*\n\n\
             Identity checks are handled by a licensed KYC partner and cards are \
             issued by a regulated card partner. Card numbers are only ever sent \
             to you, in their own message.\n\n\
             Never share your CVV with anyone, including people claiming to be Toki support.",
            [(Intent::About, "About"), (Intent::Help, "Help")],
        )],
        Intent::Fees => vec![with_buttons(
            "💸 *Fees*\n\n\
             • Card activation: free for early waitlist members\n\
             • Crypto deposits: no deposit fee\n\
             • Bank transfers: converted at the current NGN rate\n\n\
             Type *help* to see everything else I can do.",
            [(Intent::Fund, "Fund"), (Intent::Help, "Help")],
        )],
        Intent::Features => vec![with_buttons(
            "✨ *Toki Card Features*\n\n\
             🌍 Global Acceptance\n\
             💸 Low Fees\n\
             ⚡ Instant Deposits\n\
             🔒 Bank-Level Security\n\
             💳 Virtual Card\n\
             📱 Easy Management\n\n\
             Get your card today!",
            [(Intent::Register, "Activate Card"), (Intent::Help, "Help")],
        )],
        Intent::Referral => vec![OutboundMessage::link(
            "🤝 *Refer a friend*\n\nShare your personal link. Friends who sign up \
             through it are linked to your account.",
            format!("{}/emailform?ref={}", ctx.webapp_url, ctx.handle),
            "Share Toki Card",
        )],
        Intent::Acknowledge => vec![with_buttons(
            "Great! 👍 Type *help* if you need anything else.",
            [(Intent::Help, "Help")],
        )],
        Intent::Followup => match profile {
            Some(p) => vec![next_step(p, "Here's what's next.")],
            None => vec![register_link(ctx)],
        },
        Intent::None => vec![with_buttons(
            "🤔 I didn't understand that.\n\n\
             Type *help* to see what I can do, or click a button below.",
            [
                (Intent::Help, "Help"),
                (Intent::Register, "Activate Card"),
                (Intent::Fund, "Fund"),
            ],
        )],
    }
}

fn greeting() -> OutboundMessage {
    with_buttons(
        "Welcome to *Toki Card*! 👋\n\nWhat would you like to do?",
        [
            (Intent::Register, "Activate Card"),
            (Intent::Fund, "Fund"),
            (Intent::Help, "Help"),
        ],
    )
}

fn register_link(ctx: &ComposeContext<'_>) -> OutboundMessage {
    OutboundMessage::link(
        "🎉 *Welcome to Toki Card!*\n\n\
         Your virtual USD card for seamless global payments.\n\n\
         ✅ Fund with crypto (USDT, BTC)\n\
         ✅ Spend anywhere online\n\
         ✅ Instant card creation\n\n\
         Click below to activate your card now! 👇",
        format!("{}/emailform", ctx.webapp_url),
        "Activate Card",
    )
}

fn kyc_link(ctx: &ComposeContext<'_>) -> OutboundMessage {
    OutboundMessage::link(
        "📋 *Complete your KYC verification*\n\nThis is required before you can fund your card.",
        format!("{}/kycBasic", ctx.webapp_url),
        "Start KYC",
    )
}

fn crypto_link(ctx: &ComposeContext<'_>) -> OutboundMessage {
    OutboundMessage::link(
        "🪙 *Crypto Funding*\n\n\
         We support:\n\
         • USDT (TRC20) - Min: $10\n\
         • USDC - Min: $10\n\
         • CTNG - Min: $5\n\n\
         💡 Deposits are processed *instantly*!",
        format!("{}/crypto-deposit?phone={}", ctx.webapp_url, ctx.handle),
        "Start Crypto Deposit",
    )
}

fn already_registered(profile: &UserProfile) -> OutboundMessage {
    next_step(
        profile,
        &format!("✅ You're already registered, {}!", first_name(profile)),
    )
}

/// `lead` followed by a pointer to the next main-line step.
fn next_step(profile: &UserProfile, lead: &str) -> OutboundMessage {
    match OnboardingStep::progress_of(profile).next() {
        Some(OnboardingStep::KycBasic) => with_buttons(
            format!("{lead}\n\nNext step: complete your *KYC verification*."),
            [(Intent::Kyc, "KYC")],
        ),
        Some(_) => with_buttons(
            format!("{lead}\n\nNext step: *fund your card* to start spending."),
            [(Intent::Fund, "Fund")],
        ),
        None => with_buttons(
            format!("{lead}\n\nYour card is funded and ready to use."),
            [(Intent::Balance, "Check Balance"), (Intent::Card, "Show Card")],
        ),
    }
}

fn fiat_funding(profile: Option<&UserProfile>, ctx: &ComposeContext<'_>) -> Vec<OutboundMessage> {
    let account = match &ctx.effect {
        Some(EffectOutcome::CollectionAccount(account)) => account.clone(),
        _ => profile.and_then(|p| p.collection_account.clone()),
    };
    let Some(account) = account else {
        return vec![with_buttons(
            "⏳ We couldn't set up your bank account details just now. Please try again shortly.",
            [(Intent::CryptoFund, "Crypto"), (Intent::Help, "Help")],
        )];
    };

    vec![
        OutboundMessage::text(format!(
            "🏦 *Your Personal Bank Account*\n\n\
             *Bank:* {}\n\
             *Account Number:* {}\n\
             *Account Name:* {}\n\n\
             📌 *How to fund:*\n\
             1. Transfer NGN to the account above\n\
             2. Funds convert automatically to USD\n\
             3. Card gets funded within minutes\n\n\
             💡 *Current Rate:* ₦{}/$1\n\n\
             _These are your permanent details. Save them!_",
            account.bank_name,
            account.account_number,
            account.account_name,
            account.rate.normalize(),
        )),
        with_buttons(
            "Need help?",
            [(Intent::Balance, "Check Balance"), (Intent::Help, "Help")],
        ),
    ]
}

fn balance(profile: Option<&UserProfile>) -> OutboundMessage {
    let amount = profile.map(UserProfile::display_balance).unwrap_or_default();
    let mut body = format!("💰 *Your Balance*\n\n${} USD", format_usd(amount));
    if amount < LOW_BALANCE_USD {
        body.push_str("\n\nLow balance. Consider funding your account!");
    }
    with_buttons(body, [(Intent::Fund, "Fund"), (Intent::Card, "Show Card")])
}

fn activation(profile: Option<&UserProfile>, ctx: &ComposeContext<'_>) -> Vec<OutboundMessage> {
    if profile.is_some_and(|p| p.card_active) {
        return vec![with_buttons(
            "✅ Your card is already active.",
            [(Intent::Card, "Show Card"), (Intent::Balance, "Check Balance")],
        )];
    }

    let eligible = profile.is_some_and(|p| ctx.activation_policy.grants_free_activation(p));
    if !eligible {
        return vec![OutboundMessage::link(
            "💳 *Activate your card*\n\nPay the one-time activation fee to start spending.",
            format!("{}/activation?phone={}", ctx.webapp_url, ctx.handle),
            "Pay Activation",
        )];
    }

    match &ctx.effect {
        Some(EffectOutcome::FreeActivation { granted: false }) => vec![with_buttons(
            "⏳ We couldn't activate your card just now. Please try again shortly.",
            [(Intent::Help, "Help")],
        )],
        _ => vec![with_buttons(
            "🎁 *Free activation unlocked!*\n\n\
             As an early waitlist member your card activation fee is waived. \
             Your card is now active.",
            [(Intent::Card, "Show Card"), (Intent::Balance, "Check Balance")],
        )],
    }
}

fn card_in_progress() -> OutboundMessage {
    with_buttons(
        "⏳ Your card is being prepared. Please try again shortly.",
        [(Intent::Balance, "Check Balance"), (Intent::Help, "Help")],
    )
}

// ── Redirects and notifications ─────────────────────────────────────

/// Corrective prompt for an intent the gate blocked.
pub fn redirect(prompt: &PromptSpec) -> Vec<OutboundMessage> {
    let funding_intent = matches!(
        prompt.blocked,
        Intent::Fund | Intent::CryptoFund | Intent::FiatFund
    );
    match prompt.kind {
        PromptKind::Register => {
            let purpose = match prompt.blocked {
                Intent::Card => "before viewing it",
                Intent::Balance => "to check your balance",
                _ if funding_intent => "before funding",
                _ => "to continue",
            };
            vec![with_buttons(
                format!("Please *activate your card first* {purpose}."),
                [(Intent::Register, "Activate Card")],
            )]
        }
        PromptKind::Kyc => {
            let body = if funding_intent {
                "⚠️ You must complete *KYC verification* first before funding."
            } else {
                "⚠️ You must complete *KYC verification* first."
            };
            vec![with_buttons(body, [(Intent::Kyc, "KYC")])]
        }
        PromptKind::Fund => {
            let purpose = match prompt.blocked {
                Intent::Card => "before viewing your card",
                Intent::Activate => "before activating it",
                _ => "to check your balance",
            };
            vec![with_buttons(
                format!("💳 Please *fund your card* first {purpose}."),
                [(Intent::Fund, "Fund")],
            )]
        }
        PromptKind::CardInProgress => vec![card_in_progress()],
    }
}

/// Sent when the account backend cannot be reached.
pub fn upstream_unavailable() -> Vec<OutboundMessage> {
    vec![with_buttons(
        "⚠️ We're having trouble reaching our servers. Please try again in a moment.",
        [(Intent::Help, "Help")],
    )]
}

/// Confirmation sent after a collaborator callback completes a step.
pub fn step_confirmation(
    kind: CompletionKind,
    profile: &UserProfile,
    amount: Option<Decimal>,
) -> Vec<OutboundMessage> {
    match kind {
        CompletionKind::Registration => vec![with_buttons(
            format!(
                "🎉 Welcome to Toki Card, {}! Your account is ready.\n\n\
                 Next step: complete your *KYC verification*.",
                first_name(profile)
            ),
            [(Intent::Kyc, "KYC")],
        )],
        CompletionKind::KycBasic => vec![with_buttons(
            "✅ KYC approved! You can now fund your card.",
            [(Intent::Fund, "Fund")],
        )],
        CompletionKind::IdentityVerification => vec![OutboundMessage::text(
            "✅ Identity verified! Thanks for completing your verification.",
        )],
        CompletionKind::Funding => {
            let amount = amount.map(format_usd).unwrap_or_else(|| "0.00".into());
            let tail = if profile.card.is_some() {
                "Your card is ready to use."
            } else {
                "Your card is being prepared."
            };
            vec![with_buttons(
                format!("💳 Payment of ${amount} confirmed! {tail}"),
                [(Intent::Balance, "Check Balance"), (Intent::Card, "Show Card")],
            )]
        }
        CompletionKind::Activation => vec![with_buttons(
            "💳 Activation confirmed! Your card is now active.",
            [(Intent::Card, "Show Card")],
        )],
    }
}

/// Sent when a redelivered funding callback finally gets the card issued.
pub fn card_ready() -> Vec<OutboundMessage> {
    vec![with_buttons(
        "💳 Your card is ready to use! Tap below to see the details.",
        [(Intent::Card, "Show Card")],
    )]
}

/// The one-time congratulation sequence for fully onboarded users.
pub fn congratulation_sequence(profile: &UserProfile) -> [OutboundMessage; 3] {
    let full_name = profile.full_name().unwrap_or_else(|| "Not provided".into());
    let email = profile.email.as_deref().unwrap_or("Not provided");

    [
        OutboundMessage::text(format!(
            "🎉 *Congratulations {}!*\n\n\
             Your Toki Card account is now fully activated!\n\n\
             *Your Registration Details:*\n\
             👤 Full Name: {full_name}\n\
             📧 Email: {email}\n\
             ✅ KYC Status: Verified\n\n\
             You're all set to start using your virtual USD card! 🚀",
            first_name(profile)
        )),
        OutboundMessage::text(
            "💳 *Next Step: Fund Your Card*\n\n\
             To start spending, you need to add funds to your card.\n\n\
             We offer two convenient funding methods:",
        ),
        with_buttons(
            "*Choose Your Funding Method:*\n\n\
             🪙 *Crypto (Stablecoins)*\n   • USDT (TRC20)\n   • USDC\n   • CTNG\n   ⚡ Instant deposits\n\n\
             🏦 *Bank Transfer (NGN)*\n   • Fund with local banks\n   • Get personal account details\n   💵 Easy & familiar",
            [
                (Intent::CryptoFund, "Fund with Crypto"),
                (Intent::FiatFund, "Bank Transfer (NGN)"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::dialogue::gate::authorize;
    use crate::profile::WaitlistEntry;
    use crate::testing::{sample_account, sample_card};

    fn ctx(effect: Option<EffectOutcome>) -> ComposeContext<'static> {
        ComposeContext {
            handle: "2348000000001",
            webapp_url: "https://onboard.example",
            activation_policy: ActivationPolicy::WaitlistBelow(500),
            effect,
        }
    }

    fn funded() -> UserProfile {
        let mut p = UserProfile::new("2348000000001");
        p.first_name = Some("Ada".into());
        p.kyc_basic_completed = true;
        p.funding_completed = true;
        p
    }

    fn all_choice_ids(messages: &[OutboundMessage]) -> Vec<String> {
        messages
            .iter()
            .flat_map(|m| m.choice_list().iter().map(|c| c.id.clone()))
            .collect()
    }

    #[test]
    fn card_ready_points_at_the_card() {
        let msgs = card_ready();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].body().contains("card is ready"));
        assert_eq!(all_choice_ids(&msgs), vec!["intent:card"]);
    }

    #[test]
    fn greeting_offers_three_choices() {
        let msgs = compose(Intent::Greeting, None, &ctx(None));
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].body().starts_with("Welcome to *Toki Card*!"));
        assert_eq!(
            all_choice_ids(&msgs),
            vec!["intent:register", "intent:fund", "intent:help"]
        );
    }

    #[test]
    fn card_number_only_in_second_message() {
        let mut p = funded();
        p.card = Some(sample_card());
        let msgs = compose(Intent::Card, Some(&p), &ctx(None));

        assert_eq!(msgs.len(), 2);
        assert!(!msgs[0].body().contains("4111 2222 3333 4444"));
        assert!(msgs[0].body().contains("09/29"));
        assert!(msgs[0].body().contains("321"));
        assert!(msgs[0].body().contains("TOKI*CARD"));
        assert_eq!(msgs[1].body(), "4111 2222 3333 4444");
    }

    #[test]
    fn balance_formatting() {
        let mut p = funded();
        let body = compose(Intent::Balance, Some(&p), &ctx(None))[0].body().to_string();
        assert!(body.contains("$0.00 USD"));
        assert!(body.contains("Low balance"));

        p.balance = Some(dec!(12.5));
        let msgs = compose(Intent::Balance, Some(&p), &ctx(None));
        assert!(msgs[0].body().contains("$12.50 USD"));
        assert!(!msgs[0].body().contains("Low balance"));
        assert_eq!(all_choice_ids(&msgs), vec!["intent:fund", "intent:card"]);
    }

    #[test]
    fn usd_formatting_rounds_half_up() {
        assert_eq!(format_usd(dec!(5)), "5.00");
        assert_eq!(format_usd(dec!(1.005)), "1.01");
        assert_eq!(format_usd(dec!(10.123)), "10.12");
    }

    #[test]
    fn fiat_funding_shows_account_then_choices() {
        let p = funded();
        let msgs = compose(
            Intent::FiatFund,
            Some(&p),
            &ctx(Some(EffectOutcome::CollectionAccount(Some(sample_account())))),
        );
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].body().contains("9812345678"));
        assert!(msgs[0].body().contains("₦1520/$1"));
        assert_eq!(msgs[1].body(), "Need help?");
        assert_eq!(all_choice_ids(&msgs), vec!["intent:balance", "intent:help"]);
    }

    #[test]
    fn fiat_funding_without_account_asks_to_retry() {
        let p = funded();
        let msgs = compose(
            Intent::FiatFund,
            Some(&p),
            &ctx(Some(EffectOutcome::CollectionAccount(None))),
        );
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].body().contains("try again shortly"));
    }

    #[test]
    fn links_point_into_webapp() {
        let c = ctx(None);
        let p = UserProfile::new("2348000000001");
        let cases = [
            (Intent::Register, None, "https://onboard.example/emailform", "Activate Card"),
            (Intent::Kyc, Some(&p), "https://onboard.example/kycBasic", "Start KYC"),
            (
                Intent::CryptoFund,
                Some(&p),
                "https://onboard.example/crypto-deposit?phone=2348000000001",
                "Start Crypto Deposit",
            ),
        ];
        for (intent, profile, expected_url, expected_label) in cases {
            let msgs = compose(intent, profile, &c);
            match &msgs[0] {
                OutboundMessage::Link { url, label, .. } => {
                    assert_eq!(url, expected_url);
                    assert_eq!(label, expected_label);
                }
                other => panic!("{intent} should be a link, got {other:?}"),
            }
        }
    }

    #[test]
    fn already_done_messages() {
        let mut p = UserProfile::new("2348000000001");
        p.kyc_basic_completed = true;
        let msgs = compose(Intent::Register, Some(&p), &ctx(None));
        assert!(msgs[0].body().contains("already registered"));
        assert_eq!(all_choice_ids(&msgs), vec!["intent:fund"]);

        let msgs = compose(Intent::Kyc, Some(&p), &ctx(None));
        assert!(msgs[0].body().contains("already complete"));
    }

    #[test]
    fn activation_variants() {
        let mut p = funded();
        p.waitlist = Some(WaitlistEntry { position: 12 });
        let granted = compose(
            Intent::Activate,
            Some(&p),
            &ctx(Some(EffectOutcome::FreeActivation { granted: true })),
        );
        assert!(granted[0].body().contains("Free activation"));

        p.waitlist = None;
        let paid = compose(Intent::Activate, Some(&p), &ctx(None));
        assert!(matches!(paid[0], OutboundMessage::Link { .. }));

        p.card_active = true;
        let done = compose(Intent::Activate, Some(&p), &ctx(None));
        assert!(done[0].body().contains("already active"));
    }

    #[test]
    fn fund_without_kyc_redirect() {
        let p = UserProfile::new("2348000000001");
        let decision = authorize(Intent::Fund, Some(&p));
        let msgs = redirect(&decision.redirect.unwrap());
        assert_eq!(
            msgs[0].body(),
            "⚠️ You must complete *KYC verification* first before funding."
        );
        assert_eq!(all_choice_ids(&msgs), vec!["intent:kyc"]);
    }

    #[test]
    fn redirects_name_a_starting_choice() {
        let register = redirect(&PromptSpec {
            kind: PromptKind::Register,
            blocked: Intent::Balance,
        });
        assert!(register[0].body().contains("to check your balance"));
        assert_eq!(all_choice_ids(&register), vec!["intent:register"]);

        let fund = redirect(&PromptSpec {
            kind: PromptKind::Fund,
            blocked: Intent::Card,
        });
        assert_eq!(all_choice_ids(&fund), vec!["intent:fund"]);
    }

    #[test]
    fn every_intent_composes_messages() {
        let mut p = funded();
        p.card = Some(sample_card());
        for intent in Intent::ALL {
            for profile in [None, Some(&p)] {
                let msgs = compose(intent, profile, &ctx(None));
                assert!(!msgs.is_empty(), "{intent} produced nothing");
                assert!(msgs.iter().all(|m| !m.body().is_empty()));
            }
        }
    }

    #[test]
    fn composing_is_deterministic() {
        let p = funded();
        let c = ctx(None);
        assert_eq!(
            compose(Intent::Followup, Some(&p), &c),
            compose(Intent::Followup, Some(&p), &c)
        );
    }

    #[test]
    fn congratulation_sequence_shape() {
        let mut p = funded();
        p.last_name = Some("Obi".into());
        p.email = Some("ada@example.com".into());
        let [first, second, third] = congratulation_sequence(&p);

        assert!(first.body().starts_with("🎉 *Congratulations Ada!*"));
        assert!(first.body().contains("Full Name: Ada Obi"));
        assert!(first.body().contains("ada@example.com"));
        assert!(second.body().contains("Next Step: Fund Your Card"));
        assert_eq!(
            third
                .choice_list()
                .iter()
                .map(|c| c.title.as_str())
                .collect::<Vec<_>>(),
            vec!["Fund with Crypto", "Bank Transfer (NGN)"]
        );
    }

    #[test]
    fn funding_confirmation_mentions_amount() {
        let p = funded();
        let msgs = step_confirmation(CompletionKind::Funding, &p, Some(dec!(5)));
        assert!(msgs[0].body().contains("$5.00 confirmed"));
        assert!(msgs[0].body().contains("being prepared"));
    }
}
