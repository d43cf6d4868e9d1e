//! Per-turn orchestration: classify, look up, gate, run the side effect,
//! compose and send.

use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::channels::{OutboundChannel, OutboundMessage, send_all};
use crate::dispatcher::Dispatcher;
use crate::intent::{CATALOG_VERSION, Intent, classify};
use crate::profile::{
    ActivationPolicy, ProfileLookup, ProfileResolver, UserProfile, normalize_handle,
};

use super::composer::{self, ComposeContext, EffectOutcome};
use super::gate::{self, PromptKind, Requirement};

/// Side effect an intent triggers once authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    None,
    EnsureCollectionAccount,
    GrantFreeActivation,
}

#[derive(Debug, Clone, Copy)]
struct Handler {
    requirement: Requirement,
    effect: Effect,
}

fn handler_for(intent: Intent) -> Handler {
    let effect = match intent {
        Intent::FiatFund => Effect::EnsureCollectionAccount,
        Intent::Activate => Effect::GrantFreeActivation,
        _ => Effect::None,
    };
    Handler {
        requirement: gate::requirement(intent),
        effect,
    }
}

/// Static settings for composing replies.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub webapp_url: String,
    pub activation_policy: ActivationPolicy,
}

/// What happened during one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub handle: String,
    pub intent: Intent,
    /// Set when the gate redirected instead of serving the intent.
    pub redirected: Option<PromptKind>,
    /// The backend was down and the fallback reply was sent.
    pub upstream_unavailable: bool,
    pub messages: Vec<OutboundMessage>,
    /// Messages actually handed to the channel, in order.
    pub delivered: usize,
}

pub struct DialogueEngine {
    resolver: Arc<ProfileResolver>,
    dispatcher: Arc<Dispatcher>,
    channel: Arc<dyn OutboundChannel>,
    settings: EngineSettings,
}

impl DialogueEngine {
    pub fn new(
        resolver: Arc<ProfileResolver>,
        dispatcher: Arc<Dispatcher>,
        channel: Arc<dyn OutboundChannel>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            channel,
            settings,
        }
    }

    /// Handle one inbound message. `selection` is the id of a tapped choice;
    /// pass its title as `text`.
    ///
    /// Returns `None` when the sender id holds no digits.
    pub async fn handle_turn(
        &self,
        from: &str,
        text: &str,
        selection: Option<&str>,
    ) -> Option<TurnOutcome> {
        let Some(handle) = normalize_handle(from) else {
            warn!(from, "Ignoring message from unusable sender id");
            return None;
        };
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", turn_id = %turn_id, handle = %handle);
        Some(
            self.run_turn(turn_id, handle, text, selection)
                .instrument(span)
                .await,
        )
    }

    async fn run_turn(
        &self,
        turn_id: Uuid,
        handle: String,
        text: &str,
        selection: Option<&str>,
    ) -> TurnOutcome {
        let intent = classify(text, selection);
        let handler = handler_for(intent);
        debug!(%intent, selection, catalog = CATALOG_VERSION, "Classified message");

        let mut outcome = TurnOutcome {
            turn_id,
            handle,
            intent,
            redirected: None,
            upstream_unavailable: false,
            messages: Vec::new(),
            delivered: 0,
        };

        let profile = match self.resolver.resolve(&outcome.handle).await {
            ProfileLookup::Found(p) => Some(p),
            ProfileLookup::Unknown => None,
            ProfileLookup::Unavailable(_) if handler.requirement == Requirement::Public => None,
            ProfileLookup::Unavailable(e) => {
                warn!(%intent, error = %e, "Backend unavailable; sending fallback");
                outcome.upstream_unavailable = true;
                outcome.messages = composer::upstream_unavailable();
                return self.deliver(outcome).await;
            }
        };

        let decision = gate::authorize(intent, profile.as_ref());
        outcome.messages = match decision.redirect {
            Some(prompt) => {
                info!(
                    %intent,
                    prompt = ?prompt.kind,
                    missing = %prompt.kind.missing_step(),
                    "Intent blocked by onboarding state"
                );
                outcome.redirected = Some(prompt.kind);
                composer::redirect(&prompt)
            }
            None => {
                let effect = self
                    .run_effect(handler.effect, &outcome.handle, profile.as_ref())
                    .await;
                let ctx = ComposeContext {
                    handle: &outcome.handle,
                    webapp_url: &self.settings.webapp_url,
                    activation_policy: self.settings.activation_policy,
                    effect,
                };
                composer::compose(intent, profile.as_ref(), &ctx)
            }
        };

        self.deliver(outcome).await
    }

    async fn run_effect(
        &self,
        effect: Effect,
        handle: &str,
        profile: Option<&UserProfile>,
    ) -> Option<EffectOutcome> {
        match effect {
            Effect::None => None,
            Effect::EnsureCollectionAccount => {
                let account = match self.dispatcher.ensure_collection_account(handle).await {
                    Ok(account) => Some(account),
                    Err(e) => {
                        warn!(handle, error = %e, "Collection account unavailable");
                        None
                    }
                };
                Some(EffectOutcome::CollectionAccount(account))
            }
            Effect::GrantFreeActivation => {
                let eligible = profile.is_some_and(|p| {
                    !p.card_active && self.settings.activation_policy.grants_free_activation(p)
                });
                if !eligible {
                    return None;
                }
                let granted = match self.dispatcher.grant_free_activation(handle).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(handle, error = %e, "Free activation failed");
                        false
                    }
                };
                Some(EffectOutcome::FreeActivation { granted })
            }
        }
    }

    async fn deliver(&self, mut outcome: TurnOutcome) -> TurnOutcome {
        outcome.delivered =
            send_all(self.channel.as_ref(), &outcome.handle, &outcome.messages).await;
        info!(
            intent = %outcome.intent,
            sent = outcome.delivered,
            total = outcome.messages.len(),
            "Turn complete"
        );
        outcome
    }
}
