//! Dialogue: the onboarding gate, reply composition and the turn engine.

pub mod composer;
pub mod engine;
pub mod gate;

pub use composer::{ComposeContext, EffectOutcome, compose, format_usd};
pub use engine::{DialogueEngine, EngineSettings, TurnOutcome};
pub use gate::{GateDecision, PromptKind, PromptSpec, Requirement, authorize};
