//! Toki Bot: a WhatsApp onboarding and card assistant.

pub mod backend;
pub mod channels;
pub mod config;
pub mod dialogue;
pub mod dispatcher;
pub mod error;
pub mod intent;
pub mod profile;
pub mod store;
pub mod sweeper;
pub mod webhook;

#[cfg(test)]
mod testing;
