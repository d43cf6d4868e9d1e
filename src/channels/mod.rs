//! Outbound message types and the channel abstraction that delivers them.

pub mod whatsapp;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use whatsapp::WhatsAppChannel;

/// Most quick-reply choices a single message may carry.
pub const MAX_CHOICES: usize = 3;

/// A tappable quick reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Stable id echoed back when the user taps the choice.
    pub id: String,
    pub title: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Between one and `MAX_CHOICES` choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceSet(Vec<Choice>);

impl ChoiceSet {
    /// Build from a fixed-size array; the bound is checked at compile time.
    pub fn from_array<const N: usize>(choices: [Choice; N]) -> Self {
        const { assert!(N >= 1 && N <= MAX_CHOICES, "choice count out of range") };
        Self(choices.into())
    }

    pub fn as_slice(&self) -> &[Choice] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One message to deliver to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text { body: String },
    Choices { body: String, choices: ChoiceSet },
    Link { body: String, url: String, label: String },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn choices(body: impl Into<String>, choices: ChoiceSet) -> Self {
        Self::Choices {
            body: body.into(),
            choices,
        }
    }

    pub fn link(body: impl Into<String>, url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Link {
            body: body.into(),
            url: url.into(),
            label: label.into(),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } | Self::Choices { body, .. } | Self::Link { body, .. } => body,
        }
    }

    /// Choices attached to this message, if any.
    pub fn choice_list(&self) -> &[Choice] {
        match self {
            Self::Choices { choices, .. } => choices.as_slice(),
            _ => &[],
        }
    }
}

/// Delivers composed messages to a user handle.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Send `messages` in order, stopping at the first failure.
/// Returns how many were delivered.
pub async fn send_all(
    channel: &dyn OutboundChannel,
    to: &str,
    messages: &[OutboundMessage],
) -> usize {
    for (sent, message) in messages.iter().enumerate() {
        if let Err(e) = channel.send(to, message).await {
            tracing::warn!(
                to,
                channel = channel.name(),
                error = %e,
                remaining = messages.len() - sent,
                "Stopping delivery after send failure"
            );
            return sent;
        }
    }
    messages.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_set_from_array() {
        let set = ChoiceSet::from_array([Choice::new("a", "A"), Choice::new("b", "B")]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn body_and_choices_accessors() {
        let msg = OutboundMessage::choices(
            "Pick one",
            ChoiceSet::from_array([Choice::new("intent:help", "Help")]),
        );
        assert_eq!(msg.body(), "Pick one");
        assert_eq!(msg.choice_list()[0].id, "intent:help");
        assert!(OutboundMessage::text("hi").choice_list().is_empty());
    }

    #[tokio::test]
    async fn send_all_stops_at_first_failure() {
        let channel = crate::testing::RecordingChannel::default();
        let messages = [OutboundMessage::text("one"), OutboundMessage::text("two")];
        assert_eq!(send_all(&channel, "111", &messages).await, 2);

        channel.fail_for("222");
        assert_eq!(send_all(&channel, "222", &messages).await, 0);
        assert_eq!(channel.sent().len(), 2);
    }
}
