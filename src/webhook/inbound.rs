//! Extraction of the user message from a WhatsApp Cloud webhook payload.

use serde_json::Value;

/// A user message worth handing to the dialogue engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender id as delivered (not yet normalized).
    pub from: String,
    /// Typed text, or the title of a tapped choice.
    pub text: String,
    /// Id of a tapped reply button or list row.
    pub selection: Option<String>,
}

/// Pull the first message out of a webhook body.
///
/// Returns `None` for status updates and for messages with nothing to act
/// on (media, empty text). Malformed JSON is an error.
pub fn parse_inbound(body: &[u8]) -> Result<Option<InboundMessage>, serde_json::Error> {
    let payload: Value = serde_json::from_slice(body)?;
    Ok(extract_message(&payload))
}

fn extract_message(payload: &Value) -> Option<InboundMessage> {
    let message = payload.pointer("/entry/0/changes/0/value/messages/0")?;
    let from = message.get("from").and_then(Value::as_str)?.to_string();

    if let Some(body) = message.pointer("/text/body").and_then(Value::as_str) {
        let text = body.trim();
        if text.is_empty() {
            return None;
        }
        return Some(InboundMessage {
            from,
            text: text.to_string(),
            selection: None,
        });
    }

    let interactive = message.get("interactive")?;
    let reply = interactive
        .get("button_reply")
        .or_else(|| interactive.get("list_reply"))?;
    let id = reply
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let title = reply
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if id.is_none() && title.is_empty() {
        return None;
    }

    Some(InboundMessage {
        from,
        text: title.to_string(),
        selection: id.map(String::from),
    })
}
