//! WhatsApp channel. Sends messages through the WhatsApp Cloud API.
//!
//! Text, interactive reply buttons and `cta_url` link messages are posted
//! to `{api_base}/{phone_id}/messages`.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{OutboundChannel, OutboundMessage};
use crate::error::ChannelError;

/// WhatsApp caps reply-button titles at 20 characters.
const BUTTON_TITLE_MAX: usize = 20;

/// Interactive message bodies are limited to 1024 characters.
const INTERACTIVE_BODY_MAX: usize = 1024;

pub struct WhatsAppChannel {
    client: reqwest::Client,
    api_base: String,
    phone_id: String,
    token: SecretString,
    timeout: Duration,
}

impl WhatsAppChannel {
    pub fn new(
        api_base: impl Into<String>,
        phone_id: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            phone_id: phone_id.into(),
            token,
            timeout,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_id)
    }
}

// ── Payload construction ────────────────────────────────────────────

/// Cut `s` to at most `max` characters.
fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Build the Graph API request body for one message.
pub fn build_payload(to: &str, message: &OutboundMessage) -> Value {
    match message {
        OutboundMessage::Text { body } => json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        }),
        OutboundMessage::Choices { body, choices } => {
            let buttons: Vec<Value> = choices
                .as_slice()
                .iter()
                .map(|c| {
                    json!({
                        "type": "reply",
                        "reply": { "id": c.id, "title": clip(&c.title, BUTTON_TITLE_MAX) },
                    })
                })
                .collect();
            json!({
                "messaging_product": "whatsapp",
                "to": to,
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": { "text": clip(body, INTERACTIVE_BODY_MAX) },
                    "action": { "buttons": buttons },
                },
            })
        }
        OutboundMessage::Link { body, url, label } => json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "cta_url",
                "body": { "text": clip(body, INTERACTIVE_BODY_MAX) },
                "action": {
                    "name": "cta_url",
                    "parameters": { "display_text": clip(label, BUTTON_TITLE_MAX), "url": url },
                },
            },
        }),
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl OutboundChannel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send(&self, to: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        // The Graph API rejects empty bodies with an opaque 400.
        if message.body().trim().is_empty() {
            return Err(ChannelError::InvalidMessage("message body is empty".into()));
        }

        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(self.token.expose_secret())
            .json(&build_payload(to, message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChannelError::Timeout {
                        name: "whatsapp".into(),
                        timeout: self.timeout,
                    }
                } else {
                    ChannelError::SendFailed {
                        name: "whatsapp".into(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("messages API returned {status}: {body}"),
            });
        }

        tracing::debug!(to, "WhatsApp message sent");
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    use super::*;
    use crate::channels::{Choice, ChoiceSet};

    #[test]
    fn text_payload() {
        let payload = build_payload("2348000000001", &OutboundMessage::text("hello"));
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["to"], "2348000000001");
        assert_eq!(payload["text"]["body"], "hello");
        assert_eq!(payload["messaging_product"], "whatsapp");
    }

    #[test]
    fn button_payload_clips_titles() {
        let msg = OutboundMessage::choices(
            "Pick",
            ChoiceSet::from_array([
                Choice::new("intent:fiat-fund", "Bank Transfer (NGN) please"),
                Choice::new("intent:help", "Help"),
            ]),
        );
        let payload = build_payload("1", &msg);
        let buttons = payload["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(payload["interactive"]["type"], "button");
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["reply"]["id"], "intent:fiat-fund");
        assert_eq!(buttons[0]["reply"]["title"], "Bank Transfer (NGN) ");
        assert_eq!(buttons[1]["reply"]["title"], "Help");
    }

    #[test]
    fn link_payload() {
        let msg = OutboundMessage::link("Start here", "https://example.com/kycBasic", "Start KYC");
        let payload = build_payload("1", &msg);
        assert_eq!(payload["interactive"]["type"], "cta_url");
        let params = &payload["interactive"]["action"]["parameters"];
        assert_eq!(params["url"], "https://example.com/kycBasic");
        assert_eq!(params["display_text"], "Start KYC");
    }

    #[test]
    fn clip_is_char_safe() {
        assert_eq!(clip("héllo wörld", 7), "héllo w");
        assert_eq!(clip("ok", 20), "ok");
    }

    #[derive(Default)]
    struct Captured {
        auth: Option<String>,
        body: Option<Value>,
    }

    async fn start_graph_stub(status: StatusCode) -> (String, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let app = Router::new()
            .route(
                "/{phone_id}/messages",
                post(
                    move |State(captured): State<Arc<Mutex<Captured>>>,
                          headers: HeaderMap,
                          axum::Json(body): axum::Json<Value>| async move {
                        let mut c = captured.lock().await;
                        c.auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        c.body = Some(body);
                        status
                    },
                ),
            )
            .with_state(Arc::clone(&captured));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    #[tokio::test]
    async fn send_posts_with_bearer_token() {
        let (base, captured) = start_graph_stub(StatusCode::OK).await;
        let channel = WhatsAppChannel::new(
            base,
            "10987",
            SecretString::from("wa-token"),
            Duration::from_secs(2),
        )
        .unwrap();

        channel
            .send("2348000000001", &OutboundMessage::text("hi"))
            .await
            .unwrap();

        let c = captured.lock().await;
        assert_eq!(c.auth.as_deref(), Some("Bearer wa-token"));
        assert_eq!(c.body.as_ref().unwrap()["text"]["body"], "hi");
    }

    #[tokio::test]
    async fn send_maps_api_errors() {
        let (base, _) = start_graph_stub(StatusCode::BAD_REQUEST).await;
        let channel =
            WhatsAppChannel::new(base, "10987", SecretString::from("t"), Duration::from_secs(2))
                .unwrap();

        let err = channel
            .send("1", &OutboundMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn empty_body_is_rejected_before_sending() {
        let (base, captured) = start_graph_stub(StatusCode::OK).await;
        let channel =
            WhatsAppChannel::new(base, "10987", SecretString::from("t"), Duration::from_secs(2))
                .unwrap();

        let err = channel
            .send("1", &OutboundMessage::text("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessage(_)));
        assert!(captured.lock().await.body.is_none());
    }
}
