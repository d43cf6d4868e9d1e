//! HTTP surface: WhatsApp webhook, collaborator callbacks and health.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::inbound::parse_inbound;
use crate::channels::{OutboundChannel, send_all};
use crate::dialogue::DialogueEngine;
use crate::dialogue::composer;
use crate::dispatcher::{CompletionPayload, Dispatcher};
use crate::error::{BackendError, DatabaseError, DispatchError};
use crate::profile::{CompletionKind, IssuedCard, normalize_handle};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DialogueEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub channel: Arc<dyn OutboundChannel>,
    pub verify_token: Arc<SecretString>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/whatsapp", get(verify_webhook).post(receive_message))
        .route("/webhooks/kyc", post(kyc_callback))
        .route("/webhooks/payment", post(payment_callback))
        .route("/webhooks/registration", post(registration_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn root() -> &'static str {
    "✅ Toki bot server is working!"
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "toki-bot"
    }))
}

// ── WhatsApp ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// GET /whatsapp: the Meta subscription handshake.
async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let (Some(mode), Some(token)) = (query.mode, query.token) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if mode == "subscribe" && token == state.verify_token.expose_secret() {
        info!("WhatsApp webhook verified");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        warn!(mode = %mode, "WhatsApp webhook verification rejected");
        StatusCode::FORBIDDEN.into_response()
    }
}

/// POST /whatsapp. Always answered 200 so Meta does not redeliver.
async fn receive_message(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let message = match parse_inbound(&body) {
        Ok(Some(message)) => message,
        Ok(None) => {
            debug!("Webhook event without a user message");
            return StatusCode::OK;
        }
        Err(e) => {
            warn!(error = %e, "Malformed WhatsApp webhook body");
            return StatusCode::OK;
        }
    };

    state
        .engine
        .handle_turn(&message.from, &message.text, message.selection.as_deref())
        .await;
    StatusCode::OK
}

// ── Collaborator callbacks ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct KycEvent {
    phone: String,
    status: String,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentEvent {
    phone: String,
    status: String,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    purpose: Option<String>,
    #[serde(default)]
    card: Option<IssuedCard>,
}

#[derive(Debug, Deserialize)]
struct RegistrationEvent {
    phone: String,
    #[serde(default, alias = "firstName")]
    first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "waitlistPosition")]
    waitlist_position: Option<u32>,
}

fn reply(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn parse_event<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejecting malformed callback body");
        reply(StatusCode::BAD_REQUEST, json!({ "error": e.to_string() }))
    })
}

fn ignored(reason: &str) -> Response {
    debug!(reason, "Callback acknowledged without action");
    reply(StatusCode::OK, json!({ "status": "ignored" }))
}

/// POST /webhooks/kyc
async fn kyc_callback(State(state): State<AppState>, body: Bytes) -> Response {
    let event: KycEvent = match parse_event(&body) {
        Ok(event) => event,
        Err(response) => return response,
    };
    if !event.status.eq_ignore_ascii_case("approved") {
        return ignored("kyc status is not approved");
    }
    let kind = match event.level.as_deref() {
        Some("identity") => CompletionKind::IdentityVerification,
        _ => CompletionKind::KycBasic,
    };
    let payload = CompletionPayload {
        reference: event.reference,
        ..Default::default()
    };
    complete(&state, kind, &event.phone, payload).await
}

/// POST /webhooks/payment
async fn payment_callback(State(state): State<AppState>, body: Bytes) -> Response {
    let event: PaymentEvent = match parse_event(&body) {
        Ok(event) => event,
        Err(response) => return response,
    };
    if !event.status.eq_ignore_ascii_case("confirmed") {
        return ignored("payment status is not confirmed");
    }
    let kind = match event.purpose.as_deref() {
        Some("activation") => CompletionKind::Activation,
        _ => CompletionKind::Funding,
    };
    let payload = CompletionPayload {
        reference: event.reference,
        amount: event.amount,
        card: event.card,
        ..Default::default()
    };
    complete(&state, kind, &event.phone, payload).await
}

/// POST /webhooks/registration
async fn registration_callback(State(state): State<AppState>, body: Bytes) -> Response {
    let event: RegistrationEvent = match parse_event(&body) {
        Ok(event) => event,
        Err(response) => return response,
    };
    let payload = CompletionPayload {
        first_name: event.first_name,
        last_name: event.last_name,
        email: event.email,
        waitlist_position: event.waitlist_position,
        ..Default::default()
    };
    complete(&state, CompletionKind::Registration, &event.phone, payload).await
}

/// Dispatch a completion and map the outcome to a status the provider
/// understands: 503 asks it to redeliver.
async fn complete(
    state: &AppState,
    kind: CompletionKind,
    phone: &str,
    payload: CompletionPayload,
) -> Response {
    let Some(handle) = normalize_handle(phone) else {
        warn!(phone, %kind, "Callback phone has no digits");
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "phone must contain digits" }),
        );
    };
    let amount = payload.amount;

    match state.dispatcher.apply(kind, &handle, payload).await {
        Ok(delta) => {
            let messages = if !delta.already_applied {
                composer::step_confirmation(kind, &delta.profile, amount)
            } else if delta.card_issued {
                composer::card_ready()
            } else {
                Vec::new()
            };
            send_all(state.channel.as_ref(), &handle, &messages).await;
            reply(
                StatusCode::OK,
                json!({ "status": "ok", "already_applied": delta.already_applied }),
            )
        }
        Err(e) => {
            let status = status_for(&e);
            warn!(
                handle = %handle,
                %kind,
                error = %e,
                status = status.as_u16(),
                "Callback not applied"
            );
            reply(status, json!({ "error": e.to_string() }))
        }
    }
}

fn status_for(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::Permanent {
            source: BackendError::NotFound { .. },
            ..
        }
        | DispatchError::Store(DatabaseError::NotFound { .. }) => StatusCode::NOT_FOUND,
        DispatchError::Permanent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::Retryable { .. } | DispatchError::Store(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
