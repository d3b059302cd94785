//! Webhook entry point: one inbound update per request, always answered 200.

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::conversation::engine::{Engine, EngineSettings};
use crate::conversation::ports::{RepositoryError, Services};
use crate::conversation::types::{Commit, Event};
use crate::handlers::access::{deny_access, is_owner};
use crate::handlers::update::{Envelope, InboundUpdate};
use crate::state::AppState;
use crate::utils::timing::{complete_turn_timer, start_turn_timer};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

const CONFLICT_TEXT: &str =
    "La conversación cambió mientras procesaba tu mensaje. Repite el último paso.";
const FAILURE_TEXT: &str =
    "⚠️ Ocurrió un error inesperado procesando tu mensaje. Quedó registrado para revisión.";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub fallback_owner_id: String,
    pub engine: EngineSettings,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub database: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Handled,
    Denied,
    Duplicate,
    Conflict,
    Ignored,
    Malformed,
    Failed,
}

impl TurnStatus {
    pub fn label(self) -> &'static str {
        match self {
            TurnStatus::Handled => "success",
            TurnStatus::Denied => "denied",
            TurnStatus::Duplicate => "duplicate",
            TurnStatus::Conflict => "conflict",
            TurnStatus::Ignored => "ignored",
            TurnStatus::Malformed => "malformed",
            TurnStatus::Failed => "error",
        }
    }
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(telegram_webhook))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub fn secret_matches(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| provided == expected)
}

async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    if !secret_matches(state.webhook_secret.as_deref(), &headers) {
        warn!("Dropping webhook delivery with a missing or wrong secret token");
        return (StatusCode::OK, Json(WebhookResponse { ok: true }));
    }

    let payload = String::from_utf8_lossy(&body);
    let status = process_payload(&state.services, &state.settings, &payload).await;
    debug!("Webhook delivery finished with status {}", status.label());
    (StatusCode::OK, Json(WebhookResponse { ok: true }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                ok: true,
                database: "ok",
            }),
        ),
        Err(err) => {
            warn!("Health check failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    ok: false,
                    database: "unreachable",
                }),
            )
        }
    }
}

/// Runs one delivery to completion. Never fails: unexpected errors are written
/// to the diagnostic log with the raw payload and reported to the chat.
pub async fn process_payload(
    services: &Services,
    settings: &DispatchSettings,
    payload: &str,
) -> TurnStatus {
    let update = match serde_json::from_str::<InboundUpdate>(payload) {
        Ok(update) => update,
        Err(err) => {
            warn!("Malformed webhook payload: {}", err);
            if let Err(log_err) = services
                .catalog
                .append_log(&format!("malformed update: {err}"), payload)
                .await
            {
                warn!("Failed to record malformed payload: {}", log_err);
            }
            return TurnStatus::Malformed;
        }
    };

    let Some(envelope) = update.envelope() else {
        debug!("Ignoring update {} without a sender", update.update_id);
        return TurnStatus::Ignored;
    };

    let event = update.event();
    let mut timer = start_turn_timer(
        update.update_id,
        event.kind(),
        Some(envelope.chat_id),
        Some(envelope.actor_id),
    );

    match run_turn(services, settings, update.update_id, &envelope, event).await {
        Ok(status) => {
            complete_turn_timer(&mut timer, status.label(), None);
            status
        }
        Err(err) => {
            error!("Update {} failed: {:#}", update.update_id, err);
            if let Err(log_err) = services.catalog.append_log(&format!("{err:#}"), payload).await {
                error!("Failed to write diagnostic log: {}", log_err);
            }
            if let Err(send_err) = services
                .gateway
                .send_text(envelope.chat_id, FAILURE_TEXT, None)
                .await
            {
                warn!("Failed to report error to chat {}: {}", envelope.chat_id, send_err);
            }
            complete_turn_timer(&mut timer, TurnStatus::Failed.label(), Some(err.to_string()));
            TurnStatus::Failed
        }
    }
}

async fn run_turn(
    services: &Services,
    settings: &DispatchSettings,
    update_id: i64,
    envelope: &Envelope,
    event: Event,
) -> Result<TurnStatus> {
    if let Some(callback_id) = envelope.callback_id.as_deref() {
        if let Err(err) = services.gateway.acknowledge(callback_id).await {
            warn!("Failed to acknowledge callback {}: {}", callback_id, err);
        }
    }

    let record = services.conversations.load_conversation().await?;
    if !is_owner(
        envelope.actor_id,
        &record.owner_identity,
        &settings.fallback_owner_id,
    ) {
        deny_access(services.gateway.as_ref(), envelope.chat_id, envelope.actor_id).await;
        return Ok(TurnStatus::Denied);
    }

    if !services.conversations.claim_update(update_id).await? {
        info!("Skipping replayed update {}", update_id);
        return Ok(TurnStatus::Duplicate);
    }

    let outcome = Engine::new(services, &settings.engine, envelope.chat_id)
        .advance(&record, event)
        .await;
    match outcome.commit {
        Commit::Deferred => {}
        Commit::Written { version } => {
            debug!("Conversation settled at version {} before a catalog change", version);
            return Ok(TurnStatus::Handled);
        }
        Commit::Superseded => {
            // The turn that won the race already answered the operator.
            info!("Update {} superseded by a concurrent turn", update_id);
            return Ok(TurnStatus::Conflict);
        }
    }
    if !outcome.changes(&record) {
        return Ok(TurnStatus::Handled);
    }

    let next = record.advanced(outcome);
    match services.conversations.save_conversation(&next).await {
        Ok(version) => {
            debug!(
                "Conversation moved to {} (version {})",
                next.state.as_str(),
                version
            );
            Ok(TurnStatus::Handled)
        }
        Err(RepositoryError::Conflict { expected_version }) => {
            warn!(
                "Conversation changed during update {} (read version {})",
                update_id, expected_version
            );
            if let Err(err) = services
                .gateway
                .send_text(envelope.chat_id, CONFLICT_TEXT, None)
                .await
            {
                warn!("Failed to report conflict to chat {}: {}", envelope.chat_id, err);
            }
            Ok(TurnStatus::Conflict)
        }
        Err(err) => Err(err.into()),
    }
}
