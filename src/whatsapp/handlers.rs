// HTTP handlers for the WhatsApp webhook

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::whatsapp::metrics::GatewayHealth;
use crate::whatsapp::payload::WebhookPayload;
use crate::AppState;

const SUBSCRIBE_MODE: &str = "subscribe";

/// Verification handshake sent by the platform
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Body of every webhook POST response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub status: String,
    pub received: bool,
    pub request_id: String,
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub duplicates: usize,
}

/// Handler for GET /webhook
#[utoipa::path(
    get,
    path = "/webhook",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Challenge echoed back", body = String),
        (status = 400, description = "Missing hub parameters"),
        (status = 403, description = "Token mismatch"),
        (status = 500, description = "Verify token not configured")
    ),
    tag = "whatsapp"
)]
pub async fn verify_webhook(State(state): State<AppState>, Query(query): Query<VerifyQuery>) -> Response {
    let Some(expected) = state.verify_token.as_deref() else {
        tracing::error!("Webhook verification attempted but WHATSAPP_VERIFY_TOKEN is not set");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Verify token not configured").into_response();
    };

    let (Some(mode), Some(token), Some(challenge)) = (query.mode, query.verify_token, query.challenge) else {
        tracing::debug!("Webhook verification missing parameters");
        return (StatusCode::BAD_REQUEST, "Missing hub.mode, hub.verify_token or hub.challenge").into_response();
    };

    if mode == SUBSCRIBE_MODE && token == expected {
        tracing::info!("Webhook verified");
        (StatusCode::OK, challenge).into_response()
    } else {
        tracing::warn!("Webhook verification rejected (mode '{}')", mode);
        (StatusCode::FORBIDDEN, "Verification failed").into_response()
    }
}

/// Handler for POST /webhook
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Envelope accepted", body = WebhookAck),
        (status = 400, description = "Malformed envelope", body = WebhookAck)
    ),
    tag = "whatsapp"
)]
pub async fn receive_webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<WebhookAck>) {
    let request_id = Uuid::new_v4().to_string();

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!("Malformed webhook body ({}): {}", request_id, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookAck {
                    status: "error".to_string(),
                    received: false,
                    request_id,
                    processed: 0,
                    duplicates: 0,
                }),
            );
        }
    };

    let summary = state.gateway.handle_payload(&payload).await;
    tracing::debug!(
        "Webhook {} handled: {} received, {} processed, {} duplicates, {} ignored",
        request_id,
        summary.received,
        summary.processed,
        summary.duplicates,
        summary.ignored
    );

    (
        StatusCode::OK,
        Json(WebhookAck {
            status: "ok".to_string(),
            received: true,
            request_id,
            processed: summary.processed,
            duplicates: summary.duplicates,
        }),
    )
}

/// Handler for GET /api/whatsapp/health
#[utoipa::path(
    get,
    path = "/api/whatsapp/health",
    responses((status = 200, description = "Gateway counters and delivery health", body = GatewayHealth)),
    tag = "whatsapp"
)]
pub async fn gateway_health(State(state): State<AppState>) -> Json<GatewayHealth> {
    Json(state.gateway.metrics().snapshot())
}
