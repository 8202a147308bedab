//! Axum route handlers for the facilitator service.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use sol402::facilitator::Facilitator;
use sol402::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

use crate::error::ServiceError;
use crate::registry::FacilitatorRegistry;

/// Shared application state.
pub type FacilitatorState = Arc<FacilitatorRegistry>;

/// `GET /supported` — the payment kinds this facilitator settles.
pub async fn get_supported(
    State(registry): State<FacilitatorState>,
) -> Result<Json<SupportedResponse>, ServiceError> {
    let supported = registry.supported().await?;
    Ok(Json(supported))
}

/// `POST /verify` — validates a payment payload against requirements.
pub async fn post_verify(
    State(registry): State<FacilitatorState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ServiceError> {
    let response = registry.verify(request).await?;
    Ok(Json(response))
}

/// `POST /settle` — submits and confirms a verified payment.
pub async fn post_settle(
    State(registry): State<FacilitatorState>,
    Json(request): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, ServiceError> {
    let response = registry.settle(request).await?;
    Ok(Json(response))
}

/// `GET /health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the facilitator router.
pub fn facilitator_router(state: FacilitatorState) -> axum::Router {
    axum::Router::new()
        .route("/supported", axum::routing::get(get_supported))
        .route("/verify", axum::routing::post(post_verify))
        .route("/settle", axum::routing::post(post_settle))
        .route("/health", axum::routing::get(health))
        .with_state(state)
}
