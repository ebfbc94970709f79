use axum::{extract::State, Json};
use shared::utils::auth_middleware::AuthDeliveryAgent;

use crate::{
    config::AppState,
    domain::delivery::{AvailabilityToggle, DeliveryAgent},
    error::AppResult,
};

#[utoipa::path(
    get,
    path = "/api/agents/me",
    tag = "agents",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profil delivery agent", body = DeliveryAgent),
        (status = 404, description = "Profil belum terdaftar"),
    )
)]
pub async fn get_me(
    AuthDeliveryAgent(principal): AuthDeliveryAgent,
    State(state): State<AppState>,
) -> AppResult<Json<DeliveryAgent>> {
    let agent = state.workflow.my_agent(principal).await?;
    Ok(Json(agent))
}

// Toggle online/offline
#[utoipa::path(
    put,
    path = "/api/agents/me/availability",
    tag = "agents",
    security(("bearer_auth" = [])),
    request_body = AvailabilityToggle,
    responses(
        (status = 200, description = "Ketersediaan diperbarui", body = DeliveryAgent),
        (status = 403, description = "Agent belum terverifikasi"),
    )
)]
pub async fn update_availability(
    AuthDeliveryAgent(principal): AuthDeliveryAgent,
    State(state): State<AppState>,
    Json(payload): Json<AvailabilityToggle>,
) -> AppResult<Json<DeliveryAgent>> {
    let agent = state
        .workflow
        .set_availability(principal, payload.is_available)
        .await?;
    Ok(Json(agent))
}
