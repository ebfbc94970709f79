use axum::{
    extract::{Path, Query, State},
    Json,
};
use shared::utils::auth_middleware::{AuthDeliveryAgent, AuthPrincipal};

use crate::{
    config::AppState,
    domain::delivery::{AcceptDeliveryRequest, Delivery, DeliveryQuery, UpdateDeliveryRequest},
    error::AppResult,
};

// Polling delivery: unassigned untuk agent online, atau milik agent tertentu
#[utoipa::path(
    get,
    path = "/api/deliveries",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(DeliveryQuery),
    responses(
        (status = 200, description = "Daftar delivery", body = [Delivery]),
        (status = 400, description = "Kombinasi filter tidak valid"),
        (status = 403, description = "Delivery milik agent lain"),
    )
)]
pub async fn list_deliveries(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Query(query): Query<DeliveryQuery>,
) -> AppResult<Json<Vec<Delivery>>> {
    let deliveries = state.workflow.list(principal, query).await?;
    Ok(Json(deliveries))
}

#[utoipa::path(
    get,
    path = "/api/deliveries/{id}",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Detail delivery", body = Delivery),
        (status = 403, description = "Tidak punya akses"),
        (status = 404, description = "Delivery tidak ditemukan"),
    )
)]
pub async fn get_delivery(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Delivery>> {
    let delivery = state.workflow.get(principal, id).await?;
    Ok(Json(delivery))
}

// Agent mengambil delivery, hanya satu yang berhasil
#[utoipa::path(
    post,
    path = "/api/deliveries/accept",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    request_body = AcceptDeliveryRequest,
    responses(
        (status = 200, description = "Delivery berhasil diambil", body = Delivery),
        (status = 403, description = "Agent belum terverifikasi atau bukan diri sendiri"),
        (status = 409, description = "Sudah diambil agent lain atau dibatalkan"),
    )
)]
pub async fn accept_delivery(
    AuthDeliveryAgent(principal): AuthDeliveryAgent,
    State(state): State<AppState>,
    Json(payload): Json<AcceptDeliveryRequest>,
) -> AppResult<Json<Delivery>> {
    let delivery = state.workflow.accept(principal, payload).await?;
    Ok(Json(delivery))
}

// Update progres: picked_up, in_transit, delivered (wajib foto)
#[utoipa::path(
    put,
    path = "/api/deliveries",
    tag = "deliveries",
    security(("bearer_auth" = [])),
    request_body = UpdateDeliveryRequest,
    responses(
        (status = 200, description = "Status delivery diperbarui", body = Delivery),
        (status = 403, description = "Bukan agent yang mengambil delivery ini"),
        (status = 409, description = "Transisi status tidak valid"),
        (status = 422, description = "Foto bukti pengiriman tidak ada"),
    )
)]
pub async fn update_delivery_status(
    AuthDeliveryAgent(principal): AuthDeliveryAgent,
    State(state): State<AppState>,
    Json(payload): Json<UpdateDeliveryRequest>,
) -> AppResult<Json<Delivery>> {
    let delivery = state.workflow.update_status(principal, payload).await?;
    Ok(Json(delivery))
}
