use axum::{extract::State, Json};
use shared::utils::auth_middleware::AuthPrincipal;

use crate::{
    config::AppState,
    domain::order::{AvailabilityRequest, ProductAvailability},
    error::AppResult,
};

// Cek stok terkini untuk produk di cart (dipoll customer)
#[utoipa::path(
    post,
    path = "/api/products/availability",
    tag = "products",
    security(("bearer_auth" = [])),
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Stok produk saat ini", body = [ProductAvailability]),
        (status = 422, description = "Daftar produk kosong atau terlalu banyak"),
    )
)]
pub async fn check_availability(
    AuthPrincipal(_principal): AuthPrincipal,
    State(state): State<AppState>,
    Json(payload): Json<AvailabilityRequest>,
) -> AppResult<Json<Vec<ProductAvailability>>> {
    let availability = state.workflow.product_availability(payload).await?;
    Ok(Json(availability))
}
