use axum::{
    extract::{Path, State},
    Json,
};
use shared::utils::auth_middleware::AuthShopOwner;

use crate::{
    config::AppState,
    domain::order::{ItemApprovalRequest, OrderItem},
    error::AppResult,
};

// Approve/reject satu item order
#[utoipa::path(
    put,
    path = "/api/order_items/{id}/approval",
    tag = "order-items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order item ID")),
    request_body = ItemApprovalRequest,
    responses(
        (status = 200, description = "Status approval item diperbarui", body = OrderItem),
        (status = 409, description = "Order sudah final"),
        (status = 422, description = "Alasan penolakan wajib diisi"),
    )
)]
pub async fn update_item_approval(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ItemApprovalRequest>,
) -> AppResult<Json<OrderItem>> {
    let item = state
        .workflow
        .set_item_approval(principal, id, payload)
        .await?;
    Ok(Json(item))
}

// Approve semua item order sekaligus
#[utoipa::path(
    post,
    path = "/api/orders/{id}/items/approve-all",
    tag = "order-items",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Semua item di-approve", body = [OrderItem]),
        (status = 409, description = "Order sudah final"),
    )
)]
pub async fn approve_all_items(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<OrderItem>>> {
    let items = state.workflow.approve_all_items(principal, id).await?;
    Ok(Json(items))
}
