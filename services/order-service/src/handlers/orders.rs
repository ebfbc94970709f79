use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::utils::auth_middleware::{AuthCustomer, AuthPrincipal, AuthShopOwner};

use crate::{
    config::AppState,
    domain::order::{
        ApprovalOutcome, CancelOrderRequest, CreateOrderRequest, CreateOrderResponse, Order,
        OrderDetailResponse, OrderQueryParams, RejectOrderRequest, UpdateOrderStatusRequest,
    },
    error::AppResult,
};

// Customer checkout cart menjadi order
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "orders",
    security(("bearer_auth" = [])),
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order dibuat, menunggu approval toko", body = CreateOrderResponse),
        (status = 409, description = "Toko tidak menerima order"),
        (status = 422, description = "Input tidak valid"),
    )
)]
pub async fn create_order(
    AuthCustomer(principal): AuthCustomer,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<CreateOrderResponse>)> {
    let response = state.workflow.create_order(principal, payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

// Daftar order milik customer yang login
#[utoipa::path(
    get,
    path = "/api/orders/my",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(OrderQueryParams),
    responses(
        (status = 200, description = "Daftar order customer", body = [Order]),
    )
)]
pub async fn get_my_orders(
    AuthCustomer(principal): AuthCustomer,
    State(state): State<AppState>,
    Query(params): Query<OrderQueryParams>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state.workflow.list_my_orders(principal, params).await?;
    Ok(Json(orders))
}

// Detail order beserta item
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Detail order", body = OrderDetailResponse),
        (status = 403, description = "Bukan order Anda"),
        (status = 404, description = "Order tidak ditemukan"),
    )
)]
pub async fn get_order(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<OrderDetailResponse>> {
    let detail = state.workflow.get_order(principal, id).await?;
    Ok(Json(detail))
}

// Daftar order masuk untuk toko
#[utoipa::path(
    get,
    path = "/api/shops/{shop_id}/orders",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(
        ("shop_id" = i32, Path, description = "Shop ID"),
        OrderQueryParams
    ),
    responses(
        (status = 200, description = "Daftar order toko", body = [Order]),
        (status = 403, description = "Bukan pemilik toko"),
    )
)]
pub async fn get_shop_orders(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(shop_id): Path<i32>,
    Query(params): Query<OrderQueryParams>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .workflow
        .list_shop_orders(principal, shop_id, params)
        .await?;
    Ok(Json(orders))
}

// Approve order: potong stok + buat delivery request (idempotent)
#[utoipa::path(
    post,
    path = "/api/orders/{id}/accept",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order di-approve dan delivery dibuat", body = ApprovalOutcome),
        (status = 409, description = "Stok tidak cukup atau status tidak valid"),
        (status = 503, description = "Database sementara tidak tersedia"),
    )
)]
pub async fn accept_order(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApprovalOutcome>> {
    let outcome = state.workflow.approve_order(principal, id).await?;
    Ok(Json(outcome))
}

// Tolak seluruh order dengan alasan
#[utoipa::path(
    post,
    path = "/api/orders/{id}/reject",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    request_body = RejectOrderRequest,
    responses(
        (status = 200, description = "Order ditolak", body = Order),
        (status = 409, description = "Order sudah diproses"),
        (status = 422, description = "Alasan wajib diisi"),
    )
)]
pub async fn reject_order(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RejectOrderRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .workflow
        .reject_order(principal, id, &payload.reason)
        .await?;
    Ok(Json(order))
}

// Update status order dari dashboard toko
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status order diperbarui", body = Order),
        (status = 409, description = "Transisi status tidak valid"),
    )
)]
pub async fn update_order_status(
    AuthShopOwner(principal): AuthShopOwner,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = state.workflow.update_status(principal, id, payload).await?;
    Ok(Json(order))
}

// Cancel order oleh customer, pemilik toko, atau admin
#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    tag = "orders",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order dibatalkan", body = Order),
        (status = 409, description = "Order sudah diambil delivery agent"),
    )
)]
pub async fn cancel_order(
    AuthPrincipal(principal): AuthPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<Order>> {
    let order = state
        .workflow
        .cancel_order(principal, id, &payload.reason)
        .await?;
    Ok(Json(order))
}
