// API Routes untuk order-service dengan OpenAPI documentation
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use shared::utils::{auth_middleware::jwt_auth_middleware, rate_limit::rate_limit_middleware};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::{AppState, HealthStatus},
    domain::{
        catalog::{Product, Shop},
        order::{
            ApprovalOutcome, AvailabilityRequest, CancelOrderRequest, CartItemRequest,
            CreateOrderRequest, CreateOrderResponse, DeliveryAddressInput, DeliveryRecord,
            ItemApprovalRequest, Order, OrderDetailResponse, OrderItem, ProductAvailability,
            RejectOrderRequest, UpdateOrderStatusRequest,
        },
    },
    handlers::{order_items, orders, products},
};

// Security scheme modifier untuk Bearer authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::create_order,
        orders::get_my_orders,
        orders::get_order,
        orders::get_shop_orders,
        orders::accept_order,
        orders::reject_order,
        orders::update_order_status,
        orders::cancel_order,
        order_items::update_item_approval,
        order_items::approve_all_items,
        products::check_availability,
    ),
    modifiers(&SecurityAddon),
    components(
        schemas(
            CreateOrderRequest,
            CartItemRequest,
            DeliveryAddressInput,
            CreateOrderResponse,
            Order,
            OrderItem,
            OrderDetailResponse,
            DeliveryRecord,
            ApprovalOutcome,
            RejectOrderRequest,
            CancelOrderRequest,
            UpdateOrderStatusRequest,
            ItemApprovalRequest,
            AvailabilityRequest,
            ProductAvailability,
            Shop,
            Product,
            HealthStatus,
            shared::OrderStatus,
            shared::ApprovalStatus,
            shared::DeliveryStatus,
            shared::PaymentMethod,
            shared::ShopStatus,
        )
    ),
    tags(
        (name = "orders", description = "Order intake, review toko, approval dan pembatalan"),
        (name = "order-items", description = "Approval per item order"),
        (name = "products", description = "Cek stok produk"),
    ),
    info(
        title = "PASAR - Order Service API",
        description = "API workflow order marketplace multi-role\n\n## Features\n\n- 🛒 Checkout cart menjadi order\n- ✅ Approval toko dengan potong stok atomik\n- 🚚 Dispatch delivery request otomatis\n- 🔒 JWT Authentication\n- 🌐 Redis-based Rate Limiting\n\n## Authentication\n\nSemua endpoint butuh JWT Bearer token di header `Authorization: Bearer {token}`.",
        version = "1.0.0",
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub struct ApiDoc;

// Health check endpoint
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let health = state.health_check().await;
    let status = if health.overall == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub fn create_router(state: AppState) -> Router<AppState> {
    if state.config.is_production() {
        tracing::warn!("Running in PRODUCTION mode - strict validation enabled");
    } else {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    Router::new()
        .route("/health", get(health_check))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", build_api_routes(&state))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

// Semua route /api butuh JWT. Rate limit dipasang di dalam auth supaya principal sudah ada.
fn build_api_routes(state: &AppState) -> Router<AppState> {
    let mut api = Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/my", get(orders::get_my_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", put(orders::update_order_status))
        .route("/orders/{id}/accept", post(orders::accept_order))
        .route("/orders/{id}/reject", post(orders::reject_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route("/orders/{id}/items/approve-all", post(order_items::approve_all_items))
        .route("/order_items/{id}/approval", put(order_items::update_item_approval))
        .route("/shops/{shop_id}/orders", get(orders::get_shop_orders))
        .route("/products/availability", post(products::check_availability));

    if let Some(limiter) = state.rate_limiter.clone() {
        api = api.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    api.layer(from_fn_with_state(state.auth.clone(), jwt_auth_middleware))
}

// Security Headers Middleware untuk HTTP security
async fn security_headers_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let production = std::env::var("RUST_ENV").map(|e| e == "production").unwrap_or(false);
    if production {
        headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
    } else {
        headers.insert("X-Frame-Options", HeaderValue::from_static("SAMEORIGIN"));
    }
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );

    if let Ok(version) = HeaderValue::from_str(env!("CARGO_PKG_VERSION")) {
        headers.insert("X-Order-Service-Version", version);
    }
    headers.remove(header::SERVER);

    response
}
