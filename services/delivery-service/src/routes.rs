// API Routes untuk delivery-service dengan OpenAPI documentation
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
    domain::delivery::{
        AcceptDeliveryRequest, AvailabilityToggle, Delivery, DeliveryAgent, UpdateDeliveryRequest,
    },
    handlers::{agents, deliveries},
};

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
        deliveries::list_deliveries,
        deliveries::get_delivery,
        deliveries::accept_delivery,
        deliveries::update_delivery_status,
        agents::get_me,
        agents::update_availability,
    ),
    modifiers(&SecurityAddon),
    components(
        schemas(
            Delivery,
            DeliveryAgent,
            AcceptDeliveryRequest,
            UpdateDeliveryRequest,
            AvailabilityToggle,
            HealthStatus,
            shared::DeliveryStatus,
            shared::AgentStatus,
        )
    ),
    tags(
        (name = "deliveries", description = "Polling, klaim, dan progres delivery"),
        (name = "agents", description = "Profil dan ketersediaan delivery agent"),
    ),
    info(
        title = "PASAR - Delivery Service API",
        description = "API lifecycle delivery marketplace\n\n## Features\n\n- 🛵 Klaim delivery atomik, satu agent per delivery\n- 📍 Progres picked_up → in_transit → delivered\n- 📸 Foto bukti pengiriman wajib\n- 🔒 JWT Authentication\n\n## Authentication\n\nSemua endpoint butuh JWT Bearer token di header `Authorization: Bearer {token}`.",
        version = "1.0.0",
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub struct ApiDoc;

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

fn build_api_routes(state: &AppState) -> Router<AppState> {
    let mut api = Router::new()
        .route(
            "/deliveries",
            get(deliveries::list_deliveries).put(deliveries::update_delivery_status),
        )
        .route("/deliveries/accept", post(deliveries::accept_delivery))
        .route("/deliveries/{id}", get(deliveries::get_delivery))
        .route("/agents/me", get(agents::get_me))
        .route("/agents/me/availability", put(agents::update_availability));

    if let Some(limiter) = state.rate_limiter.clone() {
        api = api.layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    api.layer(from_fn_with_state(state.auth.clone(), jwt_auth_middleware))
}

async fn security_headers_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
    );

    if let Ok(version) = HeaderValue::from_str(env!("CARGO_PKG_VERSION")) {
        headers.insert("X-Delivery-Service-Version", version);
    }
    headers.remove(header::SERVER);

    response
}
