// Authentication middleware dan extractor principal untuk axum handlers
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    models::claims::{Principal, Role},
    utils::jwt::{extract_bearer_token, JwtError, TokenVerifier},
};

// Verifier JWT yang di-share ke middleware
#[derive(Clone)]
pub struct AuthKeys {
    verifier: Arc<TokenVerifier>,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Result<Self, JwtError> {
        Ok(Self {
            verifier: Arc::new(TokenVerifier::new(secret)?),
        })
    }
}

fn auth_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": error,
            "pesan": message,
        })),
    )
        .into_response()
}

// JWT Authentication middleware, inject Principal ke request extensions
pub async fn jwt_auth_middleware(
    State(keys): State<AuthKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let path = request.uri().path().to_string();

    let token = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .ok_or_else(|| {
            auth_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authorization header dengan Bearer token diperlukan",
            )
        })?
        .to_string();

    let principal = keys.verifier.principal(&token).map_err(|e| {
        tracing::debug!("Token ditolak untuk {}: {}", path, e);
        auth_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Token tidak valid atau expired",
        )
    })?;

    request.extensions_mut().insert(principal);

    tracing::debug!(
        "Principal authenticated - ID: {}, Role: {}, Endpoint: {}",
        principal.id,
        principal.role,
        path
    );

    Ok(next.run(request).await)
}

// Semua user yang sudah login
#[derive(Debug, Clone, Copy)]
pub struct AuthPrincipal(pub Principal);

// Customer yang membuat order
#[derive(Debug, Clone, Copy)]
pub struct AuthCustomer(pub Principal);

// Pemilik toko (shopkeeper/farmer) atau admin
#[derive(Debug, Clone, Copy)]
pub struct AuthShopOwner(pub Principal);

// Delivery agent atau admin
#[derive(Debug, Clone, Copy)]
pub struct AuthDeliveryAgent(pub Principal);

impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(AuthPrincipal)
            .ok_or_else(|| {
                auth_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "Authentication required",
                )
            })
    }
}

async fn principal_with_roles<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
    allowed: &[Role],
    message: &str,
) -> Result<Principal, Response> {
    let AuthPrincipal(principal) = AuthPrincipal::from_request_parts(parts, state).await?;

    if principal.is_admin() || allowed.contains(&principal.role) {
        Ok(principal)
    } else {
        Err(auth_error(StatusCode::FORBIDDEN, "akses_dilarang", message))
    }
}

impl<S> FromRequestParts<S> for AuthCustomer
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        principal_with_roles(parts, state, &[Role::Customer], "Customer access required")
            .await
            .map(AuthCustomer)
    }
}

impl<S> FromRequestParts<S> for AuthShopOwner
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        principal_with_roles(
            parts,
            state,
            &[Role::Shopkeeper, Role::Farmer],
            "Shopkeeper access required",
        )
        .await
        .map(AuthShopOwner)
    }
}

impl<S> FromRequestParts<S> for AuthDeliveryAgent
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        principal_with_roles(
            parts,
            state,
            &[Role::DeliveryAgent],
            "Delivery agent access required",
        )
        .await
        .map(AuthDeliveryAgent)
    }
}
