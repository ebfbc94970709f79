// Redis sliding-window rate limiting untuk order-service dan delivery-service.
// Budget dihitung per service, per user, per kelas limit (bukan per path), supaya
// /api/orders/1/accept dan /api/orders/2/accept berbagi kuota yang sama
// tapi klaim delivery tidak memakan kuota order.
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::Client;
use std::env;
use thiserror::Error;

use crate::models::claims::{Principal, Role};

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis tidak bisa dihubungi: {0}")]
    RedisConnection(#[source] redis::RedisError),
    #[error("Operasi Redis gagal: {0}")]
    RedisOperation(#[source] redis::RedisError),
    #[error("Konfigurasi rate limit tidak valid: {0}")]
    Configuration(String),
}

/// Kelas kuota. Write yang menyentuh stok atau klaim delivery punya kuota ketat sendiri.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitClass {
    Guest,
    Customer,
    ShopOwner,
    DeliveryAgent,
    Admin,
    Workflow,
}

impl LimitClass {
    pub fn classify(role: Option<Role>, method: &Method, path: &str) -> Self {
        if *method == Method::POST
            && (path == "/api/orders" || path.ends_with("/accept") || path.ends_with("/cancel"))
        {
            return LimitClass::Workflow;
        }

        match role {
            None => LimitClass::Guest,
            Some(Role::Customer) => LimitClass::Customer,
            Some(Role::Shopkeeper | Role::Farmer) => LimitClass::ShopOwner,
            Some(Role::DeliveryAgent) => LimitClass::DeliveryAgent,
            Some(Role::Admin) => LimitClass::Admin,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            LimitClass::Guest => "guest",
            LimitClass::Customer => "customer",
            LimitClass::ShopOwner => "shop_owner",
            LimitClass::DeliveryAgent => "delivery_agent",
            LimitClass::Admin => "admin",
            LimitClass::Workflow => "workflow",
        }
    }
}

// Kuota per jam, bisa di-override lewat env RATE_LIMIT_*
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub guest: u32,
    pub customer: u32,
    pub shop_owner: u32,
    pub delivery_agent: u32,
    pub admin: u32,
    pub workflow: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            guest: 100,
            customer: 600,
            shop_owner: 1000,
            // Polling tiap 5 detik = 720 request/jam
            delivery_agent: 1500,
            admin: 2000,
            workflow: 120,
            window_seconds: 3600,
        }
    }
}

fn env_limit(key: &str, default: u32) -> Result<u32, RateLimitError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|limit| *limit > 0)
            .ok_or_else(|| RateLimitError::Configuration(format!("{}={}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, RateLimitError> {
        let defaults = Self::default();
        Ok(Self {
            guest: env_limit("RATE_LIMIT_GUEST_REQUESTS", defaults.guest)?,
            customer: env_limit("RATE_LIMIT_CUSTOMER_REQUESTS", defaults.customer)?,
            shop_owner: env_limit("RATE_LIMIT_SHOPKEEPER_REQUESTS", defaults.shop_owner)?,
            delivery_agent: env_limit("RATE_LIMIT_AGENT_REQUESTS", defaults.delivery_agent)?,
            admin: env_limit("RATE_LIMIT_ADMIN_REQUESTS", defaults.admin)?,
            workflow: env_limit("RATE_LIMIT_WORKFLOW_REQUESTS", defaults.workflow)?,
            window_seconds: defaults.window_seconds,
        })
    }

    pub fn limit_for(&self, class: LimitClass) -> u32 {
        match class {
            LimitClass::Guest => self.guest,
            LimitClass::Customer => self.customer,
            LimitClass::ShopOwner => self.shop_owner,
            LimitClass::DeliveryAgent => self.delivery_agent,
            LimitClass::Admin => self.admin,
            LimitClass::Workflow => self.workflow,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub used: u32,
    pub reset_at: u64,
}

impl RateLimitDecision {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    client: Client,
    config: RateLimitConfig,
    service: &'static str,
}

impl RateLimiter {
    /// `service` memisahkan kuota antar service yang berbagi Redis
    pub fn new(service: &'static str, redis_url: &str) -> Result<Self, RateLimitError> {
        let client = Client::open(redis_url).map_err(RateLimitError::RedisConnection)?;
        Ok(Self {
            client,
            config: RateLimitConfig::from_env()?,
            service,
        })
    }

    /// Catat satu request dan putuskan apakah masih dalam kuota
    pub async fn check(&self, identifier: &str, class: LimitClass) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(RateLimitError::RedisConnection)?;

        let key = bucket_key(self.service, identifier, class);
        let now = chrono::Utc::now();
        let now_ms = now.timestamp_millis();
        let window_ms = (self.config.window_seconds * 1000) as i64;
        // Member unik per request, score = waktu request
        let member = format!("{}-{}", now_ms, now.timestamp_subsec_nanos());

        let (count,): (u32,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", now_ms - window_ms)
            .ignore()
            .zadd(&key, member, now_ms)
            .ignore()
            .zcard(&key)
            .expire(&key, self.config.window_seconds as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(RateLimitError::RedisOperation)?;

        Ok(decide(
            self.config.limit_for(class),
            count,
            now.timestamp() as u64 + self.config.window_seconds,
        ))
    }
}

fn bucket_key(service: &str, identifier: &str, class: LimitClass) -> String {
    format!("pasar:rate_limit:{}:{}:{}", service, identifier, class.key())
}

fn decide(limit: u32, used: u32, reset_at: u64) -> RateLimitDecision {
    RateLimitDecision {
        allowed: used <= limit,
        limit,
        used: used.min(limit),
        reset_at,
    }
}

/// Middleware Axum. Dipasang di dalam jwt_auth_middleware supaya principal sudah ada.
/// Redis error tidak memblok request (fail-open).
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let principal = request.extensions().get::<Principal>().copied();
    let identifier = client_identifier(&request, principal);
    let class = LimitClass::classify(
        principal.map(|p| p.role),
        request.method(),
        request.uri().path(),
    );

    match limiter.check(&identifier, class).await {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", decision.limit.into());
            headers.insert("X-RateLimit-Remaining", decision.remaining().into());
            headers.insert("X-RateLimit-Reset", decision.reset_at.into());
            response
        }
        Ok(decision) => {
            tracing::warn!(
                "🚨 Rate limit {} terlampaui oleh {} ({}/{})",
                class.key(),
                identifier,
                decision.used,
                decision.limit
            );

            let body = axum::Json(serde_json::json!({
                "error": "rate_limit_exceeded",
                "pesan": "Terlalu banyak request. Silakan coba lagi nanti.",
                "retryable": true,
                "reset_at": decision.reset_at,
            }));
            (StatusCode::TOO_MANY_REQUESTS, body).into_response()
        }
        Err(e) => {
            tracing::error!("💥 Rate limiter error, request diteruskan: {}", e);
            next.run(request).await
        }
    }
}

fn client_identifier(request: &Request, principal: Option<Principal>) -> String {
    if let Some(p) = principal {
        return format!("user:{}", p.id);
    }

    request
        .headers()
        .get("x-forwarded-for")
        .or_else(|| request.headers().get("x-real-ip"))
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}
