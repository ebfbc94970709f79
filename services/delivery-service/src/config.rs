use shared::utils::{
    auth_middleware::AuthKeys,
    notifier::notifier_from_url,
    rate_limit::RateLimiter,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::{repositories::PgDeliveryStore, workflow::DeliveryWorkflow};

// Konfigurasi aplikasi dari environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub notification_service_url: Option<String>,
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    // Schema database dikelola order-service (RUN_MIGRATIONS)
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL harus diset")?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| "JWT_SECRET harus diset")?;

        let environment = env::var("RUST_ENV")
            .unwrap_or_else(|_| "development".to_string());

        if environment == "production" && jwt_secret.contains("change-this") {
            return Err("JWT_SECRET masih default! Ganti untuk production".to_string());
        }

        let server_host = env::var("DELIVERY_SERVICE_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("DELIVERY_SERVICE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3011);

        Ok(AppConfig {
            database_url,
            server_host,
            server_port,
            environment,
            jwt_secret,
            redis_url: optional_env("REDIS_URL"),
            notification_service_url: optional_env("NOTIFICATION_SERVICE_URL"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn host(&self) -> &str {
        &self.server_host
    }

    pub fn port(&self) -> u16 {
        self.server_port
    }
}

// Pool kecil: query delivery pendek dan polling agent ringan
pub async fn init_db_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    tracing::info!("Database connected");
    Ok(pool)
}

pub async fn check_db_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1")
        .fetch_optional(pool)
        .await
        .is_ok()
}

// Application state yang di-share ke semua handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: AppConfig,
    pub workflow: Arc<DeliveryWorkflow>,
    pub auth: AuthKeys,
    pub rate_limiter: Option<RateLimiter>,
}

impl axum::extract::FromRef<AppState> for AuthKeys {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, String> {
        let db = init_db_pool(&config.database_url)
            .await
            .map_err(|e| format!("Failed to init database: {}", e))?;

        let notifier = notifier_from_url(config.notification_service_url.as_deref());
        let workflow = DeliveryWorkflow::new(Arc::new(PgDeliveryStore::new(db.clone())), notifier);

        let rate_limiter = match config.redis_url.as_deref() {
            Some(url) => match RateLimiter::new("delivery-service", url) {
                Ok(limiter) => Some(limiter),
                Err(e) => {
                    tracing::warn!("⚠️  Rate limiter tidak aktif: {}", e);
                    None
                }
            },
            None => None,
        };

        let auth = AuthKeys::new(&config.jwt_secret)
            .map_err(|e| format!("Failed to init JWT verifier: {}", e))?;

        Ok(AppState {
            auth,
            db,
            config,
            workflow: Arc::new(workflow),
            rate_limiter,
        })
    }

    pub async fn health_check(&self) -> HealthStatus {
        let db_healthy = check_db_health(&self.db).await;

        HealthStatus {
            service: "delivery-service".to_string(),
            database: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
            overall: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct HealthStatus {
    pub service: String,
    pub database: String,
    pub overall: String,
}
