// Main entry point untuk delivery-service
// Mengelola polling, klaim agent, dan progres delivery sampai bukti foto
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    Json, Router,
};
use dotenvy::dotenv;
use serde_json::json;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod domain;
mod error;
mod handlers;
mod repositories;
mod routes;
mod workflow;

use config::{AppConfig, AppState};
use error::{AppError, AppResult};
use routes::create_router;

#[tokio::main]
async fn main() -> AppResult<()> {
    match dotenv() {
        Ok(path) => println!("✅ Environment loaded dari: {:?}", path),
        Err(e) => println!("⚠️  Tidak bisa load .env: {} (menggunakan system env)", e),
    }

    // Initialize tracing subscriber untuk structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delivery_service=debug,shared=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Memulai PASAR - Delivery Service");

    let config = AppConfig::from_env()
        .map_err(|e| AppError::internal(format!("Gagal load konfigurasi: {}", e)))?;

    tracing::info!("✅ Konfigurasi berhasil dimuat");
    tracing::info!("📦 Database URL: {}", mask_connection_string(&config.database_url));
    tracing::info!("🔧 Environment: {}", config.environment);
    tracing::info!("🌐 Server: {}:{}", config.host(), config.port());

    let app_state = AppState::new(config)
        .await
        .map_err(|e| AppError::internal(format!("Gagal inisialisasi app state: {}", e)))?;

    tracing::info!("✅ Database connection berhasil");

    if app_state.rate_limiter.is_none() {
        tracing::warn!("⚠️  REDIS_URL tidak diset, rate limiting nonaktif");
    }

    let app = create_app(app_state.clone());

    let addr: SocketAddr = format!("{}:{}", app_state.config.host(), app_state.config.port())
        .parse()
        .map_err(|e| AppError::internal(format!("Alamat server tidak valid: {}", e)))?;

    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("📚 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Gagal bind server: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    tracing::info!("✅ Server shutdown gracefully");
    Ok(())
}

// Build aplikasi dengan middleware yang sesuai
fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8080".to_string())
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .merge(create_router(state.clone()))
        .fallback(not_found_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
}

// Handler untuk 404 errors
async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "data_tidak_ditemukan",
            "pesan": "API endpoint tidak ditemukan",
        })),
    )
}

// Signal handler untuk graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Gagal setup Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Gagal setup terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("🛑 Received terminate signal, shutting down gracefully...");
        },
    }
}

// Mask password di connection string sebelum di-log
fn mask_connection_string(conn_str: &str) -> String {
    if conn_str.is_empty() {
        return "Not Set".to_string();
    }

    let Some(at_pos) = conn_str.rfind('@') else {
        return "Invalid Format".to_string();
    };

    let scheme_end = conn_str.find("://").map(|i| i + 3).unwrap_or(0);
    let (credentials, host) = conn_str.split_at(at_pos);

    match credentials[scheme_end..].find(':') {
        Some(colon_pos) => format!("{}:****{}", &credentials[..scheme_end + colon_pos], host),
        None => format!("{}****{}", &credentials[..scheme_end], host),
    }
}
