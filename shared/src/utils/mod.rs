pub mod auth_middleware;
pub mod http_client;
pub mod jwt;
pub mod notifier;
pub mod rate_limit;
pub mod retry;
pub mod validation;
