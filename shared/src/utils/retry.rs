use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

// Konfigurasi retry untuk write yang idempotent
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }
}

/// Jalankan operasi dengan linear backoff, hanya untuk error yang transient.
/// Operasi harus aman diulang (dijaga oleh status guard di query).
pub async fn retry_transient<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                tracing::warn!(
                    "🔁 {} gagal (attempt {}/{}): {}",
                    label,
                    attempt,
                    policy.max_attempts,
                    e
                );
                tokio::time::sleep(policy.base_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    tracing::error!("❌ {} gagal setelah {} attempts: {}", label, attempt, e);
                }
                return Err(e);
            }
        }
    }
}
