// Port notifikasi untuk perubahan state workflow.
// Client tetap polling; port ini memungkinkan push channel tanpa mengubah business logic.
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::{
    models::status::{DeliveryStatus, OrderStatus},
    utils::http_client::{HttpClientError, ServiceClient},
};

// Event yang dipublish oleh order-service dan delivery-service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    OrderCreated {
        order_id: i32,
        shop_id: i32,
        customer_id: i32,
    },
    OrderStatusChanged {
        order_id: i32,
        customer_id: i32,
        status: OrderStatus,
    },
    DeliveryDispatched {
        delivery_id: i32,
        order_id: i32,
    },
    DeliveryAssigned {
        delivery_id: i32,
        order_id: i32,
        delivery_agent_id: i32,
    },
    DeliveryStatusChanged {
        delivery_id: i32,
        order_id: i32,
        status: DeliveryStatus,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::OrderCreated { .. } => "order_created",
            WorkflowEvent::OrderStatusChanged { .. } => "order_status_changed",
            WorkflowEvent::DeliveryDispatched { .. } => "delivery_dispatched",
            WorkflowEvent::DeliveryAssigned { .. } => "delivery_assigned",
            WorkflowEvent::DeliveryStatusChanged { .. } => "delivery_status_changed",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Gagal mengirim event: {0}")]
    Delivery(#[from] HttpClientError),
}

#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError>;
}

/// Publish event secara best-effort. Kegagalan hanya di-log, tidak pernah memblok transisi.
pub async fn publish(notifier: &dyn EventNotifier, event: WorkflowEvent) {
    let name = event.name();
    if let Err(e) = notifier.notify(event).await {
        tracing::warn!("⚠️  Event {} tidak terkirim: {}", name, e);
    }
}

// Kirim event ke notification-service via HTTP
pub struct HttpNotifier {
    client: ServiceClient,
}

impl HttpNotifier {
    pub fn new(base_url: &str) -> Result<Self, NotifyError> {
        let client = ServiceClient::new(base_url, Duration::from_secs(5))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventNotifier for HttpNotifier {
    async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
        self.client.post_json("/internal/events", &event).await?;
        Ok(())
    }
}

// Fallback ketika notification-service tidak dikonfigurasi
pub struct LogNotifier;

#[async_trait]
impl EventNotifier for LogNotifier {
    async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError> {
        tracing::info!("📣 Event {}: {:?}", event.name(), event);
        Ok(())
    }
}

/// Pilih notifier berdasarkan konfigurasi
pub fn notifier_from_url(url: Option<&str>) -> Arc<dyn EventNotifier> {
    match url.map(HttpNotifier::new) {
        Some(Ok(notifier)) => Arc::new(notifier),
        Some(Err(e)) => {
            tracing::warn!("⚠️  HttpNotifier gagal dibuat ({}), fallback ke LogNotifier", e);
            Arc::new(LogNotifier)
        }
        None => Arc::new(LogNotifier),
    }
}
