use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{AgentStatus, DeliveryStatus};
use utoipa::ToSchema;

// Delivery request hasil dispatch order-service
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Delivery {
    pub id: i32,
    pub order_id: i32,
    pub delivery_agent_id: Option<i32>,
    pub status: DeliveryStatus,
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub delivery_phone: String,
    pub delivery_photo_url: Option<String>,
    pub delivery_photo_uploaded_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn is_assigned_to(&self, agent_id: i32) -> bool {
        self.delivery_agent_id == Some(agent_id)
    }

    pub fn is_claimable(&self) -> bool {
        self.delivery_agent_id.is_none() && self.status == DeliveryStatus::Unassigned
    }
}

// Profil delivery agent, id sama dengan user id
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DeliveryAgent {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicle_type: String,
    pub status: AgentStatus,
    pub is_available: bool,
    pub rating: f64,
    pub total_deliveries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
    pub fn is_verified(&self) -> bool {
        self.status == AgentStatus::Approved
    }

    // Hanya agent terverifikasi dan online yang melihat/mengambil delivery baru
    pub fn can_take_deliveries(&self) -> bool {
        self.is_verified() && self.is_available
    }
}

// Hasil transaksi penyelesaian delivery
#[derive(Debug, Clone)]
pub struct DeliveryCompletion {
    pub delivery: Delivery,
    /// Customer pemilik order, jika order ikut ditandai delivered
    pub customer_id: Option<i32>,
}

// Request agent mengambil delivery
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptDeliveryRequest {
    #[schema(example = 41)]
    pub delivery_id: i32,
    #[schema(example = 7)]
    pub delivery_agent_id: i32,
}

// Request update status delivery oleh agent
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDeliveryRequest {
    #[serde(rename = "deliveryId")]
    #[schema(example = 41)]
    pub delivery_id: i32,
    pub status: DeliveryStatus,
    /// Wajib untuk status delivered
    #[serde(alias = "deliveryPhotoUrl")]
    #[schema(example = "https://storage.pasar.in/proof/41.jpg")]
    pub delivery_photo_url: Option<String>,
}

// Query polling delivery
#[derive(Debug, Default, Deserialize, ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DeliveryQuery {
    /// Daftar delivery yang belum diambil agent
    pub unassigned_only: Option<bool>,
    /// Daftar delivery milik agent tertentu
    pub delivery_agent_id: Option<i32>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvailabilityToggle {
    pub is_available: bool,
}
