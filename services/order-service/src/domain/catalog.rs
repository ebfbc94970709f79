use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::ShopStatus;
use utoipa::ToSchema;

// Toko milik shopkeeper/farmer, titik pickup delivery
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Shop {
    pub id: i32,
    pub owner_id: i32,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: ShopStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    // Hanya toko approved yang bisa menerima order
    pub fn accepts_orders(&self) -> bool {
        self.status == ShopStatus::Approved
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

// Produk dengan stok sebagai single source of truth
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Product {
    pub id: i32,
    pub shop_id: i32,
    pub name: String,
    pub price: f64,
    pub quantity: i32,
    pub category: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub mfg_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|d| d < today).unwrap_or(false)
    }
}

// Alamat tersimpan di address book customer
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CustomerAddress {
    pub id: i32,
    pub customer_id: i32,
    pub address_line: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Format alamat satu baris untuk order dan delivery
pub fn format_address(line: &str, city: &str, state: &str, pincode: &str) -> String {
    format!(
        "{}, {}, {} - {}",
        line.trim(),
        city.trim(),
        state.trim(),
        pincode.trim()
    )
}
