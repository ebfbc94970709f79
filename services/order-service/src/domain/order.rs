use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{ApprovalStatus, DeliveryStatus, OrderStatus, PaymentMethod};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use validator::Validate;

// Model utama Order dari database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Order {
    pub id: i32,
    pub customer_id: i32,
    pub shop_id: i32,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub delivery_phone: String,
    pub payment_method: PaymentMethod,
    pub payment_status: String,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub request_type: String,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.delivery_latitude.zip(self.delivery_longitude)
    }
}

// Item order, harga di-snapshot saat order dibuat
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OrderItem {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub price: f64,
    pub approval_status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    /// Jumlah yang dipotong dari stok saat order di-approve, 0 sebelumnya
    pub reserved_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Delivery hasil dispatch, dilihat dari sisi order-service
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct DeliveryRecord {
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
    pub created_at: DateTime<Utc>,
}

// Data order baru yang sudah divalidasi dan diberi harga
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i32,
    pub shop_id: i32,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub delivery_phone: String,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    pub fn total_amount(&self) -> f64 {
        self.subtotal + self.delivery_fee
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderLine {
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
    pub price: f64,
}

// Kebutuhan stok per produk untuk satu order
#[derive(Debug, Clone, PartialEq)]
pub struct StockLine {
    pub product_id: i32,
    pub product_name: String,
    pub quantity: i32,
}

impl StockLine {
    /// Agregasi item yang tidak di-reject per produk, urut product_id
    /// supaya urutan lock baris produk selalu sama antar transaksi.
    pub fn from_items(items: &[OrderItem]) -> Vec<StockLine> {
        let mut lines: BTreeMap<i32, StockLine> = BTreeMap::new();

        for item in items
            .iter()
            .filter(|i| i.approval_status != ApprovalStatus::Rejected)
        {
            lines
                .entry(item.product_id)
                .and_modify(|line| line.quantity += item.quantity)
                .or_insert_with(|| StockLine {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                });
        }

        lines.into_values().collect()
    }

    /// Stok yang benar-benar dipotong saat approval, untuk restock.
    /// Tidak bergantung pada approval_status saat ini.
    pub fn reserved(items: &[OrderItem]) -> Vec<StockLine> {
        let mut lines: BTreeMap<i32, StockLine> = BTreeMap::new();

        for item in items.iter().filter(|i| i.reserved_quantity > 0) {
            lines
                .entry(item.product_id)
                .and_modify(|line| line.quantity += item.reserved_quantity)
                .or_insert_with(|| StockLine {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.reserved_quantity,
                });
        }

        lines.into_values().collect()
    }
}

// Delivery yang akan dibuat saat order di-approve
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub pickup_address: String,
    pub pickup_latitude: Option<f64>,
    pub pickup_longitude: Option<f64>,
    pub delivery_address: String,
    pub delivery_latitude: Option<f64>,
    pub delivery_longitude: Option<f64>,
    pub delivery_phone: String,
}

// Satu unit kerja approval: status order, potong stok, dispatch delivery.
// Kebutuhan stok dihitung ulang dari item di dalam transaksi.
#[derive(Debug, Clone)]
pub struct ApprovalPlan {
    pub order_id: i32,
    pub delivery: NewDelivery,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalOutcome {
    pub order: Order,
    pub delivery: DeliveryRecord,
    /// true jika order sudah pernah di-approve; stok tidak dipotong ulang
    pub already_dispatched: bool,
}

// Satu unit kerja pembatalan
#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub order_id: i32,
    pub expected_status: OrderStatus,
    pub reason: String,
    pub cancelled_by: i32,
}

impl CancellationPlan {
    // Stok dikembalikan hanya jika order sudah melewati approval
    pub fn restores_stock(&self) -> bool {
        self.expected_status.has_reserved_stock()
    }
}

// Request untuk create order (customer)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    /// Opsional; jika diisi harus sama dengan user yang login
    #[schema(example = 12)]
    pub customer_id: Option<i32>,
    #[schema(example = 3)]
    pub shop_id: i32,
    #[validate(nested)]
    pub items: Vec<CartItemRequest>,
    /// ID alamat dari address book customer
    #[schema(example = 5)]
    pub address_id: Option<i32>,
    /// Alamat manual, dipakai jika address_id kosong
    #[validate(nested)]
    pub delivery_address: Option<DeliveryAddressInput>,
    pub payment_method: Option<PaymentMethod>,
    #[validate(length(max = 500, message = "Catatan maksimal 500 karakter"))]
    #[schema(example = "Tolong bel dua kali")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CartItemRequest {
    #[schema(example = 7)]
    pub product_id: i32,
    #[validate(range(min = 1, max = 1000, message = "Quantity harus antara 1 dan 1000"))]
    #[schema(example = 2)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DeliveryAddressInput {
    #[schema(example = "12 MG Road")]
    pub address_line: String,
    #[schema(example = "Bengaluru")]
    pub city: String,
    #[schema(example = "Karnataka")]
    pub state: String,
    #[schema(example = "560001")]
    pub pincode: String,
    #[schema(example = "9876543210")]
    pub phone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

// Request update status order (shopkeeper)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[schema(example = "Sedang dikemas")]
    pub notes: Option<String>,
}

// Request untuk reject order
#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectOrderRequest {
    #[schema(example = "out of stock")]
    pub reason: String,
}

// Request untuk cancel order
#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    #[schema(example = "Berubah pikiran")]
    pub reason: String,
}

// Request approval per item
#[derive(Debug, Deserialize, ToSchema)]
pub struct ItemApprovalRequest {
    pub approval_status: ApprovalStatus,
    #[schema(example = "Produk rusak")]
    pub rejection_reason: Option<String>,
}

// Query parameters untuk order filtering
#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderQueryParams {
    pub status: Option<OrderStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// Request cek stok (customer polling tiap 30 detik)
#[derive(Debug, Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub product_ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductAvailability {
    pub product_id: i32,
    pub name: String,
    pub quantity: i32,
    pub in_stock: bool,
}

// Response detail order beserta item
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: i32,
    pub order: Order,
    pub items: Vec<OrderItem>,
}
