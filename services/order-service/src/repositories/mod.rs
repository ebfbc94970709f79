use async_trait::async_trait;
use shared::{ApprovalStatus, OrderStatus, Page};

use crate::{
    domain::{
        catalog::{CustomerAddress, Product, Shop},
        order::{
            ApprovalOutcome, ApprovalPlan, CancellationPlan, DeliveryRecord, NewOrder, Order,
            OrderItem,
        },
    },
    error::AppResult,
};

pub mod order_repo;

#[cfg(test)]
pub mod memory;

pub use order_repo::PgOrderStore;

/// Akses data untuk workflow order. Setiap method yang mengubah lebih dari satu
/// baris bersifat atomik: semua berhasil atau tidak ada yang berubah.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_shop(&self, shop_id: i32) -> AppResult<Option<Shop>>;

    async fn find_products(&self, product_ids: &[i32]) -> AppResult<Vec<Product>>;

    async fn find_address(&self, address_id: i32) -> AppResult<Option<CustomerAddress>>;

    /// Insert order beserta semua item dalam satu transaksi
    async fn insert_order(&self, order: &NewOrder) -> AppResult<(Order, Vec<OrderItem>)>;

    async fn find_order(&self, order_id: i32) -> AppResult<Option<Order>>;

    async fn find_items(&self, order_id: i32) -> AppResult<Vec<OrderItem>>;

    async fn find_item(&self, item_id: i32) -> AppResult<Option<OrderItem>>;

    async fn list_customer_orders(
        &self,
        customer_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>>;

    async fn list_shop_orders(
        &self,
        shop_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>>;

    async fn find_delivery_by_order(&self, order_id: i32) -> AppResult<Option<DeliveryRecord>>;

    /// pending_approval -> approved, potong stok, buat delivery. Satu transaksi.
    /// Order yang sudah punya delivery menghasilkan `already_dispatched = true`.
    async fn approve_and_dispatch(&self, plan: &ApprovalPlan) -> AppResult<ApprovalOutcome>;

    /// pending_approval -> rejected. `None` jika status sudah berubah.
    async fn reject_order(&self, order_id: i32, reason: &str) -> AppResult<Option<Order>>;

    /// Compare-and-set status order. `None` jika status saat ini bukan `from`.
    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>>;

    /// Batalkan order, cancel delivery unassigned, kembalikan stok sebesar
    /// `reserved_quantity` tiap item. Satu transaksi.
    async fn cancel_order(&self, plan: &CancellationPlan) -> AppResult<Order>;

    /// Update approval item selama order belum final (delivered, rejected, cancelled).
    /// Stok tidak disentuh; `None` jika order sudah final.
    async fn set_item_approval(
        &self,
        item_id: i32,
        status: ApprovalStatus,
        rejection_reason: Option<&str>,
    ) -> AppResult<Option<OrderItem>>;

    /// Approve semua item dalam satu statement. `None` jika order sudah final.
    async fn approve_all_items(&self, order_id: i32) -> AppResult<Option<Vec<OrderItem>>>;
}
