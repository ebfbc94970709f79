use async_trait::async_trait;
use shared::{DeliveryStatus, Page};

use crate::{
    domain::delivery::{Delivery, DeliveryAgent, DeliveryCompletion},
    error::AppResult,
};

pub mod delivery_repo;

#[cfg(test)]
pub mod memory;

pub use delivery_repo::PgDeliveryStore;

/// Akses data lifecycle delivery. Klaim dan transisi status berupa
/// compare-and-set, jadi dua agent tidak pernah memegang delivery yang sama.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn find_agent(&self, agent_id: i32) -> AppResult<Option<DeliveryAgent>>;

    async fn set_availability(
        &self,
        agent_id: i32,
        is_available: bool,
    ) -> AppResult<Option<DeliveryAgent>>;

    async fn find_delivery(&self, delivery_id: i32) -> AppResult<Option<Delivery>>;

    /// Delivery yang belum diambil agent, yang paling lama di depan
    async fn list_unassigned(&self, page: Page) -> AppResult<Vec<Delivery>>;

    async fn list_by_agent(&self, agent_id: i32, page: Page) -> AppResult<Vec<Delivery>>;

    /// unassigned -> assigned untuk agent ini. `None` jika sudah diambil atau dibatalkan.
    async fn claim(&self, delivery_id: i32, agent_id: i32) -> AppResult<Option<Delivery>>;

    /// Transisi `from -> to` milik agent ini. `None` jika status saat ini bukan `from`.
    async fn advance(
        &self,
        delivery_id: i32,
        agent_id: i32,
        from: DeliveryStatus,
        to: DeliveryStatus,
    ) -> AppResult<Option<Delivery>>;

    /// in_transit -> delivered, order ikut delivered, total_deliveries agent bertambah.
    /// Satu transaksi. `None` jika delivery tidak sedang in_transit untuk agent ini.
    async fn complete(
        &self,
        delivery_id: i32,
        agent_id: i32,
        photo_url: &str,
    ) -> AppResult<Option<DeliveryCompletion>>;
}
