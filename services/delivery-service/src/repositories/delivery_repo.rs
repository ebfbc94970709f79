use async_trait::async_trait;
use shared::{DeliveryStatus, OrderStatus, Page};
use sqlx::PgPool;

use super::DeliveryStore;
use crate::{
    domain::delivery::{Delivery, DeliveryAgent, DeliveryCompletion},
    error::AppResult,
};

// Store delivery berbasis PostgreSQL
#[derive(Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn find_agent(&self, agent_id: i32) -> AppResult<Option<DeliveryAgent>> {
        let agent = sqlx::query_as("SELECT * FROM delivery_agents WHERE id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(agent)
    }

    async fn set_availability(
        &self,
        agent_id: i32,
        is_available: bool,
    ) -> AppResult<Option<DeliveryAgent>> {
        let agent = sqlx::query_as(
            "UPDATE delivery_agents SET is_available = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(agent_id)
        .bind(is_available)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn find_delivery(&self, delivery_id: i32) -> AppResult<Option<Delivery>> {
        let delivery = sqlx::query_as("SELECT * FROM deliveries WHERE id = $1")
            .bind(delivery_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(delivery)
    }

    async fn list_unassigned(&self, page: Page) -> AppResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as(
            "SELECT * FROM deliveries
             WHERE delivery_agent_id IS NULL AND status = $1
             ORDER BY created_at ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(DeliveryStatus::Unassigned)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(deliveries)
    }

    async fn list_by_agent(&self, agent_id: i32, page: Page) -> AppResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as(
            "SELECT * FROM deliveries
             WHERE delivery_agent_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(agent_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(deliveries)
    }

    async fn claim(&self, delivery_id: i32, agent_id: i32) -> AppResult<Option<Delivery>> {
        // Satu statement: hanya satu agent yang lolos guard ini
        let delivery = sqlx::query_as(
            "UPDATE deliveries SET
                delivery_agent_id = $2,
                status = $3,
                assigned_at = NOW(),
                updated_at = NOW()
             WHERE id = $1 AND delivery_agent_id IS NULL AND status = $4
             RETURNING *",
        )
        .bind(delivery_id)
        .bind(agent_id)
        .bind(DeliveryStatus::Assigned)
        .bind(DeliveryStatus::Unassigned)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    async fn advance(
        &self,
        delivery_id: i32,
        agent_id: i32,
        from: DeliveryStatus,
        to: DeliveryStatus,
    ) -> AppResult<Option<Delivery>> {
        let delivery = sqlx::query_as(
            "UPDATE deliveries SET
                status = $4,
                picked_up_at = CASE WHEN $4 = 'picked_up' THEN NOW() ELSE picked_up_at END,
                updated_at = NOW()
             WHERE id = $1 AND delivery_agent_id = $2 AND status = $3
             RETURNING *",
        )
        .bind(delivery_id)
        .bind(agent_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    async fn complete(
        &self,
        delivery_id: i32,
        agent_id: i32,
        photo_url: &str,
    ) -> AppResult<Option<DeliveryCompletion>> {
        let mut tx = self.pool.begin().await?;

        // Urutan lock sama dengan pembatalan order: delivery dulu, lalu order
        let completed: Option<Delivery> = sqlx::query_as(
            "UPDATE deliveries SET
                status = $4,
                delivery_photo_url = $5,
                delivery_photo_uploaded_at = NOW(),
                delivered_at = NOW(),
                updated_at = NOW()
             WHERE id = $1 AND delivery_agent_id = $2 AND status = $3
             RETURNING *",
        )
        .bind(delivery_id)
        .bind(agent_id)
        .bind(DeliveryStatus::InTransit)
        .bind(DeliveryStatus::Delivered)
        .bind(photo_url)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(delivery) = completed else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Edge approved/preparing/ready -> delivered, lihat OrderStatus::can_complete_delivery
        let order: Option<(i32,)> = sqlx::query_as(
            "UPDATE orders SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = ANY($3)
             RETURNING customer_id",
        )
        .bind(delivery.order_id)
        .bind(OrderStatus::Delivered)
        .bind(OrderStatus::delivery_completable())
        .fetch_optional(&mut *tx)
        .await?;

        if order.is_none() {
            tracing::warn!(
                "⚠️  Order {} tidak dalam status aktif, status order tidak diubah saat delivery {} selesai",
                delivery.order_id,
                delivery.id
            );
        }

        sqlx::query(
            "UPDATE delivery_agents SET total_deliveries = total_deliveries + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(agent_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(DeliveryCompletion {
            delivery,
            customer_id: order.map(|(customer_id,)| customer_id),
        }))
    }
}
