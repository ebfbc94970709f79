// Store in-memory untuk unit test workflow delivery. Satu mutex untuk seluruh
// state, jadi klaim dan penyelesaian atomik seperti di PgDeliveryStore.
use async_trait::async_trait;
use chrono::Utc;
use shared::{AgentStatus, DeliveryStatus, OrderStatus, Page};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::DeliveryStore;
use crate::{
    domain::delivery::{Delivery, DeliveryAgent, DeliveryCompletion},
    error::AppResult,
};

// Bagian order yang disentuh delivery-service
#[derive(Debug, Clone, Copy)]
struct OrderRow {
    customer_id: i32,
    status: OrderStatus,
}

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    agents: BTreeMap<i32, DeliveryAgent>,
    orders: BTreeMap<i32, OrderRow>,
    deliveries: BTreeMap<i32, Delivery>,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryDeliveryStore {
    state: Mutex<MemoryState>,
}

impl MemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_agent(&self, agent_id: i32, status: AgentStatus, is_available: bool) -> DeliveryAgent {
        let now = Utc::now();
        let agent = DeliveryAgent {
            id: agent_id,
            name: format!("Agent {}", agent_id),
            email: format!("agent{}@pasar.in", agent_id),
            phone: "9876500000".to_string(),
            vehicle_type: "bike".to_string(),
            status,
            is_available,
            rating: 0.0,
            total_deliveries: 0,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.agents.insert(agent_id, agent.clone());
        agent
    }

    /// Order approved beserta delivery unassigned, seperti hasil dispatch
    pub async fn seed_dispatched_order(&self, customer_id: i32) -> Delivery {
        let mut state = self.state.lock().await;
        let order_id = state.next_id();
        state.orders.insert(
            order_id,
            OrderRow {
                customer_id,
                status: OrderStatus::Approved,
            },
        );

        let id = state.next_id();
        let now = Utc::now();
        let delivery = Delivery {
            id,
            order_id,
            delivery_agent_id: None,
            status: DeliveryStatus::Unassigned,
            pickup_address: "Toko Sayur, Shivaji Nagar, Pune".to_string(),
            pickup_latitude: Some(18.53),
            pickup_longitude: Some(73.85),
            delivery_address: "221B Baker Street, Pune, Maharashtra - 411001".to_string(),
            delivery_latitude: None,
            delivery_longitude: None,
            delivery_phone: "9876543210".to_string(),
            delivery_photo_url: None,
            delivery_photo_uploaded_at: None,
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        state.deliveries.insert(id, delivery.clone());
        delivery
    }

    // Simulasi pembatalan order dari order-service
    pub async fn cancel_order(&self, delivery_id: i32) {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.deliveries.get_mut(&delivery_id) else {
            return;
        };
        delivery.status = DeliveryStatus::Cancelled;
        let order_id = delivery.order_id;
        if let Some(order) = state.orders.get_mut(&order_id) {
            order.status = OrderStatus::Cancelled;
        }
    }

    pub async fn set_order_status(&self, order_id: i32, status: OrderStatus) {
        if let Some(order) = self.state.lock().await.orders.get_mut(&order_id) {
            order.status = status;
        }
    }

    pub async fn order_status(&self, order_id: i32) -> Option<OrderStatus> {
        self.state.lock().await.orders.get(&order_id).map(|o| o.status)
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn find_agent(&self, agent_id: i32) -> AppResult<Option<DeliveryAgent>> {
        Ok(self.state.lock().await.agents.get(&agent_id).cloned())
    }

    async fn set_availability(
        &self,
        agent_id: i32,
        is_available: bool,
    ) -> AppResult<Option<DeliveryAgent>> {
        let mut state = self.state.lock().await;
        Ok(state.agents.get_mut(&agent_id).map(|agent| {
            agent.is_available = is_available;
            agent.updated_at = Utc::now();
            agent.clone()
        }))
    }

    async fn find_delivery(&self, delivery_id: i32) -> AppResult<Option<Delivery>> {
        Ok(self.state.lock().await.deliveries.get(&delivery_id).cloned())
    }

    async fn list_unassigned(&self, page: Page) -> AppResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .values()
            .filter(|d| d.is_claimable())
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn list_by_agent(&self, agent_id: i32, page: Page) -> AppResult<Vec<Delivery>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .values()
            .rev()
            .filter(|d| d.is_assigned_to(agent_id))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn claim(&self, delivery_id: i32, agent_id: i32) -> AppResult<Option<Delivery>> {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.deliveries.get_mut(&delivery_id) else {
            return Ok(None);
        };
        if !delivery.is_claimable() {
            return Ok(None);
        }

        let now = Utc::now();
        delivery.delivery_agent_id = Some(agent_id);
        delivery.status = DeliveryStatus::Assigned;
        delivery.assigned_at = Some(now);
        delivery.updated_at = now;
        Ok(Some(delivery.clone()))
    }

    async fn advance(
        &self,
        delivery_id: i32,
        agent_id: i32,
        from: DeliveryStatus,
        to: DeliveryStatus,
    ) -> AppResult<Option<Delivery>> {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.deliveries.get_mut(&delivery_id) else {
            return Ok(None);
        };
        if !delivery.is_assigned_to(agent_id) || delivery.status != from {
            return Ok(None);
        }

        let now = Utc::now();
        delivery.status = to;
        if to == DeliveryStatus::PickedUp {
            delivery.picked_up_at = Some(now);
        }
        delivery.updated_at = now;
        Ok(Some(delivery.clone()))
    }

    async fn complete(
        &self,
        delivery_id: i32,
        agent_id: i32,
        photo_url: &str,
    ) -> AppResult<Option<DeliveryCompletion>> {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.deliveries.get_mut(&delivery_id) else {
            return Ok(None);
        };
        if !delivery.is_assigned_to(agent_id) || delivery.status != DeliveryStatus::InTransit {
            return Ok(None);
        }

        let now = Utc::now();
        delivery.status = DeliveryStatus::Delivered;
        delivery.delivery_photo_url = Some(photo_url.to_string());
        delivery.delivery_photo_uploaded_at = Some(now);
        delivery.delivered_at = Some(now);
        delivery.updated_at = now;
        let delivery = delivery.clone();

        let customer_id = match state.orders.get_mut(&delivery.order_id) {
            Some(order) if order.status.can_complete_delivery() => {
                order.status = OrderStatus::Delivered;
                Some(order.customer_id)
            }
            _ => None,
        };

        if let Some(agent) = state.agents.get_mut(&agent_id) {
            agent.total_deliveries += 1;
        }

        Ok(Some(DeliveryCompletion {
            delivery,
            customer_id,
        }))
    }
}
