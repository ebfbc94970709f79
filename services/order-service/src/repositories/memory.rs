// Store in-memory untuk unit test workflow. Satu mutex untuk seluruh state,
// jadi setiap method atomik seperti transaksi di PgOrderStore.
use async_trait::async_trait;
use chrono::Utc;
use shared::{ApprovalStatus, DeliveryStatus, OrderStatus, Page, ShopStatus};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::OrderStore;
use crate::{
    domain::{
        catalog::{CustomerAddress, Product, Shop},
        order::{
            ApprovalOutcome, ApprovalPlan, CancellationPlan, DeliveryRecord, NewOrder, Order,
            OrderItem, StockLine,
        },
    },
    error::{AppError, AppResult},
};

#[derive(Default)]
struct MemoryState {
    next_id: i32,
    shops: BTreeMap<i32, Shop>,
    products: BTreeMap<i32, Product>,
    addresses: BTreeMap<i32, CustomerAddress>,
    orders: BTreeMap<i32, Order>,
    items: BTreeMap<i32, OrderItem>,
    deliveries: BTreeMap<i32, DeliveryRecord>,
    transient_failures: u32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn items_of(&self, order_id: i32) -> Vec<OrderItem> {
        self.items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect()
    }

    fn delivery_of(&self, order_id: i32) -> Option<DeliveryRecord> {
        self.deliveries
            .values()
            .find(|d| d.order_id == order_id)
            .cloned()
    }

    fn page(orders: Vec<Order>, page: Page) -> Vec<Order> {
        orders
            .into_iter()
            .rev()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<MemoryState>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_shop(&self, owner_id: i32, status: ShopStatus, coords: Option<(f64, f64)>) -> Shop {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let shop = Shop {
            id,
            owner_id,
            name: format!("Toko {}", id),
            address: format!("{} Market Street, Pune, Maharashtra - 411001", id),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.shops.insert(id, shop.clone());
        shop
    }

    pub async fn seed_product(&self, shop_id: i32, name: &str, price: f64, quantity: i32) -> Product {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let product = Product {
            id,
            shop_id,
            name: name.to_string(),
            price,
            quantity,
            category: Some("sayur".to_string()),
            expiry_date: None,
            mfg_date: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state.products.insert(id, product.clone());
        product
    }

    pub async fn seed_address(&self, customer_id: i32) -> CustomerAddress {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let address = CustomerAddress {
            id,
            customer_id,
            address_line: "12 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560001".to_string(),
            phone: "9876543210".to_string(),
            latitude: Some(12.97),
            longitude: Some(77.59),
            created_at: Utc::now(),
        };
        state.addresses.insert(id, address.clone());
        address
    }

    pub async fn set_product_expiry(&self, product_id: i32, expiry: chrono::NaiveDate) {
        let mut state = self.state.lock().await;
        if let Some(product) = state.products.get_mut(&product_id) {
            product.expiry_date = Some(expiry);
        }
    }

    pub async fn product_quantity(&self, product_id: i32) -> i32 {
        let state = self.state.lock().await;
        state.products.get(&product_id).map(|p| p.quantity).unwrap_or(-1)
    }

    pub async fn delivery_count(&self, order_id: i32) -> usize {
        let state = self.state.lock().await;
        state.deliveries.values().filter(|d| d.order_id == order_id).count()
    }

    // Simulasi delivery-service: agent mengambil delivery
    pub async fn assign_delivery(&self, order_id: i32, agent_id: i32) {
        let mut state = self.state.lock().await;
        if let Some(delivery) = state.deliveries.values_mut().find(|d| d.order_id == order_id) {
            delivery.delivery_agent_id = Some(agent_id);
            delivery.status = DeliveryStatus::Assigned;
        }
    }

    // N approval berikutnya gagal dengan error transient
    pub async fn fail_next_approvals(&self, count: u32) {
        self.state.lock().await.transient_failures = count;
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_shop(&self, shop_id: i32) -> AppResult<Option<Shop>> {
        Ok(self.state.lock().await.shops.get(&shop_id).cloned())
    }

    async fn find_products(&self, product_ids: &[i32]) -> AppResult<Vec<Product>> {
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .filter(|p| product_ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn find_address(&self, address_id: i32) -> AppResult<Option<CustomerAddress>> {
        Ok(self.state.lock().await.addresses.get(&address_id).cloned())
    }

    async fn insert_order(&self, new_order: &NewOrder) -> AppResult<(Order, Vec<OrderItem>)> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = state.next_id();

        let order = Order {
            id,
            customer_id: new_order.customer_id,
            shop_id: new_order.shop_id,
            subtotal: new_order.subtotal,
            delivery_fee: new_order.delivery_fee,
            total_amount: new_order.total_amount(),
            delivery_address: new_order.delivery_address.clone(),
            delivery_latitude: new_order.delivery_latitude,
            delivery_longitude: new_order.delivery_longitude,
            delivery_phone: new_order.delivery_phone.clone(),
            payment_method: new_order.payment_method,
            payment_status: "pending".to_string(),
            notes: new_order.notes.clone(),
            status: OrderStatus::PendingApproval,
            request_type: "order_request".to_string(),
            rejection_reason: None,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, order.clone());

        let mut items = Vec::new();
        for line in &new_order.lines {
            let item_id = state.next_id();
            let item = OrderItem {
                id: item_id,
                order_id: id,
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                price: line.price,
                approval_status: ApprovalStatus::Pending,
                rejection_reason: None,
                reserved_quantity: 0,
                created_at: now,
                updated_at: now,
            };
            state.items.insert(item_id, item.clone());
            items.push(item);
        }

        Ok((order, items))
    }

    async fn find_order(&self, order_id: i32) -> AppResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn find_items(&self, order_id: i32) -> AppResult<Vec<OrderItem>> {
        Ok(self.state.lock().await.items_of(order_id))
    }

    async fn find_item(&self, item_id: i32) -> AppResult<Option<OrderItem>> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn list_customer_orders(
        &self,
        customer_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>> {
        let state = self.state.lock().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .filter(|o| status.map(|s| o.status == s).unwrap_or(true))
            .cloned()
            .collect();
        Ok(MemoryState::page(orders, page))
    }

    async fn list_shop_orders(
        &self,
        shop_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>> {
        let state = self.state.lock().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.shop_id == shop_id)
            .filter(|o| status.map(|s| o.status == s).unwrap_or(true))
            .cloned()
            .collect();
        Ok(MemoryState::page(orders, page))
    }

    async fn find_delivery_by_order(&self, order_id: i32) -> AppResult<Option<DeliveryRecord>> {
        Ok(self.state.lock().await.delivery_of(order_id))
    }

    async fn approve_and_dispatch(&self, plan: &ApprovalPlan) -> AppResult<ApprovalOutcome> {
        let mut state = self.state.lock().await;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(AppError::unavailable("Database sedang tidak tersedia"));
        }

        let order = state
            .orders
            .get(&plan.order_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Order tidak ditemukan"))?;

        if order.status != OrderStatus::PendingApproval {
            let delivery = match order.status {
                OrderStatus::Rejected | OrderStatus::Cancelled => None,
                _ => state.delivery_of(plan.order_id),
            };
            return match delivery {
                Some(delivery) => Ok(ApprovalOutcome {
                    order,
                    delivery,
                    already_dispatched: true,
                }),
                None => Err(AppError::conflict(format!(
                    "Order tidak bisa di-approve dari status {}",
                    order.status
                ))),
            };
        }

        let stock = StockLine::from_items(&state.items_of(plan.order_id));
        if stock.is_empty() {
            return Err(AppError::validation(
                "Semua item ditolak, order tidak bisa di-approve",
            ));
        }

        // Cek semua baris dulu, baru diterapkan: setara rollback
        for line in &stock {
            let available = state
                .products
                .get(&line.product_id)
                .map(|p| p.quantity)
                .unwrap_or(0);
            if available < line.quantity {
                return Err(AppError::conflict(format!(
                    "Stok tidak cukup untuk produk {}",
                    line.product_name
                )));
            }
        }
        for line in &stock {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.quantity -= line.quantity;
            }
        }

        let now = Utc::now();
        for item in state
            .items
            .values_mut()
            .filter(|i| i.order_id == plan.order_id && i.approval_status != ApprovalStatus::Rejected)
        {
            item.reserved_quantity = item.quantity;
            item.updated_at = now;
        }

        let order = {
            let stored = state
                .orders
                .get_mut(&plan.order_id)
                .ok_or_else(|| AppError::not_found("Order tidak ditemukan"))?;
            stored.status = OrderStatus::Approved;
            stored.updated_at = now;
            stored.clone()
        };

        let delivery = match state.delivery_of(plan.order_id) {
            Some(existing) => existing,
            None => {
                let id = state.next_id();
                let d = &plan.delivery;
                let delivery = DeliveryRecord {
                    id,
                    order_id: plan.order_id,
                    delivery_agent_id: None,
                    status: DeliveryStatus::Unassigned,
                    pickup_address: d.pickup_address.clone(),
                    pickup_latitude: d.pickup_latitude,
                    pickup_longitude: d.pickup_longitude,
                    delivery_address: d.delivery_address.clone(),
                    delivery_latitude: d.delivery_latitude,
                    delivery_longitude: d.delivery_longitude,
                    delivery_phone: d.delivery_phone.clone(),
                    created_at: now,
                };
                state.deliveries.insert(id, delivery.clone());
                delivery
            }
        };

        Ok(ApprovalOutcome {
            order,
            delivery,
            already_dispatched: false,
        })
    }

    async fn reject_order(&self, order_id: i32, reason: &str) -> AppResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state
            .orders
            .get_mut(&order_id)
            .filter(|o| o.status == OrderStatus::PendingApproval)
            .map(|o| {
                o.status = OrderStatus::Rejected;
                o.rejection_reason = Some(reason.to_string());
                o.updated_at = Utc::now();
                o.clone()
            }))
    }

    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let mut state = self.state.lock().await;
        Ok(state
            .orders
            .get_mut(&order_id)
            .filter(|o| o.status == from)
            .map(|o| {
                o.status = to;
                o.updated_at = Utc::now();
                o.clone()
            }))
    }

    async fn cancel_order(&self, plan: &CancellationPlan) -> AppResult<Order> {
        let mut state = self.state.lock().await;

        let delivery = state.delivery_of(plan.order_id);
        if let Some(delivery) = &delivery {
            if delivery.delivery_agent_id.is_some() || delivery.status != DeliveryStatus::Unassigned
            {
                return Err(AppError::conflict(
                    "Delivery sudah diambil agent, order tidak bisa dibatalkan",
                ));
            }
        }

        let current = state.orders.get(&plan.order_id).map(|o| o.status);
        if current != Some(plan.expected_status) {
            return Err(AppError::conflict(
                "Status order sudah berubah, silakan muat ulang",
            ));
        }

        if let Some(delivery) = delivery {
            if let Some(stored) = state.deliveries.get_mut(&delivery.id) {
                stored.status = DeliveryStatus::Cancelled;
            }
        }

        for line in StockLine::reserved(&state.items_of(plan.order_id)) {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.quantity += line.quantity;
            }
        }

        let now = Utc::now();
        for item in state.items.values_mut().filter(|i| i.order_id == plan.order_id) {
            item.reserved_quantity = 0;
        }

        let order = state
            .orders
            .get_mut(&plan.order_id)
            .ok_or_else(|| AppError::not_found("Order tidak ditemukan"))?;
        order.status = OrderStatus::Cancelled;
        order.cancellation_reason = Some(plan.reason.clone());
        order.cancelled_at = Some(now);
        order.cancelled_by = Some(plan.cancelled_by);
        order.updated_at = now;

        Ok(order.clone())
    }

    async fn set_item_approval(
        &self,
        item_id: i32,
        status: ApprovalStatus,
        rejection_reason: Option<&str>,
    ) -> AppResult<Option<OrderItem>> {
        let mut state = self.state.lock().await;

        let order_id = state
            .items
            .get(&item_id)
            .map(|i| i.order_id)
            .ok_or_else(|| AppError::not_found("Item order tidak ditemukan"))?;

        let open = state
            .orders
            .get(&order_id)
            .is_some_and(|o| !o.status.is_terminal());
        if !open {
            return Ok(None);
        }

        Ok(state.items.get_mut(&item_id).map(|item| {
            item.approval_status = status;
            item.rejection_reason = match status {
                ApprovalStatus::Rejected => rejection_reason.map(str::to_string),
                _ => None,
            };
            item.updated_at = Utc::now();
            item.clone()
        }))
    }

    async fn approve_all_items(&self, order_id: i32) -> AppResult<Option<Vec<OrderItem>>> {
        let mut state = self.state.lock().await;

        let open = state
            .orders
            .get(&order_id)
            .is_some_and(|o| !o.status.is_terminal());
        if !open {
            return Ok(None);
        }

        let now = Utc::now();
        let items = state
            .items
            .values_mut()
            .filter(|i| i.order_id == order_id)
            .map(|item| {
                item.approval_status = ApprovalStatus::Approved;
                item.rejection_reason = None;
                item.updated_at = now;
                item.clone()
            })
            .collect();

        Ok(Some(items))
    }
}
