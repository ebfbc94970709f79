// Business logic workflow order: intake, review shopkeeper, approval + dispatch, cancel.
// Principal selalu di-pass eksplisit dari handler.
use chrono::Utc;
use shared::{
    utils::{
        notifier::{publish, EventNotifier, WorkflowEvent},
        retry::{retry_transient, RetryPolicy},
        validation,
    },
    ApprovalStatus, OrderStatus, Page, Principal,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    domain::{
        catalog::{format_address, Shop},
        order::{
            ApprovalOutcome, ApprovalPlan, AvailabilityRequest, CancellationPlan,
            CreateOrderRequest, CreateOrderResponse, DeliveryAddressInput, ItemApprovalRequest,
            NewDelivery, NewOrder, NewOrderLine, Order, OrderDetailResponse, OrderItem,
            OrderQueryParams, ProductAvailability, UpdateOrderStatusRequest,
        },
    },
    error::{AppError, AppResult},
    geocoding::{self, AddressResolver},
    repositories::OrderStore,
};

const MAX_AVAILABILITY_PRODUCTS: usize = 100;

// Alamat pengiriman yang sudah dinormalisasi
struct ResolvedAddress {
    text: String,
    phone: String,
    coordinates: Option<(f64, f64)>,
}

pub struct OrderWorkflow {
    store: Arc<dyn OrderStore>,
    resolver: Arc<dyn AddressResolver>,
    notifier: Arc<dyn EventNotifier>,
    delivery_fee: f64,
    retry: RetryPolicy,
}

impl OrderWorkflow {
    pub fn new(
        store: Arc<dyn OrderStore>,
        resolver: Arc<dyn AddressResolver>,
        notifier: Arc<dyn EventNotifier>,
        delivery_fee: f64,
    ) -> Self {
        Self {
            store,
            resolver,
            notifier,
            delivery_fee,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ===== Order Intake =====

    pub async fn create_order(
        &self,
        principal: Principal,
        payload: CreateOrderRequest,
    ) -> AppResult<CreateOrderResponse> {
        if !principal.is_customer() {
            return Err(AppError::forbidden("Hanya customer yang bisa membuat order"));
        }
        if let Some(customer_id) = payload.customer_id {
            if customer_id != principal.id {
                return Err(AppError::forbidden(
                    "Tidak bisa membuat order untuk customer lain",
                ));
            }
        }

        payload.validate()?;

        if payload.items.is_empty() {
            return Err(AppError::validation("Keranjang kosong"));
        }
        let payment_method = payload
            .payment_method
            .ok_or_else(|| AppError::validation("Metode pembayaran wajib dipilih"))?;

        let address = self.resolve_delivery_address(principal, &payload).await?;

        let shop = self
            .store
            .find_shop(payload.shop_id)
            .await?
            .ok_or_else(|| AppError::not_found("Toko tidak ditemukan"))?;
        if !shop.accepts_orders() {
            return Err(AppError::conflict("Toko sedang tidak menerima order"));
        }

        let lines = self.price_cart(&shop, &payload).await?;
        let subtotal = lines.iter().map(|l| l.price * l.quantity as f64).sum();

        let new_order = NewOrder {
            customer_id: principal.id,
            shop_id: shop.id,
            subtotal,
            delivery_fee: self.delivery_fee,
            delivery_address: address.text,
            delivery_latitude: address.coordinates.map(|c| c.0),
            delivery_longitude: address.coordinates.map(|c| c.1),
            delivery_phone: address.phone,
            payment_method,
            notes: payload
                .notes
                .as_deref()
                .filter(|n| !validation::is_blank(n))
                .map(validation::sanitize_html),
            lines,
        };

        let (order, items) = self.store.insert_order(&new_order).await?;

        tracing::info!(
            "🛒 Order {} dibuat oleh customer {} untuk toko {} ({} item)",
            order.id,
            principal.id,
            shop.id,
            items.len()
        );

        publish(
            self.notifier.as_ref(),
            WorkflowEvent::OrderCreated {
                order_id: order.id,
                shop_id: order.shop_id,
                customer_id: order.customer_id,
            },
        )
        .await;

        Ok(CreateOrderResponse {
            order_id: order.id,
            order,
            items,
        })
    }

    async fn resolve_delivery_address(
        &self,
        principal: Principal,
        payload: &CreateOrderRequest,
    ) -> AppResult<ResolvedAddress> {
        if let Some(address_id) = payload.address_id {
            let saved = self
                .store
                .find_address(address_id)
                .await?
                .filter(|a| a.customer_id == principal.id)
                .ok_or_else(|| AppError::not_found("Alamat tidak ditemukan"))?;

            return Ok(ResolvedAddress {
                text: format_address(&saved.address_line, &saved.city, &saved.state, &saved.pincode),
                phone: saved.phone,
                coordinates: saved.latitude.zip(saved.longitude),
            });
        }

        let manual = payload
            .delivery_address
            .as_ref()
            .ok_or_else(|| AppError::validation("Alamat pengiriman wajib diisi"))?;
        validate_manual_address(manual)?;

        Ok(ResolvedAddress {
            text: format_address(&manual.address_line, &manual.city, &manual.state, &manual.pincode),
            phone: manual.phone.trim().to_string(),
            coordinates: manual.latitude.zip(manual.longitude),
        })
    }

    // Snapshot nama dan harga. Stok baru dicek dan dipotong saat approval.
    async fn price_cart(
        &self,
        shop: &Shop,
        payload: &CreateOrderRequest,
    ) -> AppResult<Vec<NewOrderLine>> {
        let mut merged: Vec<(i32, i32)> = Vec::new();
        for item in &payload.items {
            match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
                Some((_, qty)) => *qty += item.quantity,
                None => merged.push((item.product_id, item.quantity)),
            }
        }

        let ids: Vec<i32> = merged.iter().map(|(id, _)| *id).collect();
        let products = self.store.find_products(&ids).await?;
        let today = Utc::now().date_naive();

        merged
            .into_iter()
            .map(|(product_id, quantity)| {
                let product = products
                    .iter()
                    .find(|p| p.id == product_id && p.shop_id == shop.id)
                    .ok_or_else(|| {
                        AppError::validation(format!(
                            "Produk {} tidak ditemukan di toko ini",
                            product_id
                        ))
                    })?;

                if product.is_expired(today) {
                    return Err(AppError::validation(format!(
                        "Produk {} sudah kedaluwarsa",
                        product.name
                    )));
                }
                Ok(NewOrderLine {
                    product_id,
                    product_name: product.name.clone(),
                    quantity,
                    price: product.price,
                })
            })
            .collect()
    }

    // ===== Reads =====

    pub async fn get_order(&self, principal: Principal, order_id: i32) -> AppResult<OrderDetailResponse> {
        let order = self.load_order(order_id).await?;

        if !self.can_view(principal, &order).await? {
            return Err(AppError::forbidden("Anda tidak punya akses ke order ini"));
        }

        let items = self.store.find_items(order_id).await?;
        Ok(OrderDetailResponse { order, items })
    }

    pub async fn list_my_orders(
        &self,
        principal: Principal,
        params: OrderQueryParams,
    ) -> AppResult<Vec<Order>> {
        if !principal.is_customer() {
            return Err(AppError::forbidden("Hanya customer yang punya daftar order"));
        }

        self.store
            .list_customer_orders(principal.id, params.status, Page::new(params.page, params.limit))
            .await
    }

    pub async fn list_shop_orders(
        &self,
        principal: Principal,
        shop_id: i32,
        params: OrderQueryParams,
    ) -> AppResult<Vec<Order>> {
        let shop = self.load_shop(shop_id).await?;
        ensure_shop_owner(principal, &shop)?;

        self.store
            .list_shop_orders(shop_id, params.status, Page::new(params.page, params.limit))
            .await
    }

    pub async fn product_availability(
        &self,
        payload: AvailabilityRequest,
    ) -> AppResult<Vec<ProductAvailability>> {
        if payload.product_ids.is_empty() {
            return Err(AppError::validation("product_ids tidak boleh kosong"));
        }
        if payload.product_ids.len() > MAX_AVAILABILITY_PRODUCTS {
            return Err(AppError::bad_request(format!(
                "Maksimal {} produk per request",
                MAX_AVAILABILITY_PRODUCTS
            )));
        }

        let products = self.store.find_products(&payload.product_ids).await?;
        Ok(products
            .into_iter()
            .map(|p| ProductAvailability {
                product_id: p.id,
                in_stock: p.quantity > 0,
                quantity: p.quantity,
                name: p.name,
            })
            .collect())
    }

    // ===== Shopkeeper Review =====

    /// Approve order: potong stok dan buat delivery dalam satu transaksi.
    /// Idempotent: approve ulang mengembalikan delivery yang sama.
    pub async fn approve_order(&self, principal: Principal, order_id: i32) -> AppResult<ApprovalOutcome> {
        let order = self.load_order(order_id).await?;
        let shop = self.load_shop(order.shop_id).await?;
        ensure_shop_owner(principal, &shop)?;

        if order.status == OrderStatus::PendingApproval {
            let items = self.store.find_items(order_id).await?;
            if !items.is_empty()
                && items
                    .iter()
                    .all(|i| i.approval_status == ApprovalStatus::Rejected)
            {
                return Err(AppError::validation(
                    "Semua item ditolak, order tidak bisa di-approve",
                ));
            }
        }

        // Koordinat diambil di luar transaksi, gagal pun tetap lanjut
        let pickup = geocoding::locate(self.resolver.as_ref(), shop.coordinates(), &shop.address).await;
        let dropoff = geocoding::locate(
            self.resolver.as_ref(),
            order.coordinates(),
            &order.delivery_address,
        )
        .await;

        let plan = ApprovalPlan {
            order_id,
            delivery: NewDelivery {
                pickup_address: shop.address.clone(),
                pickup_latitude: pickup.map(|c| c.0),
                pickup_longitude: pickup.map(|c| c.1),
                delivery_address: order.delivery_address.clone(),
                delivery_latitude: dropoff.map(|c| c.0),
                delivery_longitude: dropoff.map(|c| c.1),
                delivery_phone: order.delivery_phone.clone(),
            },
        };

        let outcome = retry_transient("approve order", self.retry, AppError::is_transient, || {
            self.store.approve_and_dispatch(&plan)
        })
        .await?;

        if outcome.already_dispatched {
            tracing::info!(
                "🔁 Order {} sudah di-approve sebelumnya, delivery {} dikembalikan",
                order_id,
                outcome.delivery.id
            );
            return Ok(outcome);
        }

        tracing::info!(
            "✅ Order {} di-approve oleh {}, delivery {} dibuat",
            order_id,
            principal.id,
            outcome.delivery.id
        );

        publish(
            self.notifier.as_ref(),
            WorkflowEvent::OrderStatusChanged {
                order_id,
                customer_id: outcome.order.customer_id,
                status: OrderStatus::Approved,
            },
        )
        .await;
        publish(
            self.notifier.as_ref(),
            WorkflowEvent::DeliveryDispatched {
                delivery_id: outcome.delivery.id,
                order_id,
            },
        )
        .await;

        Ok(outcome)
    }

    pub async fn reject_order(&self, principal: Principal, order_id: i32, reason: &str) -> AppResult<Order> {
        if validation::is_blank(reason) {
            return Err(AppError::validation("Alasan penolakan wajib diisi"));
        }

        let order = self.load_order(order_id).await?;
        let shop = self.load_shop(order.shop_id).await?;
        ensure_shop_owner(principal, &shop)?;

        let rejected = self
            .store
            .reject_order(order_id, reason.trim())
            .await?
            .ok_or_else(|| {
                AppError::conflict(format!(
                    "Order tidak bisa ditolak dari status {}",
                    order.status
                ))
            })?;

        tracing::info!("❌ Order {} ditolak: {}", order_id, reason.trim());

        self.publish_status(&rejected).await;
        Ok(rejected)
    }

    /// Update status dari dashboard shopkeeper. approved/rejected/cancelled
    /// diteruskan ke operasi khususnya.
    pub async fn update_status(
        &self,
        principal: Principal,
        order_id: i32,
        payload: UpdateOrderStatusRequest,
    ) -> AppResult<Order> {
        let notes = payload.notes.as_deref().unwrap_or_default();

        match payload.status {
            OrderStatus::Approved => Ok(self.approve_order(principal, order_id).await?.order),
            OrderStatus::Rejected => self.reject_order(principal, order_id, notes).await,
            OrderStatus::Cancelled => self.cancel_order(principal, order_id, notes).await,
            OrderStatus::PendingApproval => Err(AppError::validation(
                "Status pending_approval tidak bisa di-set manual",
            )),
            next => {
                let order = self.load_order(order_id).await?;
                let shop = self.load_shop(order.shop_id).await?;
                ensure_shop_owner(principal, &shop)?;

                // delivered normalnya di-set delivery-service, manual hanya admin
                if next == OrderStatus::Delivered && !principal.is_admin() {
                    return Err(AppError::forbidden(
                        "Status delivered di-set otomatis saat delivery selesai",
                    ));
                }

                if !order.status.can_transition_to(next) {
                    return Err(AppError::conflict(format!(
                        "Transisi status {} -> {} tidak valid",
                        order.status, next
                    )));
                }

                let updated = self
                    .store
                    .transition_status(order_id, order.status, next)
                    .await?
                    .ok_or_else(|| AppError::conflict("Status order sudah berubah, silakan muat ulang"))?;

                tracing::info!("📋 Order {}: {} -> {}", order_id, order.status, next);

                self.publish_status(&updated).await;
                Ok(updated)
            }
        }
    }

    /// Cancel order selama delivery belum diambil agent
    pub async fn cancel_order(&self, principal: Principal, order_id: i32, reason: &str) -> AppResult<Order> {
        if validation::is_blank(reason) {
            return Err(AppError::validation("Alasan pembatalan wajib diisi"));
        }

        let order = self.load_order(order_id).await?;
        let is_customer_owner = principal.is_customer() && order.customer_id == principal.id;
        if !is_customer_owner {
            let shop = self.load_shop(order.shop_id).await?;
            ensure_shop_owner(principal, &shop)?;
        }

        if !order.status.is_cancellable() {
            return Err(AppError::conflict(format!(
                "Order dengan status {} tidak bisa dibatalkan",
                order.status
            )));
        }

        let plan = CancellationPlan {
            order_id,
            expected_status: order.status,
            reason: reason.trim().to_string(),
            cancelled_by: principal.id,
        };

        let cancelled = retry_transient("cancel order", self.retry, AppError::is_transient, || {
            self.store.cancel_order(&plan)
        })
        .await?;

        tracing::info!(
            "🚫 Order {} dibatalkan oleh {} (dari status {}, restock: {})",
            order_id,
            principal.id,
            plan.expected_status,
            plan.restores_stock()
        );

        self.publish_status(&cancelled).await;
        Ok(cancelled)
    }

    pub async fn set_item_approval(
        &self,
        principal: Principal,
        item_id: i32,
        payload: ItemApprovalRequest,
    ) -> AppResult<OrderItem> {
        let reason = match payload.approval_status {
            ApprovalStatus::Pending => {
                return Err(AppError::validation(
                    "approval_status harus approved atau rejected",
                ))
            }
            ApprovalStatus::Rejected => {
                let reason = payload
                    .rejection_reason
                    .as_deref()
                    .filter(|r| !validation::is_blank(r))
                    .ok_or_else(|| AppError::validation("Alasan penolakan item wajib diisi"))?;
                Some(reason.trim())
            }
            ApprovalStatus::Approved => None,
        };

        let item = self
            .store
            .find_item(item_id)
            .await?
            .ok_or_else(|| AppError::not_found("Item order tidak ditemukan"))?;
        let order = self.load_order(item.order_id).await?;
        let shop = self.load_shop(order.shop_id).await?;
        ensure_shop_owner(principal, &shop)?;

        if order.status.is_terminal() {
            return Err(item_locked(order.status));
        }

        let updated = self
            .store
            .set_item_approval(item_id, payload.approval_status, reason)
            .await?
            .ok_or_else(|| AppError::conflict("Order sudah final, item tidak bisa diubah"))?;

        tracing::info!(
            "📝 Item {} order {} -> {}",
            item_id,
            order.id,
            updated.approval_status
        );

        Ok(updated)
    }

    pub async fn approve_all_items(&self, principal: Principal, order_id: i32) -> AppResult<Vec<OrderItem>> {
        let order = self.load_order(order_id).await?;
        let shop = self.load_shop(order.shop_id).await?;
        ensure_shop_owner(principal, &shop)?;

        if order.status.is_terminal() {
            return Err(item_locked(order.status));
        }

        self.store
            .approve_all_items(order_id)
            .await?
            .ok_or_else(|| AppError::conflict("Order sudah final, item tidak bisa diubah"))
    }

    // ===== Helpers =====

    async fn load_order(&self, order_id: i32) -> AppResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order tidak ditemukan"))
    }

    async fn load_shop(&self, shop_id: i32) -> AppResult<Shop> {
        self.store
            .find_shop(shop_id)
            .await?
            .ok_or_else(|| AppError::not_found("Toko tidak ditemukan"))
    }

    // Customer pemilik, pemilik toko, agent yang di-assign, atau admin
    async fn can_view(&self, principal: Principal, order: &Order) -> AppResult<bool> {
        if principal.is_admin() {
            return Ok(true);
        }
        if principal.is_customer() {
            return Ok(order.customer_id == principal.id);
        }
        if principal.can_own_shop() {
            let shop = self.load_shop(order.shop_id).await?;
            return Ok(shop.owner_id == principal.id);
        }
        if principal.is_delivery_agent() {
            let delivery = self.store.find_delivery_by_order(order.id).await?;
            return Ok(delivery.and_then(|d| d.delivery_agent_id) == Some(principal.id));
        }
        Ok(false)
    }

    async fn publish_status(&self, order: &Order) {
        publish(
            self.notifier.as_ref(),
            WorkflowEvent::OrderStatusChanged {
                order_id: order.id,
                customer_id: order.customer_id,
                status: order.status,
            },
        )
        .await;
    }
}

// Order final: delivered, rejected, cancelled
fn item_locked(status: OrderStatus) -> AppError {
    AppError::conflict(format!("Order sudah {}, item tidak bisa diubah", status))
}

fn ensure_shop_owner(principal: Principal, shop: &Shop) -> AppResult<()> {
    if principal.is_admin() || (principal.can_own_shop() && shop.owner_id == principal.id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Anda bukan pemilik toko ini"))
    }
}

fn validate_manual_address(address: &DeliveryAddressInput) -> AppResult<()> {
    let required = [
        ("address_line", &address.address_line),
        ("city", &address.city),
        ("state", &address.state),
        ("pincode", &address.pincode),
        ("phone", &address.phone),
    ];
    for (field, value) in required {
        if validation::is_blank(value) {
            return Err(AppError::validation(format!("Field {} wajib diisi", field)));
        }
    }

    if !validation::is_valid_pincode(&address.pincode) {
        return Err(AppError::validation("Pincode harus 6 digit"));
    }
    if !validation::is_valid_phone(&address.phone) {
        return Err(AppError::validation("Nomor telepon tidak valid"));
    }

    match (address.latitude, address.longitude) {
        (Some(lat), Some(lng)) if !validation::is_valid_coordinate(lat, lng) => {
            Err(AppError::validation("Koordinat tidak valid"))
        }
        (Some(_), None) | (None, Some(_)) => Err(AppError::validation(
            "Latitude dan longitude harus diisi bersamaan",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::order::{CartItemRequest, DeliveryAddressInput},
        geocoding::{GeoPoint, MockAddressResolver, NoopAddressResolver},
        repositories::memory::MemoryOrderStore,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use shared::{
        utils::notifier::{LogNotifier, NotifyError},
        PaymentMethod, Role, ShopStatus,
    };

    mock! {
        Notifier {}

        #[async_trait]
        impl EventNotifier for Notifier {
            async fn notify(&self, event: WorkflowEvent) -> Result<(), NotifyError>;
        }
    }

    const CUSTOMER: i32 = 100;
    const OWNER: i32 = 200;

    fn customer() -> Principal {
        Principal::new(CUSTOMER, Role::Customer)
    }

    fn owner() -> Principal {
        Principal::new(OWNER, Role::Shopkeeper)
    }

    fn workflow_with(
        store: Arc<MemoryOrderStore>,
        resolver: Arc<dyn AddressResolver>,
        notifier: Arc<dyn EventNotifier>,
    ) -> OrderWorkflow {
        OrderWorkflow::new(store, resolver, notifier, 30.0).with_retry(RetryPolicy::no_delay(3))
    }

    fn workflow(store: Arc<MemoryOrderStore>) -> OrderWorkflow {
        workflow_with(store, Arc::new(NoopAddressResolver), Arc::new(LogNotifier))
    }

    fn manual_address() -> DeliveryAddressInput {
        DeliveryAddressInput {
            address_line: "221B Baker Street".to_string(),
            city: "Pune".to_string(),
            state: "Maharashtra".to_string(),
            pincode: "411001".to_string(),
            phone: "9876543210".to_string(),
            latitude: None,
            longitude: None,
        }
    }

    fn cart(shop_id: i32, items: &[(i32, i32)]) -> CreateOrderRequest {
        CreateOrderRequest {
            customer_id: None,
            shop_id,
            items: items
                .iter()
                .map(|&(product_id, quantity)| CartItemRequest {
                    product_id,
                    quantity,
                })
                .collect(),
            address_id: None,
            delivery_address: Some(manual_address()),
            payment_method: Some(PaymentMethod::CashOnDelivery),
            notes: None,
        }
    }

    // Toko approved dengan dua produk: stok 10 dan 5
    async fn seeded() -> (Arc<MemoryOrderStore>, Shop, i32, i32) {
        let store = Arc::new(MemoryOrderStore::new());
        let shop = store.seed_shop(OWNER, ShopStatus::Approved, Some((18.52, 73.85))).await;
        let tomat = store.seed_product(shop.id, "Tomat", 40.0, 10).await;
        let bayam = store.seed_product(shop.id, "Bayam", 25.0, 5).await;
        (store, shop, tomat.id, bayam.id)
    }

    #[tokio::test]
    async fn test_happy_path_order_to_dispatch() {
        let (store, shop, tomat, bayam) = seeded().await;
        let wf = workflow(store.clone());

        let created = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 2), (bayam, 1)]))
            .await
            .unwrap();
        assert_eq!(created.order.status, OrderStatus::PendingApproval);
        assert_eq!(created.order.subtotal, 105.0);
        assert_eq!(created.order.total_amount, 135.0);
        assert!(created
            .items
            .iter()
            .all(|i| i.approval_status == ApprovalStatus::Pending));

        // Belum ada reservasi stok saat order dibuat
        assert_eq!(store.product_quantity(tomat).await, 10);

        let outcome = wf.approve_order(owner(), created.order_id).await.unwrap();
        assert!(!outcome.already_dispatched);
        assert_eq!(outcome.order.status, OrderStatus::Approved);
        assert_eq!(outcome.delivery.order_id, created.order_id);
        assert_eq!(outcome.delivery.status, shared::DeliveryStatus::Unassigned);
        assert_eq!(outcome.delivery.delivery_agent_id, None);
        assert_eq!(store.delivery_count(created.order_id).await, 1);
        assert_eq!(outcome.delivery.pickup_address, shop.address);
        assert_eq!(outcome.delivery.pickup_latitude, Some(18.52));

        assert_eq!(store.product_quantity(tomat).await, 8);
        assert_eq!(store.product_quantity(bayam).await, 4);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let store = Arc::new(MemoryOrderStore::new());
        let shop = store.seed_shop(OWNER, ShopStatus::Approved, None).await;
        let a = store.seed_product(shop.id, "A", 15.0, 5).await;
        let b = store.seed_product(shop.id, "B", 20.0, 1).await;
        let wf = workflow(store.clone());

        // Checkout tidak memblok karena stok; stok dicek saat approval
        let created = wf
            .create_order(customer(), cart(shop.id, &[(a.id, 3), (b.id, 2)]))
            .await
            .unwrap();
        assert_eq!(created.order.status, OrderStatus::PendingApproval);

        let err = wf.approve_order(owner(), created.order_id).await.unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, "Stok tidak cukup untuk produk B"),
            other => panic!("expected conflict, got {:?}", other),
        }

        let detail = wf.get_order(owner(), created.order_id).await.unwrap();
        assert_eq!(detail.order.status, OrderStatus::PendingApproval);
        assert!(detail.items.iter().all(|i| i.reserved_quantity == 0));
        assert_eq!(store.product_quantity(a.id).await, 5);
        assert_eq!(store.product_quantity(b.id).await, 1);
        assert_eq!(store.delivery_count(created.order_id).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_never_oversell() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = Arc::new(workflow(store.clone()));

        let a = wf.create_order(customer(), cart(shop.id, &[(tomat, 6)])).await.unwrap();
        let b = wf.create_order(customer(), cart(shop.id, &[(tomat, 6)])).await.unwrap();

        let (ra, rb) = tokio::join!(
            {
                let wf = wf.clone();
                async move { wf.approve_order(owner(), a.order_id).await }
            },
            {
                let wf = wf.clone();
                async move { wf.approve_order(owner(), b.order_id).await }
            }
        );

        assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
        assert!(matches!(
            ra.err().or(rb.err()),
            Some(AppError::Conflict(_))
        ));
        assert_eq!(store.product_quantity(tomat).await, 4);
    }

    #[tokio::test]
    async fn test_repeated_approval_is_idempotent() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());

        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 3)])).await.unwrap();
        let first = wf.approve_order(owner(), created.order_id).await.unwrap();
        let second = wf.approve_order(owner(), created.order_id).await.unwrap();

        assert!(second.already_dispatched);
        assert_eq!(first.delivery.id, second.delivery.id);
        assert_eq!(store.product_quantity(tomat).await, 7);
        assert_eq!(store.delivery_count(created.order_id).await, 1);
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_leaves_stock() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 2)])).await.unwrap();

        let err = wf.reject_order(owner(), created.order_id, "  ").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let rejected = wf
            .reject_order(owner(), created.order_id, "out of stock")
            .await
            .unwrap();
        assert_eq!(rejected.status, OrderStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("out of stock"));

        let items = wf.get_order(customer(), created.order_id).await.unwrap().items;
        assert!(items.iter().all(|i| i.approval_status == ApprovalStatus::Pending));
        assert_eq!(store.product_quantity(tomat).await, 10);
        assert_eq!(store.delivery_count(created.order_id).await, 0);

        // Order rejected tidak bisa di-approve
        let err = wf.approve_order(owner(), created.order_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_non_owner_shopkeeper_forbidden() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();

        let stranger = Principal::new(999, Role::Shopkeeper);
        let err = wf.approve_order(stranger, created.order_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(matches!(
            wf.get_order(stranger, created.order_id).await.unwrap_err(),
            AppError::Forbidden(_)
        ));

        // Customer tidak bisa approve order sendiri
        let err = wf.approve_order(customer(), created.order_id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Admin boleh
        let admin = Principal::new(1, Role::Admin);
        assert!(wf.approve_order(admin, created.order_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_farmer_owns_shop_too() {
        let store = Arc::new(MemoryOrderStore::new());
        let farmer = Principal::new(300, Role::Farmer);
        let shop = store.seed_shop(farmer.id, ShopStatus::Approved, None).await;
        let beras = store.seed_product(shop.id, "Beras", 60.0, 50).await;
        let wf = workflow(store.clone());

        let created = wf.create_order(customer(), cart(shop.id, &[(beras.id, 5)])).await.unwrap();
        let outcome = wf.approve_order(farmer, created.order_id).await.unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Approved);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());

        let mut empty = cart(shop.id, &[]);
        empty.items.clear();
        assert!(matches!(
            wf.create_order(customer(), empty).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let zero = cart(shop.id, &[(tomat, 0)]);
        assert!(matches!(
            wf.create_order(customer(), zero).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let mut no_payment = cart(shop.id, &[(tomat, 1)]);
        no_payment.payment_method = None;
        assert!(matches!(
            wf.create_order(customer(), no_payment).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let mut no_city = cart(shop.id, &[(tomat, 1)]);
        if let Some(address) = no_city.delivery_address.as_mut() {
            address.city = " ".to_string();
        }
        assert!(matches!(
            wf.create_order(customer(), no_city).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let mut no_address = cart(shop.id, &[(tomat, 1)]);
        no_address.delivery_address = None;
        assert!(matches!(
            wf.create_order(customer(), no_address).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        // Melebihi stok saat ini tetap diterima, tanpa reservasi
        let more_than_stock = cart(shop.id, &[(tomat, 11)]);
        let created = wf.create_order(customer(), more_than_stock).await.unwrap();
        assert_eq!(created.items[0].quantity, 11);
        assert_eq!(store.product_quantity(tomat).await, 10);

        // Shopkeeper tidak bisa checkout
        assert!(matches!(
            wf.create_order(owner(), cart(shop.id, &[(tomat, 1)])).await.unwrap_err(),
            AppError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_create_order_rejects_foreign_and_expired_products() {
        let (store, shop, tomat, _) = seeded().await;
        let other_shop = store.seed_shop(201, ShopStatus::Approved, None).await;
        let foreign = store.seed_product(other_shop.id, "Mangga", 80.0, 20).await;
        let wf = workflow(store.clone());

        let err = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 1), (foreign.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let yesterday = Utc::now().date_naive().pred_opt().unwrap();
        store.set_product_expiry(tomat, yesterday).await;
        let err = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_unapproved_shop_does_not_take_orders() {
        let store = Arc::new(MemoryOrderStore::new());
        let shop = store.seed_shop(OWNER, ShopStatus::Pending, None).await;
        let product = store.seed_product(shop.id, "Susu", 30.0, 10).await;
        let wf = workflow(store.clone());

        let err = wf
            .create_order(customer(), cart(shop.id, &[(product.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_saved_address_used_and_scoped_to_customer() {
        let (store, shop, tomat, _) = seeded().await;
        let saved = store.seed_address(CUSTOMER).await;
        let someone_else = store.seed_address(CUSTOMER + 1).await;
        let wf = workflow(store.clone());

        let mut request = cart(shop.id, &[(tomat, 1)]);
        request.delivery_address = None;
        request.address_id = Some(saved.id);
        let created = wf.create_order(customer(), request).await.unwrap();
        assert_eq!(
            created.order.delivery_address,
            "12 MG Road, Bengaluru, Karnataka - 560001"
        );
        assert_eq!(created.order.coordinates(), Some((12.97, 77.59)));

        let mut request = cart(shop.id, &[(tomat, 1)]);
        request.address_id = Some(someone_else.id);
        assert!(matches!(
            wf.create_order(customer(), request).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_geocoding_failure_does_not_block_dispatch() {
        let store = Arc::new(MemoryOrderStore::new());
        let shop = store.seed_shop(OWNER, ShopStatus::Approved, None).await;
        let product = store.seed_product(shop.id, "Kentang", 20.0, 10).await;

        let mut resolver = MockAddressResolver::new();
        resolver.expect_resolve().returning(|address| {
            if address.contains("Market Street") {
                Ok(Some(GeoPoint {
                    latitude: 18.5,
                    longitude: 73.8,
                }))
            } else {
                Err(shared::utils::http_client::HttpClientError::ServiceUnavailable(
                    "down".to_string(),
                ))
            }
        });

        let wf = workflow_with(store.clone(), Arc::new(resolver), Arc::new(LogNotifier));
        let created = wf.create_order(customer(), cart(shop.id, &[(product.id, 1)])).await.unwrap();
        let outcome = wf.approve_order(owner(), created.order_id).await.unwrap();

        assert_eq!(outcome.delivery.pickup_latitude, Some(18.5));
        assert_eq!(outcome.delivery.delivery_latitude, None);
        assert_eq!(outcome.delivery.delivery_longitude, None);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();

        store.fail_next_approvals(2).await;
        let outcome = wf.approve_order(owner(), created.order_id).await.unwrap();
        assert!(!outcome.already_dispatched);
        assert_eq!(store.product_quantity(tomat).await, 9);

        let second = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();
        store.fail_next_approvals(3).await;
        let err = wf.approve_order(owner(), second.order_id).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_item_approval_rules() {
        let (store, shop, tomat, bayam) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 2), (bayam, 1)]))
            .await
            .unwrap();
        let tomat_item = created.items[0].id;
        let bayam_item = created.items[1].id;

        let no_reason = ItemApprovalRequest {
            approval_status: ApprovalStatus::Rejected,
            rejection_reason: None,
        };
        assert!(matches!(
            wf.set_item_approval(owner(), bayam_item, no_reason).await.unwrap_err(),
            AppError::ValidationError(_)
        ));

        let rejected = wf
            .set_item_approval(
                owner(),
                bayam_item,
                ItemApprovalRequest {
                    approval_status: ApprovalStatus::Rejected,
                    rejection_reason: Some("Layu".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);

        // Item rejected tidak memotong stok
        wf.approve_order(owner(), created.order_id).await.unwrap();
        assert_eq!(store.product_quantity(tomat).await, 8);
        assert_eq!(store.product_quantity(bayam).await, 5);

        // Setelah approve item masih bisa diubah, stok tidak berubah
        let approved = wf
            .set_item_approval(
                owner(),
                tomat_item,
                ItemApprovalRequest {
                    approval_status: ApprovalStatus::Approved,
                    rejection_reason: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert_eq!(approved.reserved_quantity, 2);
        assert_eq!(store.product_quantity(tomat).await, 8);
    }

    #[tokio::test]
    async fn test_item_rejected_after_approval_is_restocked_on_cancel() {
        let (store, shop, tomat, bayam) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 2), (bayam, 1)]))
            .await
            .unwrap();
        let bayam_item = created.items[1].id;

        wf.approve_order(owner(), created.order_id).await.unwrap();
        assert_eq!(store.product_quantity(tomat).await, 8);
        assert_eq!(store.product_quantity(bayam).await, 4);

        let rejected = wf
            .set_item_approval(
                owner(),
                bayam_item,
                ItemApprovalRequest {
                    approval_status: ApprovalStatus::Rejected,
                    rejection_reason: Some("rusak".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
        assert_eq!(store.product_quantity(bayam).await, 4);

        wf.cancel_order(owner(), created.order_id, "Pembeli tidak bisa dihubungi")
            .await
            .unwrap();
        assert_eq!(store.product_quantity(tomat).await, 10);
        assert_eq!(store.product_quantity(bayam).await, 5);

        // Order final, item terkunci
        let err = wf
            .set_item_approval(
                owner(),
                bayam_item,
                ItemApprovalRequest {
                    approval_status: ApprovalStatus::Approved,
                    rejection_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let items = wf.get_order(customer(), created.order_id).await.unwrap().items;
        assert!(items.iter().all(|i| i.reserved_quantity == 0));
    }

    #[tokio::test]
    async fn test_all_items_rejected_blocks_approval() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 2)])).await.unwrap();

        wf.set_item_approval(
            owner(),
            created.items[0].id,
            ItemApprovalRequest {
                approval_status: ApprovalStatus::Rejected,
                rejection_reason: Some("Busuk".to_string()),
            },
        )
        .await
        .unwrap();

        let err = wf.approve_order(owner(), created.order_id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(store.delivery_count(created.order_id).await, 0);
    }

    #[tokio::test]
    async fn test_approve_all_items() {
        let (store, shop, tomat, bayam) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf
            .create_order(customer(), cart(shop.id, &[(tomat, 1), (bayam, 1)]))
            .await
            .unwrap();

        let items = wf.approve_all_items(owner(), created.order_id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.approval_status == ApprovalStatus::Approved));

        wf.reject_order(owner(), created.order_id, "toko tutup").await.unwrap();
        assert!(matches!(
            wf.approve_all_items(owner(), created.order_id).await.unwrap_err(),
            AppError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_status_progression_and_invalid_transitions() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();

        let to = |status| UpdateOrderStatusRequest { status, notes: None };

        // Tidak bisa lompat ke preparing sebelum approve
        assert!(matches!(
            wf.update_status(owner(), created.order_id, to(OrderStatus::Preparing))
                .await
                .unwrap_err(),
            AppError::Conflict(_)
        ));

        let approved = wf
            .update_status(owner(), created.order_id, to(OrderStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.status, OrderStatus::Approved);
        assert_eq!(store.delivery_count(created.order_id).await, 1);

        let preparing = wf
            .update_status(owner(), created.order_id, to(OrderStatus::Preparing))
            .await
            .unwrap();
        assert_eq!(preparing.status, OrderStatus::Preparing);

        let ready = wf
            .update_status(owner(), created.order_id, to(OrderStatus::Ready))
            .await
            .unwrap();
        assert_eq!(ready.status, OrderStatus::Ready);

        // delivered hanya lewat delivery-service atau admin
        assert!(matches!(
            wf.update_status(owner(), created.order_id, to(OrderStatus::Delivered))
                .await
                .unwrap_err(),
            AppError::Forbidden(_)
        ));

        assert!(matches!(
            wf.update_status(owner(), created.order_id, to(OrderStatus::PendingApproval))
                .await
                .unwrap_err(),
            AppError::ValidationError(_)
        ));
    }

    #[tokio::test]
    async fn test_cancel_pending_order_by_customer() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 2)])).await.unwrap();

        let err = wf.cancel_order(customer(), created.order_id, "").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let other_customer = Principal::new(CUSTOMER + 1, Role::Customer);
        assert!(matches!(
            wf.cancel_order(other_customer, created.order_id, "iseng").await.unwrap_err(),
            AppError::Forbidden(_)
        ));

        let cancelled = wf
            .cancel_order(customer(), created.order_id, "Berubah pikiran")
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(CUSTOMER));
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(store.product_quantity(tomat).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_after_approval_restores_stock() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 4)])).await.unwrap();
        let outcome = wf.approve_order(owner(), created.order_id).await.unwrap();
        assert_eq!(store.product_quantity(tomat).await, 6);

        wf.cancel_order(owner(), created.order_id, "Kurir tidak tersedia")
            .await
            .unwrap();
        assert_eq!(store.product_quantity(tomat).await, 10);

        let delivery = store
            .find_delivery_by_order(created.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.id, outcome.delivery.id);
        assert_eq!(delivery.status, shared::DeliveryStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_blocked_once_agent_assigned() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 4)])).await.unwrap();
        wf.approve_order(owner(), created.order_id).await.unwrap();

        store.assign_delivery(created.order_id, 77).await;

        let err = wf
            .cancel_order(customer(), created.order_id, "Terlalu lama")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.product_quantity(tomat).await, 6);

        // Agent yang di-assign bisa melihat order
        let agent = Principal::new(77, Role::DeliveryAgent);
        assert!(wf.get_order(agent, created.order_id).await.is_ok());
        let other_agent = Principal::new(78, Role::DeliveryAgent);
        assert!(wf.get_order(other_agent, created.order_id).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_terminal_order_conflicts() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();
        wf.reject_order(owner(), created.order_id, "tutup").await.unwrap();

        let err = wf
            .cancel_order(customer(), created.order_id, "batal")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_events_published_on_approval() {
        let (store, shop, tomat, _) = seeded().await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|e| matches!(e, WorkflowEvent::OrderCreated { .. }))
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_notify()
            .withf(|e| {
                matches!(
                    e,
                    WorkflowEvent::OrderStatusChanged {
                        status: OrderStatus::Approved,
                        ..
                    }
                )
            })
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_notify()
            .withf(|e| matches!(e, WorkflowEvent::DeliveryDispatched { .. }))
            .times(1)
            .returning(|_| {
                Err(NotifyError::Delivery(
                    shared::utils::http_client::HttpClientError::ServiceUnavailable(
                        "notification down".to_string(),
                    ),
                ))
            });

        let wf = workflow_with(store.clone(), Arc::new(NoopAddressResolver), Arc::new(notifier));
        let created = wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();

        // Notifikasi gagal tidak menggagalkan approval
        let outcome = wf.approve_order(owner(), created.order_id).await.unwrap();
        assert!(!outcome.already_dispatched);

        // Approve ulang tidak publish event lagi
        let again = wf.approve_order(owner(), created.order_id).await.unwrap();
        assert!(again.already_dispatched);
    }

    #[tokio::test]
    async fn test_listing_scoped_by_role() {
        let (store, shop, tomat, _) = seeded().await;
        let wf = workflow(store.clone());
        for _ in 0..3 {
            wf.create_order(customer(), cart(shop.id, &[(tomat, 1)])).await.unwrap();
        }

        let params = |status| OrderQueryParams {
            status,
            page: None,
            limit: Some(2),
        };

        let mine = wf.list_my_orders(customer(), params(None)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(wf.list_my_orders(owner(), params(None)).await.is_err());

        let shop_orders = wf
            .list_shop_orders(owner(), shop.id, params(Some(OrderStatus::PendingApproval)))
            .await
            .unwrap();
        assert_eq!(shop_orders.len(), 2);
        assert!(matches!(
            wf.list_shop_orders(Principal::new(5, Role::Shopkeeper), shop.id, params(None))
                .await
                .unwrap_err(),
            AppError::Forbidden(_)
        ));
    }

    #[tokio::test]
    async fn test_product_availability() {
        let (store, _, tomat, bayam) = seeded().await;
        let wf = workflow(store.clone());

        let result = wf
            .product_availability(AvailabilityRequest {
                product_ids: vec![tomat, bayam],
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|p| p.in_stock));

        assert!(wf
            .product_availability(AvailabilityRequest { product_ids: vec![] })
            .await
            .is_err());

        let err = wf
            .product_availability(AvailabilityRequest {
                product_ids: (1..=101).collect(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
