// Business logic lifecycle delivery: polling, klaim, progres status, bukti foto.
// Principal selalu di-pass eksplisit dari handler.
use shared::{
    utils::{
        notifier::{publish, EventNotifier, WorkflowEvent},
        retry::{retry_transient, RetryPolicy},
        validation,
    },
    DeliveryStatus, OrderStatus, Page, Principal,
};
use std::sync::Arc;

use crate::{
    domain::delivery::{
        AcceptDeliveryRequest, Delivery, DeliveryAgent, DeliveryQuery, UpdateDeliveryRequest,
    },
    error::{AppError, AppResult},
    repositories::DeliveryStore,
};

pub struct DeliveryWorkflow {
    store: Arc<dyn DeliveryStore>,
    notifier: Arc<dyn EventNotifier>,
    retry: RetryPolicy,
}

impl DeliveryWorkflow {
    pub fn new(store: Arc<dyn DeliveryStore>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self {
            store,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ===== Polling =====

    /// `unassignedOnly=true` untuk delivery baru, `deliveryAgentId` untuk
    /// delivery milik agent. Tanpa filter, agent melihat delivery miliknya.
    pub async fn list(&self, principal: Principal, query: DeliveryQuery) -> AppResult<Vec<Delivery>> {
        let page = Page::new(query.page, query.limit);
        let unassigned_only = query.unassigned_only.unwrap_or(false);

        match (unassigned_only, query.delivery_agent_id) {
            (true, Some(_)) => Err(AppError::bad_request(
                "unassignedOnly dan deliveryAgentId tidak bisa dipakai bersamaan",
            )),
            (true, None) => {
                if principal.is_admin() || self.can_take_deliveries(principal).await? {
                    self.store.list_unassigned(page).await
                } else {
                    // Agent offline / belum terverifikasi tidak melihat order baru
                    Ok(Vec::new())
                }
            }
            (false, Some(agent_id)) => {
                if !(principal.is_admin() || (principal.is_delivery_agent() && principal.id == agent_id)) {
                    return Err(AppError::forbidden(
                        "Tidak bisa melihat delivery milik agent lain",
                    ));
                }
                self.store.list_by_agent(agent_id, page).await
            }
            (false, None) if principal.is_delivery_agent() => {
                self.store.list_by_agent(principal.id, page).await
            }
            (false, None) => Err(AppError::bad_request(
                "Gunakan parameter unassignedOnly atau deliveryAgentId",
            )),
        }
    }

    pub async fn get(&self, principal: Principal, delivery_id: i32) -> AppResult<Delivery> {
        let delivery = self.load_delivery(delivery_id).await?;

        let visible = principal.is_admin()
            || (principal.is_delivery_agent() && delivery.is_assigned_to(principal.id))
            || (delivery.is_claimable() && self.can_take_deliveries(principal).await?);

        if !visible {
            return Err(AppError::forbidden("Anda tidak punya akses ke delivery ini"));
        }
        Ok(delivery)
    }

    // ===== Klaim =====

    /// Agent mengambil delivery unassigned. Hanya satu agent yang bisa menang.
    pub async fn accept(&self, principal: Principal, payload: AcceptDeliveryRequest) -> AppResult<Delivery> {
        if !principal.is_delivery_agent() || principal.id != payload.delivery_agent_id {
            return Err(AppError::forbidden(
                "Delivery hanya bisa diambil oleh agent itu sendiri",
            ));
        }

        let agent = self.load_agent(principal.id).await?;
        if !agent.is_verified() {
            return Err(AppError::forbidden("Akun delivery agent belum diverifikasi"));
        }
        if !agent.is_available {
            return Err(AppError::conflict(
                "Agent sedang offline, aktifkan ketersediaan terlebih dahulu",
            ));
        }

        let claimed = self.store.claim(payload.delivery_id, agent.id).await?;

        let Some(delivery) = claimed else {
            let existing = self.load_delivery(payload.delivery_id).await?;
            tracing::info!(
                "🚫 Agent {} gagal mengambil delivery {} (status {})",
                agent.id,
                existing.id,
                existing.status
            );
            return Err(match existing.status {
                DeliveryStatus::Cancelled => AppError::conflict("Delivery sudah dibatalkan"),
                _ => AppError::conflict("Delivery sudah diambil agent lain"),
            });
        };

        tracing::info!(
            "🛵 Delivery {} (order {}) diambil oleh agent {}",
            delivery.id,
            delivery.order_id,
            agent.id
        );

        publish(
            self.notifier.as_ref(),
            WorkflowEvent::DeliveryAssigned {
                delivery_id: delivery.id,
                order_id: delivery.order_id,
                delivery_agent_id: agent.id,
            },
        )
        .await;

        Ok(delivery)
    }

    // ===== Progres Delivery =====

    /// picked_up, in_transit, atau delivered (wajib foto bukti)
    pub async fn update_status(
        &self,
        principal: Principal,
        payload: UpdateDeliveryRequest,
    ) -> AppResult<Delivery> {
        let target = payload.status;
        if !matches!(
            target,
            DeliveryStatus::PickedUp | DeliveryStatus::InTransit | DeliveryStatus::Delivered
        ) {
            return Err(AppError::validation(format!(
                "Status {} tidak bisa di-set oleh agent",
                target
            )));
        }

        let photo_url = match target {
            DeliveryStatus::Delivered => {
                let url = payload
                    .delivery_photo_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| AppError::validation("Foto bukti pengiriman wajib diisi"))?;
                if !validation::is_valid_photo_url(url) {
                    return Err(AppError::validation("URL foto bukti pengiriman tidak valid"));
                }
                Some(url)
            }
            _ => None,
        };

        let delivery = self.load_delivery(payload.delivery_id).await?;
        if !(principal.is_delivery_agent() && delivery.is_assigned_to(principal.id)) {
            return Err(AppError::forbidden(
                "Hanya agent yang mengambil delivery ini yang bisa mengubah status",
            ));
        }

        if !delivery.status.can_transition_to(target) {
            return Err(AppError::conflict(format!(
                "Transisi status delivery {} -> {} tidak valid",
                delivery.status, target
            )));
        }

        match photo_url {
            Some(url) => self.complete(principal.id, delivery, url).await,
            None => {
                let updated = self
                    .store
                    .advance(delivery.id, principal.id, delivery.status, target)
                    .await?
                    .ok_or_else(|| {
                        AppError::conflict("Status delivery sudah berubah, silakan muat ulang")
                    })?;

                tracing::info!("📍 Delivery {}: {} -> {}", updated.id, delivery.status, target);

                self.publish_status(&updated).await;
                Ok(updated)
            }
        }
    }

    async fn complete(&self, agent_id: i32, delivery: Delivery, photo_url: &str) -> AppResult<Delivery> {
        let completion = retry_transient("complete delivery", self.retry, AppError::is_transient, || {
            self.store.complete(delivery.id, agent_id, photo_url)
        })
        .await?
        .ok_or_else(|| AppError::conflict("Status delivery sudah berubah, silakan muat ulang"))?;

        let completed = completion.delivery;
        tracing::info!(
            "📦 Delivery {} selesai oleh agent {}, order {} delivered",
            completed.id,
            agent_id,
            completed.order_id
        );

        self.publish_status(&completed).await;
        if let Some(customer_id) = completion.customer_id {
            publish(
                self.notifier.as_ref(),
                WorkflowEvent::OrderStatusChanged {
                    order_id: completed.order_id,
                    customer_id,
                    status: OrderStatus::Delivered,
                },
            )
            .await;
        }

        Ok(completed)
    }

    // ===== Agent =====

    pub async fn my_agent(&self, principal: Principal) -> AppResult<DeliveryAgent> {
        ensure_agent(principal)?;
        self.load_agent(principal.id).await
    }

    /// Online/offline. Delivery yang sedang berjalan tidak tersentuh.
    pub async fn set_availability(&self, principal: Principal, is_available: bool) -> AppResult<DeliveryAgent> {
        ensure_agent(principal)?;

        let agent = self.load_agent(principal.id).await?;
        if is_available && !agent.is_verified() {
            return Err(AppError::forbidden("Akun delivery agent belum diverifikasi"));
        }

        let updated = self
            .store
            .set_availability(agent.id, is_available)
            .await?
            .ok_or_else(|| AppError::not_found("Profil delivery agent tidak ditemukan"))?;

        tracing::info!(
            "{} Agent {} sekarang {}",
            if is_available { "🟢" } else { "⚪" },
            updated.id,
            if is_available { "online" } else { "offline" }
        );

        Ok(updated)
    }

    // ===== Helpers =====

    async fn load_delivery(&self, delivery_id: i32) -> AppResult<Delivery> {
        self.store
            .find_delivery(delivery_id)
            .await?
            .ok_or_else(|| AppError::not_found("Delivery tidak ditemukan"))
    }

    async fn load_agent(&self, agent_id: i32) -> AppResult<DeliveryAgent> {
        self.store
            .find_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::not_found("Profil delivery agent tidak ditemukan"))
    }

    async fn can_take_deliveries(&self, principal: Principal) -> AppResult<bool> {
        if !principal.is_delivery_agent() {
            return Ok(false);
        }
        let agent = self.store.find_agent(principal.id).await?;
        Ok(agent.is_some_and(|a| a.can_take_deliveries()))
    }

    async fn publish_status(&self, delivery: &Delivery) {
        publish(
            self.notifier.as_ref(),
            WorkflowEvent::DeliveryStatusChanged {
                delivery_id: delivery.id,
                order_id: delivery.order_id,
                status: delivery.status,
            },
        )
        .await;
    }
}

fn ensure_agent(principal: Principal) -> AppResult<()> {
    if principal.is_delivery_agent() {
        Ok(())
    } else {
        Err(AppError::forbidden("Endpoint ini khusus delivery agent"))
    }
}
