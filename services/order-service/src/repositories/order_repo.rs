use async_trait::async_trait;
use shared::{ApprovalStatus, OrderStatus, Page};
use sqlx::{PgPool, Postgres, Transaction};

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

// Store order berbasis PostgreSQL
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Approve ulang: kembalikan delivery yang sudah ada tanpa potong stok lagi
    async fn existing_dispatch(&self, order_id: i32) -> AppResult<ApprovalOutcome> {
        let order = self
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order tidak ditemukan"))?;

        let delivery = match order.status {
            OrderStatus::Rejected | OrderStatus::Cancelled => None,
            _ => self.find_delivery_by_order(order_id).await?,
        };

        match delivery {
            Some(delivery) => Ok(ApprovalOutcome {
                order,
                delivery,
                already_dispatched: true,
            }),
            None => Err(AppError::conflict(format!(
                "Order tidak bisa di-approve dari status {}",
                order.status
            ))),
        }
    }
}

async fn items_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i32,
) -> AppResult<Vec<OrderItem>> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

    Ok(items)
}

// Status order dikunci FOR SHARE supaya approval tidak berjalan bersamaan
async fn lock_order_status(
    tx: &mut Transaction<'_, Postgres>,
    order_id: i32,
) -> AppResult<Option<OrderStatus>> {
    let row: Option<(OrderStatus,)> =
        sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR SHARE")
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(row.map(|(status,)| status))
}

// Approval item bisa diubah selama order belum final
fn accepts_item_changes(status: Option<OrderStatus>) -> bool {
    status.is_some_and(|s| !s.is_terminal())
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_shop(&self, shop_id: i32) -> AppResult<Option<Shop>> {
        let shop = sqlx::query_as("SELECT * FROM shops WHERE id = $1")
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(shop)
    }

    async fn find_products(&self, product_ids: &[i32]) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as("SELECT * FROM products WHERE id = ANY($1) ORDER BY id")
            .bind(product_ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    async fn find_address(&self, address_id: i32) -> AppResult<Option<CustomerAddress>> {
        let address = sqlx::query_as("SELECT * FROM customer_addresses WHERE id = $1")
            .bind(address_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(address)
    }

    async fn insert_order(&self, new_order: &NewOrder) -> AppResult<(Order, Vec<OrderItem>)> {
        let mut tx = self.pool.begin().await?;

        let order: Order = sqlx::query_as(
            "INSERT INTO orders (
                customer_id, shop_id, subtotal, delivery_fee, total_amount,
                delivery_address, delivery_latitude, delivery_longitude, delivery_phone,
                payment_method, payment_status, notes, status, request_type
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11, $12, 'order_request'
            ) RETURNING *",
        )
        .bind(new_order.customer_id)
        .bind(new_order.shop_id)
        .bind(new_order.subtotal)
        .bind(new_order.delivery_fee)
        .bind(new_order.total_amount())
        .bind(&new_order.delivery_address)
        .bind(new_order.delivery_latitude)
        .bind(new_order.delivery_longitude)
        .bind(&new_order.delivery_phone)
        .bind(new_order.payment_method)
        .bind(&new_order.notes)
        .bind(OrderStatus::PendingApproval)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(new_order.lines.len());
        for line in &new_order.lines {
            let item: OrderItem = sqlx::query_as(
                "INSERT INTO order_items (
                    order_id, product_id, product_name, quantity, price, approval_status
                ) VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *",
            )
            .bind(order.id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.price)
            .bind(ApprovalStatus::Pending)
            .fetch_one(&mut *tx)
            .await?;

            items.push(item);
        }

        tx.commit().await?;

        Ok((order, items))
    }

    async fn find_order(&self, order_id: i32) -> AppResult<Option<Order>> {
        let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn find_items(&self, order_id: i32) -> AppResult<Vec<OrderItem>> {
        let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    async fn find_item(&self, item_id: i32) -> AppResult<Option<OrderItem>> {
        let item = sqlx::query_as("SELECT * FROM order_items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn list_customer_orders(
        &self,
        customer_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>> {
        let orders = if let Some(status) = status {
            sqlx::query_as(
                "SELECT * FROM orders
                 WHERE customer_id = $1 AND status = $2
                 ORDER BY created_at DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(customer_id)
            .bind(status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM orders
                 WHERE customer_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2 OFFSET $3",
            )
            .bind(customer_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(orders)
    }

    async fn list_shop_orders(
        &self,
        shop_id: i32,
        status: Option<OrderStatus>,
        page: Page,
    ) -> AppResult<Vec<Order>> {
        let orders = if let Some(status) = status {
            sqlx::query_as(
                "SELECT * FROM orders
                 WHERE shop_id = $1 AND status = $2
                 ORDER BY created_at DESC
                 LIMIT $3 OFFSET $4",
            )
            .bind(shop_id)
            .bind(status)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                "SELECT * FROM orders
                 WHERE shop_id = $1
                 ORDER BY created_at DESC
                 LIMIT $2 OFFSET $3",
            )
            .bind(shop_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(orders)
    }

    async fn find_delivery_by_order(&self, order_id: i32) -> AppResult<Option<DeliveryRecord>> {
        let delivery = sqlx::query_as("SELECT * FROM deliveries WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(delivery)
    }

    async fn approve_and_dispatch(&self, plan: &ApprovalPlan) -> AppResult<ApprovalOutcome> {
        let mut tx = self.pool.begin().await?;

        // Status guard: hanya satu approval yang bisa lolos
        let approved: Option<Order> = sqlx::query_as(
            "UPDATE orders SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = $3
             RETURNING *",
        )
        .bind(plan.order_id)
        .bind(OrderStatus::Approved)
        .bind(OrderStatus::PendingApproval)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = approved else {
            tx.rollback().await?;
            return self.existing_dispatch(plan.order_id).await;
        };

        let items = items_in_tx(&mut tx, plan.order_id).await?;
        let stock = StockLine::from_items(&items);
        if stock.is_empty() {
            return Err(AppError::validation(
                "Semua item ditolak, order tidak bisa di-approve",
            ));
        }

        // Urut product_id, sama di semua transaksi
        for line in &stock {
            let result = sqlx::query(
                "UPDATE products SET quantity = quantity - $2, updated_at = NOW()
                 WHERE id = $1 AND quantity >= $2",
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tracing::warn!(
                    "📦 Stok tidak cukup untuk produk {} ({}), approval order {} dibatalkan",
                    line.product_id,
                    line.product_name,
                    plan.order_id
                );
                return Err(AppError::conflict(format!(
                    "Stok tidak cukup untuk produk {}",
                    line.product_name
                )));
            }
        }

        // Catat jumlah yang dipotong per item, dipakai saat restock
        sqlx::query(
            "UPDATE order_items SET reserved_quantity = quantity, updated_at = NOW()
             WHERE order_id = $1 AND approval_status <> $2",
        )
        .bind(plan.order_id)
        .bind(ApprovalStatus::Rejected)
        .execute(&mut *tx)
        .await?;

        let d = &plan.delivery;
        let inserted: Option<DeliveryRecord> = sqlx::query_as(
            "INSERT INTO deliveries (
                order_id, status,
                pickup_address, pickup_latitude, pickup_longitude,
                delivery_address, delivery_latitude, delivery_longitude, delivery_phone
            ) VALUES ($1, 'unassigned', $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *",
        )
        .bind(plan.order_id)
        .bind(&d.pickup_address)
        .bind(d.pickup_latitude)
        .bind(d.pickup_longitude)
        .bind(&d.delivery_address)
        .bind(d.delivery_latitude)
        .bind(d.delivery_longitude)
        .bind(&d.delivery_phone)
        .fetch_optional(&mut *tx)
        .await?;

        let delivery = match inserted {
            Some(delivery) => delivery,
            None => {
                sqlx::query_as("SELECT * FROM deliveries WHERE order_id = $1")
                    .bind(plan.order_id)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        tx.commit().await?;

        Ok(ApprovalOutcome {
            order,
            delivery,
            already_dispatched: false,
        })
    }

    async fn reject_order(&self, order_id: i32, reason: &str) -> AppResult<Option<Order>> {
        let order = sqlx::query_as(
            "UPDATE orders SET status = $2, rejection_reason = $3, updated_at = NOW()
             WHERE id = $1 AND status = $4
             RETURNING *",
        )
        .bind(order_id)
        .bind(OrderStatus::Rejected)
        .bind(reason)
        .bind(OrderStatus::PendingApproval)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn transition_status(
        &self,
        order_id: i32,
        from: OrderStatus,
        to: OrderStatus,
    ) -> AppResult<Option<Order>> {
        let order = sqlx::query_as(
            "UPDATE orders SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING *",
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn cancel_order(&self, plan: &CancellationPlan) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        // Lock delivery dulu (urutan lock delivery -> order -> produk)
        let delivery: Option<DeliveryRecord> =
            sqlx::query_as("SELECT * FROM deliveries WHERE order_id = $1 FOR UPDATE")
                .bind(plan.order_id)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(delivery) = &delivery {
            if delivery.delivery_agent_id.is_some()
                || delivery.status != shared::DeliveryStatus::Unassigned
            {
                return Err(AppError::conflict(
                    "Delivery sudah diambil agent, order tidak bisa dibatalkan",
                ));
            }
        }

        let cancelled: Option<Order> = sqlx::query_as(
            "UPDATE orders SET
                status = $2,
                cancellation_reason = $3,
                cancelled_at = NOW(),
                cancelled_by = $4,
                updated_at = NOW()
             WHERE id = $1 AND status = $5
             RETURNING *",
        )
        .bind(plan.order_id)
        .bind(OrderStatus::Cancelled)
        .bind(&plan.reason)
        .bind(plan.cancelled_by)
        .bind(plan.expected_status)
        .fetch_optional(&mut *tx)
        .await?;

        let order = cancelled.ok_or_else(|| {
            AppError::conflict("Status order sudah berubah, silakan muat ulang")
        })?;

        if let Some(delivery) = delivery {
            sqlx::query("UPDATE deliveries SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(delivery.id)
                .bind(shared::DeliveryStatus::Cancelled)
                .execute(&mut *tx)
                .await?;
        }

        // Kembalikan persis yang dipotong saat approval, walau item di-reject setelahnya
        let items = items_in_tx(&mut tx, plan.order_id).await?;
        let restock = StockLine::reserved(&items);
        for line in &restock {
            sqlx::query(
                "UPDATE products SET quantity = quantity + $2, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }
        if !restock.is_empty() {
            sqlx::query(
                "UPDATE order_items SET reserved_quantity = 0, updated_at = NOW()
                 WHERE order_id = $1",
            )
            .bind(plan.order_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(order)
    }

    async fn set_item_approval(
        &self,
        item_id: i32,
        status: ApprovalStatus,
        rejection_reason: Option<&str>,
    ) -> AppResult<Option<OrderItem>> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<(i32,)> =
            sqlx::query_as("SELECT order_id FROM order_items WHERE id = $1")
                .bind(item_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((order_id,)) = order_id else {
            return Err(AppError::not_found("Item order tidak ditemukan"));
        };

        if !accepts_item_changes(lock_order_status(&mut tx, order_id).await?) {
            return Ok(None);
        }

        let reason = match status {
            ApprovalStatus::Rejected => rejection_reason,
            _ => None,
        };

        let item = sqlx::query_as(
            "UPDATE order_items SET approval_status = $2, rejection_reason = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(item_id)
        .bind(status)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(item))
    }

    async fn approve_all_items(&self, order_id: i32) -> AppResult<Option<Vec<OrderItem>>> {
        let mut tx = self.pool.begin().await?;

        if !accepts_item_changes(lock_order_status(&mut tx, order_id).await?) {
            return Ok(None);
        }

        let mut items: Vec<OrderItem> = sqlx::query_as(
            "UPDATE order_items SET approval_status = $2, rejection_reason = NULL, updated_at = NOW()
             WHERE order_id = $1
             RETURNING *",
        )
        .bind(order_id)
        .bind(ApprovalStatus::Approved)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        items.sort_by_key(|item| item.id);
        Ok(Some(items))
    }
}
