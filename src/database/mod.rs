pub mod memory;

use crate::domain::errors::{FlowResult, OrderFlowError};
use crate::domain::ports::atomic_store::AtomicStore;
use crate::domain::ports::order_repository::OrderRepository;
use crate::domain::ports::versioned_store::{VersionedRecord, VersionedStore};
use crate::models::{Balance, Order, OrderStatus, Product, PromoCode, StockLevel};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use std::time::Duration;

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = AnyPoolOptions::new()
            .max_connections(20)
            .min_connections(5)
            .connect(database_url)
            .await?;

        // Enable foreign keys for SQLite
        if database_url.starts_with("sqlite") {
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&pool)
                .await?;
        }

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    // ========== Catalog / account seeding ==========

    pub async fn create_product(&self, product: &Product) -> FlowResult<()> {
        sqlx::query(
            "INSERT INTO products (id, sku, name, price_cents, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(&product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_stock(&self, sku: &str, quantity: i64) -> FlowResult<()> {
        sqlx::query(
            "INSERT INTO stock_levels (sku, quantity, version)
             VALUES (?, ?, 1)
             ON CONFLICT(sku) DO UPDATE SET
                 quantity = excluded.quantity,
                 version = stock_levels.version + 1",
        )
        .bind(sku)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_stock(&self, sku: &str) -> FlowResult<Option<StockLevel>> {
        let row = sqlx::query("SELECT sku, quantity, version FROM stock_levels WHERE sku = ?")
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(StockLevel {
                sku: row.try_get("sku")?,
                quantity: row.try_get("quantity")?,
                version: row.try_get("version")?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn set_balance(&self, user_id: &str, amount_cents: i64) -> FlowResult<()> {
        sqlx::query(
            "INSERT INTO balances (user_id, amount_cents, version)
             VALUES (?, ?, 1)
             ON CONFLICT(user_id) DO UPDATE SET
                 amount_cents = excluded.amount_cents,
                 version = balances.version + 1",
        )
        .bind(user_id)
        .bind(amount_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_balance(&self, user_id: &str) -> FlowResult<Option<Balance>> {
        let row =
            sqlx::query("SELECT user_id, amount_cents, version FROM balances WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if let Some(row) = row {
            Ok(Some(Balance {
                user_id: row.try_get("user_id")?,
                amount_cents: row.try_get("amount_cents")?,
                version: row.try_get("version")?,
            }))
        } else {
            Ok(None)
        }
    }

    pub async fn create_promo(&self, promo: &PromoCode) -> FlowResult<()> {
        sqlx::query(
            "INSERT INTO promo_codes (code, discount_cents, remaining_uses, version)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&promo.code)
        .bind(promo.discount_cents)
        .bind(promo.remaining_uses)
        .bind(promo.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_promo(&self, code: &str) -> FlowResult<Option<PromoCode>> {
        let row = sqlx::query(
            "SELECT code, discount_cents, remaining_uses, version
             FROM promo_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(PromoCode {
                code: row.try_get("code")?,
                discount_cents: row.try_get("discount_cents")?,
                remaining_uses: row.try_get("remaining_uses")?,
                version: row.try_get("version")?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Adapter over the stock table for the conditional-write path.
    pub fn stock_store(&self) -> StockStore {
        StockStore { db: self.clone() }
    }

    /// Adapter over the balances table for the conditional-write path.
    pub fn balance_store(&self) -> BalanceStore {
        BalanceStore { db: self.clone() }
    }

    /// Adapter over promo usage counts for the conditional-write path.
    pub fn promo_store(&self) -> PromoStore {
        PromoStore { db: self.clone() }
    }
}

// ========== Atomic key-value records (locks, idempotency) ==========
//
// One table holds every TTL-bound record. Acquire is an upsert: insert,
// or take over the row when its TTL lapsed. RFC 3339 strings compare
// lexicographically, so the expiry check is a plain string comparison.

#[async_trait]
impl AtomicStore for Database {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());

        let result = sqlx::query(
            "INSERT INTO atomic_records (record_key, value, expires_at, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(record_key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at,
                 created_at = excluded.created_at
             WHERE atomic_records.expires_at < ?",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, key: &str) -> FlowResult<Option<String>> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            "SELECT value FROM atomic_records WHERE record_key = ? AND expires_at >= ?",
        )
        .bind(key)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(row.try_get("value")?))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> FlowResult<()> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());

        sqlx::query(
            "INSERT INTO atomic_records (record_key, value, expires_at, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(record_key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> FlowResult<bool> {
        let result = sqlx::query("DELETE FROM atomic_records WHERE record_key = ? AND value = ?")
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ========== Versioned conditional writes ==========

#[derive(Clone)]
pub struct StockStore {
    db: Database,
}

#[async_trait]
impl VersionedStore for StockStore {
    async fn read(&self, id: &str) -> FlowResult<Option<VersionedRecord>> {
        Ok(self.db.get_stock(id).await?.map(|s| VersionedRecord {
            id: s.sku,
            value: s.quantity,
            version: s.version,
        }))
    }

    async fn write_if(&self, id: &str, expected_version: i64, value: i64) -> FlowResult<bool> {
        let result = sqlx::query(
            "UPDATE stock_levels
             SET quantity = ?, version = version + 1
             WHERE sku = ? AND version = ?",
        )
        .bind(value)
        .bind(id)
        .bind(expected_version)
        .execute(&self.db.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct BalanceStore {
    db: Database,
}

#[async_trait]
impl VersionedStore for BalanceStore {
    async fn read(&self, id: &str) -> FlowResult<Option<VersionedRecord>> {
        Ok(self.db.get_balance(id).await?.map(|b| VersionedRecord {
            id: b.user_id,
            value: b.amount_cents,
            version: b.version,
        }))
    }

    async fn write_if(&self, id: &str, expected_version: i64, value: i64) -> FlowResult<bool> {
        let result = sqlx::query(
            "UPDATE balances
             SET amount_cents = ?, version = version + 1
             WHERE user_id = ? AND version = ?",
        )
        .bind(value)
        .bind(id)
        .bind(expected_version)
        .execute(&self.db.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PromoStore {
    db: Database,
}

#[async_trait]
impl VersionedStore for PromoStore {
    async fn read(&self, id: &str) -> FlowResult<Option<VersionedRecord>> {
        Ok(self.db.get_promo(id).await?.map(|p| VersionedRecord {
            id: p.code,
            value: p.remaining_uses,
            version: p.version,
        }))
    }

    async fn write_if(&self, id: &str, expected_version: i64, value: i64) -> FlowResult<bool> {
        let result = sqlx::query(
            "UPDATE promo_codes
             SET remaining_uses = ?, version = version + 1
             WHERE code = ? AND version = ?",
        )
        .bind(value)
        .bind(id)
        .bind(expected_version)
        .execute(&self.db.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ========== Orders and catalog reads ==========

#[async_trait]
impl OrderRepository for Database {
    async fn create_order(&self, order: &Order) -> FlowResult<()> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, sku, quantity, unit_price_cents, discount_cents,
                                 total_cents, promo_code, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(&order.sku)
        .bind(order.quantity)
        .bind(order.unit_price_cents)
        .bind(order.discount_cents)
        .bind(order.total_cents)
        .bind(order.promo_code.as_deref())
        .bind(order.status.to_string())
        .bind(&order.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Order created: id={}, user={}, sku={}, qty={}",
            order.id,
            order.user_id,
            order.sku,
            order.quantity
        );

        Ok(())
    }

    async fn get_promo_by_code(&self, code: &str) -> FlowResult<Option<PromoCode>> {
        self.get_promo(code).await
    }

    async fn get_order(&self, id: &str) -> FlowResult<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, sku, quantity, unit_price_cents, discount_cents,
                    total_cents, promo_code, status, created_at
             FROM orders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(order_from_row(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn mark_order_cancelled(&self, id: &str) -> FlowResult<bool> {
        // Conditional on the current status so two concurrent cancels can
        // never both win the transition (and refund twice).
        let result = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(OrderStatus::Cancelled.to_string())
            .bind(id)
            .bind(OrderStatus::Placed.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_orders_for_user(&self, user_id: &str, limit: i64) -> FlowResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, user_id, sku, quantity, unit_price_cents, discount_cents,
                    total_cents, promo_code, status, created_at
             FROM orders
             WHERE user_id = ?
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(order_from_row(&row)?);
        }

        Ok(orders)
    }

    async fn get_product_by_sku(&self, sku: &str) -> FlowResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, sku, name, price_cents, created_at FROM products WHERE sku = ?",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(Product {
                id: row.try_get("id")?,
                sku: row.try_get("sku")?,
                name: row.try_get("name")?,
                price_cents: row.try_get("price_cents")?,
                created_at: row.try_get("created_at")?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn list_products(&self, limit: i64, offset: i64) -> FlowResult<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, sku, name, price_cents, created_at
             FROM products
             ORDER BY sku
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut products = Vec::new();
        for row in rows {
            products.push(Product {
                id: row.try_get("id")?,
                sku: row.try_get("sku")?,
                name: row.try_get("name")?,
                price_cents: row.try_get("price_cents")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(products)
    }
}

fn order_from_row(row: &sqlx::any::AnyRow) -> Result<Order, OrderFlowError> {
    let status_str: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        sku: row.try_get("sku")?,
        quantity: row.try_get("quantity")?,
        unit_price_cents: row.try_get("unit_price_cents")?,
        discount_cents: row.try_get("discount_cents")?,
        total_cents: row.try_get("total_cents")?,
        promo_code: row.try_get("promo_code").ok(),
        status: OrderStatus::from(status_str),
        created_at: row.try_get("created_at")?,
    })
}
