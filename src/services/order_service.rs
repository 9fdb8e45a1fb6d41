use crate::config::ConcurrencySettings;
use crate::domain::errors::{FlowResult, OrderFlowError};
use crate::domain::ports::order_repository::OrderRepository;
use crate::domain::ports::versioned_store::VersionedStore;
use crate::models::{CreateOrderRequest, Order, OrderReceipt, OrderStatus};
use crate::services::fingerprint;
use crate::services::idempotency::IdempotencyGuard;
use crate::services::lock_manager::LockManager;
use crate::services::optimistic::conditional_update;
use crate::services::rate_limiter::RateLimiter;
use crate::services::retry::{with_retry, RetryPolicy};
use std::sync::Arc;

const OPERATION_CREATE_ORDER: &str = "order.create";

/// The protected order critical section and everything that guards it.
///
/// Per request: rate check, then the user-scoped lock, then the
/// idempotency check, and only on a cache miss the actual mutation
/// (promo redemption, stock decrement, balance debit, order insert).
/// The lock is released on every exit path, and the outcome is cached
/// under the request fingerprint before the caller sees it.
#[derive(Clone)]
pub struct OrderService {
    locks: LockManager,
    idempotency: IdempotencyGuard,
    rate_limiter: RateLimiter,
    orders: Arc<dyn OrderRepository>,
    stock: Arc<dyn VersionedStore>,
    balances: Arc<dyn VersionedStore>,
    promos: Arc<dyn VersionedStore>,
    /// Tunables for the order pipeline (lock, idempotency, retry, rate).
    settings: ConcurrencySettings,
    /// Tunables for the versioned resource writes inside the pipeline.
    stock_settings: ConcurrencySettings,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locks: LockManager,
        idempotency: IdempotencyGuard,
        rate_limiter: RateLimiter,
        orders: Arc<dyn OrderRepository>,
        stock: Arc<dyn VersionedStore>,
        balances: Arc<dyn VersionedStore>,
        promos: Arc<dyn VersionedStore>,
        settings: ConcurrencySettings,
        stock_settings: ConcurrencySettings,
    ) -> Self {
        Self {
            locks,
            idempotency,
            rate_limiter,
            orders,
            stock,
            balances,
            promos,
            settings,
            stock_settings,
        }
    }

    /// Place an order for `user_id`. An explicit `idempotency_key` (from
    /// the request header) takes precedence over the derived fingerprint,
    /// but is always scoped to the acting user so two users sharing a key
    /// can never see each other's cached receipts. The payload digest is
    /// stored with the record, so reusing a key with a different payload
    /// is rejected instead of replayed.
    pub async fn place_order(
        &self,
        user_id: &str,
        request: CreateOrderRequest,
        idempotency_key: Option<String>,
    ) -> FlowResult<OrderReceipt> {
        request
            .validate()
            .map_err(OrderFlowError::BadRequest)?;
        let request = request.normalized();

        let rate_key = format!("orders:{}", user_id);
        self.rate_limiter.check(&rate_key).await?;

        let digest = fingerprint::derive(OPERATION_CREATE_ORDER, user_id, &request);
        let fingerprint = match idempotency_key {
            Some(key) => fingerprint::derive(OPERATION_CREATE_ORDER, user_id, &key),
            None => digest.clone(),
        };

        // Transient contention (lock timeout, exhausted version conflicts,
        // duplicate still in flight) is retried here with backoff; a retry
        // that lands after the first execution completed is answered from
        // the idempotency cache.
        let policy = RetryPolicy::from_settings(&self.settings);
        let outcome = with_retry(policy, |_| {
            self.locked_place(user_id, &request, &fingerprint, &digest)
        })
        .await;

        // A rejected request never occupied a slot, so it has nothing to
        // refund even when failures are not counted.
        let counted = match &outcome {
            Ok(_) => self.settings.rate_count_successes,
            Err(OrderFlowError::RateLimited { .. }) => true,
            Err(_) => self.settings.rate_count_failures,
        };
        if !counted {
            self.rate_limiter.refund(&rate_key).await;
        }

        outcome
    }

    /// Lock-acquire, idempotency-check, execute, lock-release.
    async fn locked_place(
        &self,
        user_id: &str,
        request: &CreateOrderRequest,
        fingerprint: &str,
        digest: &str,
    ) -> FlowResult<OrderReceipt> {
        let lock_key = format!("order:{}", user_id);
        let handle = self.locks.acquire(&lock_key, &self.settings).await?;

        let result = self
            .idempotency
            .execute(fingerprint, digest, self.settings.idempotency_ttl, || {
                self.execute_order(user_id, request)
            })
            .await;

        // Released on every path out of the critical section. A release
        // failure is logged loudly but never masks the order outcome: the
        // TTL will reclaim the record.
        if let Err(release_err) = self.locks.release(handle).await {
            tracing::error!("Failed to release {}: {}", lock_key, release_err);
        }

        result.map(|resolution| {
            let mut receipt = resolution.value;
            receipt.replayed = resolution.replayed;
            receipt
        })
    }

    /// The critical section proper. Runs only on an idempotency cache
    /// miss, while holding the user's order lock.
    async fn execute_order(
        &self,
        user_id: &str,
        request: &CreateOrderRequest,
    ) -> FlowResult<OrderReceipt> {
        let product = self
            .orders
            .get_product_by_sku(&request.sku)
            .await?
            .ok_or_else(|| OrderFlowError::NotFound(format!("Product {}", request.sku)))?;

        // Promo redemption first; it is the cheapest write to undo.
        let mut discount_cents = 0;
        if let Some(code) = &request.promo_code {
            let promo = self
                .orders
                .get_promo_by_code(code)
                .await?
                .ok_or_else(|| OrderFlowError::NotFound(format!("Promo code {}", code)))?;

            let code = code.clone();
            conditional_update(&self.promos, &promo.code, &self.stock_settings, move |uses| {
                if uses < 1 {
                    return Err(OrderFlowError::PromoExhausted { code: code.clone() });
                }
                Ok(uses - 1)
            })
            .await?;

            discount_cents = promo.discount_cents;
        }

        let quantity = request.quantity;
        let sku = request.sku.clone();
        let stock_result =
            conditional_update(&self.stock, &request.sku, &self.stock_settings, move |current| {
                if current < quantity {
                    return Err(OrderFlowError::InsufficientStock { sku: sku.clone() });
                }
                Ok(current - quantity)
            })
            .await;

        if let Err(err) = stock_result {
            self.restore_promo(request.promo_code.as_deref()).await;
            return Err(err);
        }

        let total_cents = (product.price_cents * quantity - discount_cents).max(0);
        let debit_result =
            conditional_update(&self.balances, user_id, &self.stock_settings, move |amount| {
                if amount < total_cents {
                    return Err(OrderFlowError::InsufficientBalance);
                }
                Ok(amount - total_cents)
            })
            .await;

        if let Err(err) = debit_result {
            self.restore_stock(&request.sku, quantity).await;
            self.restore_promo(request.promo_code.as_deref()).await;
            return Err(err);
        }

        let order = Order::new(
            user_id.to_string(),
            request.sku.clone(),
            quantity,
            product.price_cents,
            discount_cents,
            request.promo_code.clone(),
        );

        if let Err(err) = self.orders.create_order(&order).await {
            self.restore_balance(user_id, total_cents).await;
            self.restore_stock(&request.sku, quantity).await;
            self.restore_promo(request.promo_code.as_deref()).await;
            return Err(err);
        }

        metrics::counter!("checkout_orders_placed_total").increment(1);
        Ok(OrderReceipt::from_order(&order))
    }

    /// Cancel a placed order and return its resources: stock units, the
    /// debited balance and any promo use. Runs under the same user-scoped
    /// lock as placement, so a cancel never interleaves with an in-flight
    /// order for the same user.
    pub async fn cancel_order(&self, user_id: &str, order_id: &str) -> FlowResult<Order> {
        let lock_key = format!("order:{}", user_id);
        let handle = self.locks.acquire(&lock_key, &self.settings).await?;

        let result = self.execute_cancel(user_id, order_id).await;

        if let Err(release_err) = self.locks.release(handle).await {
            tracing::error!("Failed to release {}: {}", lock_key, release_err);
        }

        result
    }

    async fn execute_cancel(&self, user_id: &str, order_id: &str) -> FlowResult<Order> {
        let mut order = self
            .orders
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| OrderFlowError::NotFound(format!("Order {}", order_id)))?;

        // The conditional transition is the gate: only the caller that
        // flips placed -> cancelled gets to return the resources.
        if !self.orders.mark_order_cancelled(order_id).await? {
            return Err(OrderFlowError::BadRequest(format!(
                "Order {} is already cancelled",
                order_id
            )));
        }

        self.restore_stock(&order.sku, order.quantity).await;
        self.restore_balance(user_id, order.total_cents).await;
        self.restore_promo(order.promo_code.as_deref()).await;

        metrics::counter!("checkout_orders_cancelled_total").increment(1);
        tracing::info!("Order cancelled: id={}, user={}", order.id, user_id);

        order.status = OrderStatus::Cancelled;
        Ok(order)
    }

    // Best-effort compensation. A failure here leaves the resource short
    // until reconciliation; it is logged, never silently dropped.

    async fn restore_stock(&self, sku: &str, quantity: i64) {
        let result =
            conditional_update(&self.stock, sku, &self.stock_settings, move |current| {
                Ok(current + quantity)
            })
            .await;
        if let Err(err) = result {
            tracing::error!("Failed to restore {} units of {}: {}", quantity, sku, err);
        }
    }

    async fn restore_balance(&self, user_id: &str, amount_cents: i64) {
        let result =
            conditional_update(&self.balances, user_id, &self.stock_settings, move |current| {
                Ok(current + amount_cents)
            })
            .await;
        if let Err(err) = result {
            tracing::error!(
                "Failed to refund {} cents to {}: {}",
                amount_cents,
                user_id,
                err
            );
        }
    }

    async fn restore_promo(&self, promo_code: Option<&str>) {
        if let Some(code) = promo_code {
            let result =
                conditional_update(&self.promos, code, &self.stock_settings, |uses| Ok(uses + 1)).await;
            if let Err(err) = result {
                tracing::error!("Failed to restore a use of promo {}: {}", code, err);
            }
        }
    }
}
