use crate::api::AppState;
use crate::config::Config;
use crate::database::Database;
use crate::domain::ports::atomic_store::AtomicStore;
use crate::domain::ports::order_repository::OrderRepository;
use crate::domain::ports::versioned_store::VersionedStore;
use crate::services::{IdempotencyGuard, LockManager, OrderService, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Wire services and repositories and start background maintenance.
pub async fn build_app_state(db: Database, config: &Config) -> anyhow::Result<AppState> {
    let atomic_store: Arc<dyn AtomicStore> = Arc::new(db.clone());

    let lock_manager = LockManager::new(atomic_store.clone());
    tracing::info!("Lock manager initialized");

    let idempotency = IdempotencyGuard::new(atomic_store);
    tracing::info!("Idempotency guard initialized");

    let rate_limiter = RateLimiter::new(
        config.order.rate_window,
        config.order.rate_max_requests,
    );
    tracing::info!(
        "Rate limiter initialized ({} requests per {:?})",
        config.order.rate_max_requests,
        config.order.rate_window
    );

    // Periodic sweep of elapsed rate windows.
    let sweep_limiter = rate_limiter.clone();
    let sweep_interval = config.order.rate_window.max(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweep_limiter.cleanup().await;
        }
    });

    let orders: Arc<dyn OrderRepository> = Arc::new(db.clone());
    let stock: Arc<dyn VersionedStore> = Arc::new(db.stock_store());
    let balances: Arc<dyn VersionedStore> = Arc::new(db.balance_store());
    let promos: Arc<dyn VersionedStore> = Arc::new(db.promo_store());

    let order_service = OrderService::new(
        lock_manager,
        idempotency,
        rate_limiter,
        orders.clone(),
        stock,
        balances,
        promos,
        config.order.clone(),
        config.stock.clone(),
    );
    tracing::info!("Order service initialized");

    Ok(AppState {
        order_service,
        orders,
    })
}

/// Development-only catalog seed, enabled with SEED_DEMO_DATA=true.
pub async fn seed_demo_data(db: &Database) -> anyhow::Result<()> {
    use crate::models::{Product, PromoCode};

    if db.get_product_by_sku("WIDGET-1").await?.is_some() {
        tracing::info!("Demo catalog already present, skipping seed");
        return Ok(());
    }

    tracing::info!("Seeding demo catalog");

    db.create_product(&Product {
        id: uuid::Uuid::new_v4().to_string(),
        sku: "WIDGET-1".to_string(),
        name: "Widget".to_string(),
        price_cents: 1_500,
        created_at: chrono::Utc::now().to_rfc3339(),
    })
    .await?;
    db.set_stock("WIDGET-1", 100).await?;

    db.create_promo(&PromoCode {
        code: "LAUNCH10".to_string(),
        discount_cents: 1_000,
        remaining_uses: 50,
        version: 1,
    })
    .await?;

    db.set_balance("demo-user", 100_000).await?;

    Ok(())
}
