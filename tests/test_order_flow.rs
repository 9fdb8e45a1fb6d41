//! End-to-end order placement through the guarded pipeline.

mod helpers;

use helpers::{seed_balance, seed_product, seed_promo, setup_test_db};
use oxicart::config::ConcurrencySettings;
use oxicart::database::Database;
use oxicart::domain::errors::OrderFlowError;
use oxicart::domain::ports::atomic_store::AtomicStore;
use oxicart::domain::ports::order_repository::OrderRepository;
use oxicart::models::CreateOrderRequest;
use oxicart::services::{IdempotencyGuard, LockManager, OrderService, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

fn fast_settings() -> ConcurrencySettings {
    ConcurrencySettings {
        lock_timeout: Duration::from_secs(5),
        lock_poll_base_delay: Duration::from_millis(2),
        cas_max_retries: 100,
        cas_backoff: Duration::from_millis(1),
        retry_max: 5,
        retry_base_delay: Duration::from_millis(10),
        retry_delay_cap: Duration::from_millis(100),
        retry_jitter: false,
        ..ConcurrencySettings::default()
    }
}

fn build_service(db: &Database, settings: ConcurrencySettings) -> OrderService {
    let atomic: Arc<dyn AtomicStore> = Arc::new(db.clone());
    OrderService::new(
        LockManager::new(atomic.clone()),
        IdempotencyGuard::new(atomic),
        RateLimiter::new(settings.rate_window, settings.rate_max_requests),
        Arc::new(db.clone()),
        Arc::new(db.stock_store()),
        Arc::new(db.balance_store()),
        Arc::new(db.promo_store()),
        settings.clone(),
        settings,
    )
}

fn request(sku: &str, quantity: i64) -> CreateOrderRequest {
    CreateOrderRequest {
        sku: sku.to_string(),
        quantity,
        promo_code: None,
    }
}

#[tokio::test]
async fn concurrent_orders_from_one_user_all_land() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 100_000).await;
    let service = build_service(&db, fast_settings());

    let mut tasks = Vec::new();
    for i in 0..5 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .place_order("user-1", request("SKU-1", 1), Some(format!("key-{}", i)))
                .await
        }));
    }

    for task in futures::future::join_all(tasks).await {
        let receipt = task.unwrap().unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.total_cents, 1_000);
    }

    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 5);

    let balance = db.get_balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.amount_cents, 95_000);

    let orders = db.list_orders_for_user("user-1", 50).await.unwrap();
    assert_eq!(orders.len(), 5);
}

#[tokio::test]
async fn identical_concurrent_requests_place_one_order() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 100_000).await;
    let service = build_service(&db, fast_settings());

    // No explicit key: the fingerprint is derived from the request, so
    // both submissions are the same logical order.
    let a = {
        let service = service.clone();
        tokio::spawn(async move { service.place_order("user-1", request("SKU-1", 2), None).await })
    };
    let b = {
        let service = service.clone();
        tokio::spawn(async move { service.place_order("user-1", request("SKU-1", 2), None).await })
    };

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();

    // Both callers get the same order back; one of them from the cache.
    assert_eq!(first.order_id, second.order_id);
    assert_ne!(first.replayed, second.replayed);

    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 8);

    let orders = db.list_orders_for_user("user-1", 50).await.unwrap();
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn explicit_keys_are_scoped_per_user() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-a", 100_000).await;
    seed_balance(&db, "user-b", 100_000).await;
    let service = build_service(&db, fast_settings());

    // Two users picking the same key is expected; keys are only unique
    // within one user's requests.
    let first = service
        .place_order("user-a", request("SKU-1", 1), Some("shared-key".to_string()))
        .await
        .unwrap();
    let second = service
        .place_order("user-b", request("SKU-1", 1), Some("shared-key".to_string()))
        .await
        .unwrap();

    assert_ne!(first.order_id, second.order_id);
    assert!(!first.replayed);
    assert!(!second.replayed);

    // Both orders really happened.
    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 8);
    assert_eq!(db.list_orders_for_user("user-a", 50).await.unwrap().len(), 1);
    assert_eq!(db.list_orders_for_user("user-b", 50).await.unwrap().len(), 1);

    let balance_b = db.get_balance("user-b").await.unwrap().unwrap();
    assert_eq!(balance_b.amount_cents, 99_000);
}

#[tokio::test]
async fn reused_key_with_different_payload_is_rejected() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 100_000).await;
    let service = build_service(&db, fast_settings());

    service
        .place_order("user-1", request("SKU-1", 1), Some("key-1".to_string()))
        .await
        .unwrap();

    // Same key, different quantity: neither a replay nor a new order.
    let mismatch = service
        .place_order("user-1", request("SKU-1", 3), Some("key-1".to_string()))
        .await;
    assert!(matches!(mismatch, Err(OrderFlowError::IdempotencyKeyReuse)));

    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 9);
    assert_eq!(db.list_orders_for_user("user-1", 50).await.unwrap().len(), 1);

    // The unchanged payload under the same key still replays.
    let replay = service
        .place_order("user-1", request("SKU-1", 1), Some("key-1".to_string()))
        .await
        .unwrap();
    assert!(replay.replayed);
}

#[tokio::test]
async fn insufficient_balance_rolls_back_stock() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 500).await;
    let service = build_service(&db, fast_settings());

    let result = service
        .place_order("user-1", request("SKU-1", 1), None)
        .await;
    assert!(matches!(result, Err(OrderFlowError::InsufficientBalance)));

    // The reserved stock was returned.
    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 10);

    // A retry of the same request replays the cached rejection.
    let retry = service
        .place_order("user-1", request("SKU-1", 1), None)
        .await;
    assert!(matches!(retry, Err(OrderFlowError::InsufficientBalance)));

    let orders = db.list_orders_for_user("user-1", 50).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn insufficient_stock_is_terminal() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 3).await;
    seed_balance(&db, "user-1", 100_000).await;
    let service = build_service(&db, fast_settings());

    let result = service
        .place_order("user-1", request("SKU-1", 5), None)
        .await;
    assert!(matches!(
        result,
        Err(OrderFlowError::InsufficientStock { .. })
    ));

    let balance = db.get_balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.amount_cents, 100_000);
}

#[tokio::test]
async fn promo_discounts_once_then_exhausts() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 10_000).await;
    seed_balance(&db, "user-2", 10_000).await;
    seed_promo(&db, "SAVE300", 300, 1).await;
    let service = build_service(&db, fast_settings());

    let promo_request = CreateOrderRequest {
        sku: "SKU-1".to_string(),
        quantity: 1,
        promo_code: Some("SAVE300".to_string()),
    };

    let receipt = service
        .place_order("user-1", promo_request.clone(), None)
        .await
        .unwrap();
    assert_eq!(receipt.total_cents, 700);

    let balance = db.get_balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.amount_cents, 9_300);

    // Single-use code is spent now.
    let result = service.place_order("user-2", promo_request, None).await;
    assert!(matches!(result, Err(OrderFlowError::PromoExhausted { .. })));

    let untouched = db.get_balance("user-2").await.unwrap().unwrap();
    assert_eq!(untouched.amount_cents, 10_000);

    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 9);
}

#[tokio::test]
async fn over_limit_requests_are_rejected() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 100).await;
    seed_balance(&db, "user-1", 100_000).await;
    let settings = ConcurrencySettings {
        rate_max_requests: 2,
        ..fast_settings()
    };
    let service = build_service(&db, settings);

    for i in 0..2 {
        service
            .place_order("user-1", request("SKU-1", 1), Some(format!("key-{}", i)))
            .await
            .unwrap();
    }

    let result = service
        .place_order("user-1", request("SKU-1", 1), Some("key-2".to_string()))
        .await;
    assert!(matches!(result, Err(OrderFlowError::RateLimited { .. })));

    // The rejected request changed nothing.
    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 98);
}

#[tokio::test]
async fn invalid_requests_are_rejected_up_front() {
    let db = setup_test_db().await;
    let service = build_service(&db, fast_settings());

    let zero_quantity = service
        .place_order("user-1", request("SKU-1", 0), None)
        .await;
    assert!(matches!(zero_quantity, Err(OrderFlowError::BadRequest(_))));

    let blank_sku = service.place_order("user-1", request("   ", 1), None).await;
    assert!(matches!(blank_sku, Err(OrderFlowError::BadRequest(_))));
}

#[tokio::test]
async fn cancelling_an_order_returns_its_resources() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 10_000).await;
    seed_promo(&db, "SAVE300", 300, 1).await;
    let service = build_service(&db, fast_settings());

    let promo_request = CreateOrderRequest {
        sku: "SKU-1".to_string(),
        quantity: 2,
        promo_code: Some("SAVE300".to_string()),
    };
    let receipt = service
        .place_order("user-1", promo_request, None)
        .await
        .unwrap();
    assert_eq!(receipt.total_cents, 1_700);

    let cancelled = service
        .cancel_order("user-1", &receipt.order_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, oxicart::models::OrderStatus::Cancelled);

    // Stock, balance and the promo use all came back.
    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 10);
    let balance = db.get_balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.amount_cents, 10_000);
    let promo = db.get_promo("SAVE300").await.unwrap().unwrap();
    assert_eq!(promo.remaining_uses, 1);

    // The stored row reflects the transition.
    let stored = db.get_order(&receipt.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, oxicart::models::OrderStatus::Cancelled);

    // A second cancel must not refund again.
    let again = service.cancel_order("user-1", &receipt.order_id).await;
    assert!(matches!(again, Err(OrderFlowError::BadRequest(_))));
    let balance = db.get_balance("user-1").await.unwrap().unwrap();
    assert_eq!(balance.amount_cents, 10_000);
}

#[tokio::test]
async fn cancelling_another_users_order_is_not_found() {
    let db = setup_test_db().await;
    seed_product(&db, "SKU-1", 1_000, 10).await;
    seed_balance(&db, "user-1", 10_000).await;
    let service = build_service(&db, fast_settings());

    let receipt = service
        .place_order("user-1", request("SKU-1", 1), None)
        .await
        .unwrap();

    let result = service.cancel_order("user-2", &receipt.order_id).await;
    assert!(matches!(result, Err(OrderFlowError::NotFound(_))));

    // Nothing was refunded.
    let stock = db.get_stock("SKU-1").await.unwrap().unwrap();
    assert_eq!(stock.quantity, 9);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let db = setup_test_db().await;
    seed_balance(&db, "user-1", 100_000).await;
    let service = build_service(&db, fast_settings());

    let result = service
        .place_order("user-1", request("GHOST", 1), None)
        .await;
    assert!(matches!(result, Err(OrderFlowError::NotFound(_))));
}
