use oxicart::database::Database;
use oxicart::models::{Product, PromoCode};
use uuid::Uuid;

pub async fn setup_test_db() -> Database {
    // Install drivers for AnyPool (required for tests)
    sqlx::any::install_default_drivers();

    // Use file-based SQLite for tests (unique UUID per test for parallel execution)
    let temp_file = format!("test_{}.db", Uuid::new_v4());
    let db_url = format!("sqlite://{}?mode=rwc", temp_file);

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");

    setup_schema(&db).await;

    db
}

async fn setup_schema(db: &Database) {
    let pool = db.pool();

    sqlx::query(
        "CREATE TABLE products (
            id TEXT PRIMARY KEY,
            sku TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create products table");

    sqlx::query(
        "CREATE TABLE stock_levels (
            sku TEXT PRIMARY KEY,
            quantity INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create stock_levels table");

    sqlx::query(
        "CREATE TABLE balances (
            user_id TEXT PRIMARY KEY,
            amount_cents INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create balances table");

    sqlx::query(
        "CREATE TABLE promo_codes (
            code TEXT PRIMARY KEY,
            discount_cents INTEGER NOT NULL,
            remaining_uses INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create promo_codes table");

    sqlx::query(
        "CREATE TABLE orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            sku TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            unit_price_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            total_cents INTEGER NOT NULL,
            promo_code TEXT,
            status TEXT NOT NULL DEFAULT 'placed',
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create orders table");

    sqlx::query("CREATE INDEX idx_orders_user_id ON orders(user_id)")
        .execute(pool)
        .await
        .ok();

    sqlx::query(
        "CREATE TABLE atomic_records (
            record_key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("Failed to create atomic_records table");
}

pub async fn seed_product(db: &Database, sku: &str, price_cents: i64, stock: i64) -> Product {
    let product = Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        price_cents,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    db.create_product(&product).await.unwrap();
    db.set_stock(sku, stock).await.unwrap();
    product
}

pub async fn seed_balance(db: &Database, user_id: &str, amount_cents: i64) {
    db.set_balance(user_id, amount_cents).await.unwrap();
}

pub async fn seed_promo(db: &Database, code: &str, discount_cents: i64, remaining_uses: i64) {
    db.create_promo(&PromoCode {
        code: code.to_string(),
        discount_cents,
        remaining_uses,
        version: 1,
    })
    .await
    .unwrap();
}
