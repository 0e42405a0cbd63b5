#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectOptions, Database, DatabaseConnection};
use tokio::sync::mpsc;
use uuid::Uuid;

use opsline_api::{
    entities::{fulfillment_line_item, fulfillment_order, note, user},
    events::{Event, EventSender},
    migrate,
    object_store::{InMemoryObjectStore, ObjectStore},
    services::{directory::DirectoryService, fulfillment::FulfillmentService},
};

pub const TEST_DOCUMENT_LIMIT: u64 = 1024 * 1024;

/// Harness around an in-memory sqlite database with the full revision
/// graph applied.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub store: Arc<InMemoryObjectStore>,
    pub fulfillment: FulfillmentService,
    pub directory: DirectoryService,
    pub events: EventSender,
    _event_rx: mpsc::Receiver<Event>,
}

impl TestContext {
    pub async fn new() -> Self {
        let db = Arc::new(connect_memory().await);
        migrate::run_migrations(&db)
            .await
            .expect("failed to apply schema revisions");

        let store = Arc::new(InMemoryObjectStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let (tx, rx) = mpsc::channel(256);
        let events = EventSender::new(tx);

        let fulfillment = FulfillmentService::new(
            db.clone(),
            store_dyn,
            Some(events.clone()),
            TEST_DOCUMENT_LIMIT,
            Duration::from_secs(5),
        );
        let directory = DirectoryService::new(db.clone());

        Self {
            db,
            store,
            fulfillment,
            directory,
            events,
            _event_rx: rx,
        }
    }
}

/// A single shared connection keeps the in-memory database alive and
/// consistent across the test.
pub async fn connect_memory() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    Database::connect(opts)
        .await
        .expect("failed to open in-memory database")
}

pub fn dec(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

pub async fn seed_user(db: &DatabaseConnection, name: &str, visible: bool) -> user::Model {
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        visible: Set(visible),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed user")
}

pub async fn seed_order(db: &DatabaseConnection) -> fulfillment_order::Model {
    seed_order_with_status(db, "open").await
}

pub async fn seed_order_with_status(
    db: &DatabaseConnection,
    status: &str,
) -> fulfillment_order::Model {
    fulfillment_order::ActiveModel {
        id: Set(Uuid::new_v4()),
        sales_order_id: Set(Uuid::new_v4()),
        status: Set(status.to_string()),
        freight_class: Set(None),
        service_type: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed fulfillment order")
}

/// Seeds a line item routed entirely through the warehouse.
pub async fn seed_line_item(
    db: &DatabaseConnection,
    order_id: Uuid,
    total: Decimal,
) -> fulfillment_line_item::Model {
    seed_split_line_item(db, order_id, total, total, Decimal::ZERO).await
}

pub async fn seed_split_line_item(
    db: &DatabaseConnection,
    order_id: Uuid,
    total: Decimal,
    warehouse: Decimal,
    manufacturer: Decimal,
) -> fulfillment_line_item::Model {
    fulfillment_line_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        fulfillment_order_id: Set(order_id),
        product_id: Set(Uuid::new_v4()),
        total_qty: Set(total),
        warehouse_qty: Set(warehouse),
        manufacturer_qty: Set(manufacturer),
        picked_qty: Set(Decimal::ZERO),
        manufacturer_fulfilled: Set(false),
        cancelled: Set(false),
        shipped: Set(false),
        shipment_request_id: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed line item")
}

pub async fn seed_note(
    db: &DatabaseConnection,
    author_id: Uuid,
    body: &str,
    is_public: bool,
) -> note::Model {
    note::ActiveModel {
        id: Set(Uuid::new_v4()),
        author_id: Set(author_id),
        body: Set(body.to_string()),
        is_public: Set(is_public),
        custom_prompt: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("failed to seed note")
}
