//! opsline-api
//!
//! Backend services for CRM and warehouse fulfillment operations: the
//! fulfillment-order lifecycle, a branchable schema-revision engine, and
//! request-scoped resource management behind a thin HTTP facade.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrate;
pub mod object_store;
pub mod scope;
pub mod services;

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::Serialize;
use serde_json::{json, Value};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub fulfillment: services::fulfillment::FulfillmentService,
    pub directory: services::directory::DirectoryService,
    pub scopes: scope::ScopeFactory,
}

/// Common success envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Liveness plus a database round trip.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
        .is_ok();

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Builds the full application router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "opsline-api up" }))
        .route("/health", get(health))
        .nest("/api/v1", handlers::api_v1_routes())
        .with_state(state)
}
