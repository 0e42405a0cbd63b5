pub mod fulfillment;

use axum::Router;

use crate::AppState;

/// All v1 routes.
pub fn api_v1_routes() -> Router<AppState> {
    fulfillment::routes()
}
