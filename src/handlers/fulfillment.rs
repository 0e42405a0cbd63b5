use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::dto::fulfillment::{
    AddAssignmentInput, BulkAssignmentInput, CancelBackorderInput, LinkShipmentRequestInput,
    MarkManufacturerFulfilledInput, SplitLineItemInput, UpdatePickedQuantityInput,
    UploadDocumentQuery,
};
use crate::errors::ServiceError;
use crate::scope::with_scope;
use crate::{ApiResponse, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/line-items/split", post(split_line_item))
        .route("/line-items/picked-quantity", post(update_picked_quantity))
        .route("/assignments", post(add_assignment))
        .route("/assignments/bulk", post(bulk_assign))
        .route("/manufacturer-fulfillment", post(mark_manufacturer_fulfilled))
        .route("/shipment-requests/link", post(link_shipment_request))
        .route("/backorders/cancel", post(cancel_backorder))
        .route("/fulfillment-orders/:id", get(get_order))
        .route("/fulfillment-orders/:id/documents", put(upload_document))
        .route("/fulfillment-orders/:id/assignments", get(list_assignments))
        .route("/users/assignable", get(list_assignable_users))
}

async fn split_line_item(
    State(state): State<AppState>,
    Json(input): Json<SplitLineItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    let item = state
        .fulfillment
        .split_line_item(input.line_item_id, input.warehouse_qty, input.manufacturer_qty)
        .await?;
    Ok(Json(ApiResponse::ok(item)))
}

async fn update_picked_quantity(
    State(state): State<AppState>,
    Json(input): Json<UpdatePickedQuantityInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    let item = state
        .fulfillment
        .update_picked_quantity(input.line_item_id, input.quantity, input.notes)
        .await?;
    Ok(Json(ApiResponse::ok(item)))
}

async fn add_assignment(
    State(state): State<AppState>,
    Json(input): Json<AddAssignmentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    state
        .fulfillment
        .add_assignment(input.fulfillment_order_id, input.user_id, input.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_assign(
    State(state): State<AppState>,
    Json(input): Json<BulkAssignmentInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    let outcomes = state
        .fulfillment
        .bulk_assign(input.fulfillment_order_ids, input.manager_ids, input.worker_ids)
        .await?;

    #[derive(Serialize)]
    struct Outcome {
        fulfillment_order_id: Uuid,
        assigned: usize,
        error: Option<String>,
    }
    let body: Vec<Outcome> = outcomes
        .into_iter()
        .map(|o| Outcome {
            fulfillment_order_id: o.fulfillment_order_id,
            assigned: o.assigned,
            error: o.error,
        })
        .collect();
    Ok(Json(ApiResponse::ok(body)))
}

async fn mark_manufacturer_fulfilled(
    State(state): State<AppState>,
    Json(input): Json<MarkManufacturerFulfilledInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    state
        .fulfillment
        .mark_manufacturer_fulfilled(input.fulfillment_order_id, input.line_item_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn link_shipment_request(
    State(state): State<AppState>,
    Json(input): Json<LinkShipmentRequestInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    state
        .fulfillment
        .link_shipment_request(
            input.fulfillment_order_id,
            input.line_item_ids,
            input.shipment_request_id,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_backorder(
    State(state): State<AppState>,
    Json(input): Json<CancelBackorderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    input.validate()?;
    state
        .fulfillment
        .cancel_backorder(input.fulfillment_order_id, input.line_item_ids, input.reason)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, items) = state.fulfillment.get_order(id).await?;

    #[derive(Serialize)]
    struct OrderWithItems {
        order: crate::entities::fulfillment_order::Model,
        line_items: Vec<crate::entities::fulfillment_line_item::Model>,
    }
    Ok(Json(ApiResponse::ok(OrderWithItems {
        order,
        line_items: items,
    })))
}

/// Document payload arrives as the raw request body; metadata in the query.
async fn upload_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(meta): Query<UploadDocumentQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    meta.validate()?;
    let document = state
        .fulfillment
        .upload_document(id, meta.document_type, &meta.file_name, body, meta.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(document))))
}

/// Assignments enriched with user names through the request-scoped loader;
/// the scope is torn down whether or not the lookup succeeds.
async fn list_assignments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (resources, scope) = state.scopes.request_scope();

    #[derive(Serialize)]
    struct AssignmentView {
        user_id: Uuid,
        user_name: Option<String>,
        role: String,
    }

    let views = with_scope(scope, async {
        let assignments = state.fulfillment.list_assignments(id).await?;
        let mut views = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let user = resources.loaders.user(assignment.user_id).await?;
            views.push(AssignmentView {
                user_id: assignment.user_id,
                user_name: user.map(|u| u.name),
                role: assignment.role,
            });
        }
        Ok(views)
    })
    .await?;

    Ok(Json(ApiResponse::ok(views)))
}

async fn list_assignable_users(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let users = state.directory.list_assignable_users().await?;
    Ok(Json(ApiResponse::ok(users)))
}
