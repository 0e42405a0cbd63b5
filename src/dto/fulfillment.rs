//! Input shapes for the fulfillment API. One canonical definition per
//! shape; quantities travel as strings and deserialize into `Decimal`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::fulfillment_assignment::AssignmentRole;
use crate::entities::fulfillment_document::DocumentType;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SplitLineItemInput {
    pub line_item_id: Uuid,
    pub warehouse_qty: Decimal,
    pub manufacturer_qty: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdatePickedQuantityInput {
    pub line_item_id: Uuid,
    pub quantity: Decimal,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddAssignmentInput {
    pub fulfillment_order_id: Uuid,
    pub user_id: Uuid,
    pub role: AssignmentRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkAssignmentInput {
    #[validate(length(min = 1))]
    pub fulfillment_order_ids: Vec<Uuid>,
    #[serde(default)]
    pub manager_ids: Vec<Uuid>,
    #[serde(default)]
    pub worker_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarkManufacturerFulfilledInput {
    pub fulfillment_order_id: Uuid,
    #[validate(length(min = 1))]
    pub line_item_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LinkShipmentRequestInput {
    pub fulfillment_order_id: Uuid,
    #[validate(length(min = 1))]
    pub line_item_ids: Vec<Uuid>,
    pub shipment_request_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelBackorderInput {
    pub fulfillment_order_id: Uuid,
    #[validate(length(min = 1))]
    pub line_item_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

/// Metadata accompanying a document upload; the payload arrives as the
/// request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadDocumentQuery {
    pub document_type: DocumentType,
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}
