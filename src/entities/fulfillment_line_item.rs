use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single product line on a fulfillment order. After a split,
/// `warehouse_qty + manufacturer_qty` equals `total_qty`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fulfillment_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub fulfillment_order_id: Uuid,
    pub product_id: Uuid,
    pub total_qty: Decimal,
    pub warehouse_qty: Decimal,
    pub manufacturer_qty: Decimal,
    pub picked_qty: Decimal,
    pub manufacturer_fulfilled: bool,
    pub cancelled: bool,
    pub shipped: bool,
    pub shipment_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Warehouse portion fully picked (or nothing routed through the warehouse).
    pub fn warehouse_done(&self) -> bool {
        self.picked_qty >= self.warehouse_qty
    }

    /// Manufacturer portion shipped (or nothing routed through the factory).
    pub fn manufacturer_done(&self) -> bool {
        self.manufacturer_qty.is_zero() || self.manufacturer_fulfilled
    }

    /// Fully fulfilled through both channels, or cancelled outright.
    pub fn fully_fulfilled(&self) -> bool {
        self.cancelled || (self.warehouse_done() && self.manufacturer_done())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fulfillment_order::Entity",
        from = "Column::FulfillmentOrderId",
        to = "super::fulfillment_order::Column::Id"
    )]
    FulfillmentOrder,
}

impl Related<super::fulfillment_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FulfillmentOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
