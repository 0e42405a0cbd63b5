use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle states of a fulfillment order. Stored as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentOrderStatus {
    Open,
    InProgress,
    PartiallyFulfilled,
    Completed,
    Cancelled,
}

impl FulfillmentOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fulfillment_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub sales_order_id: Uuid,
    pub status: String,
    /// NMFC-style shipment handling code
    pub freight_class: Option<String>,
    /// Free-text shipping service tier
    pub service_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn status(&self) -> Result<FulfillmentOrderStatus, DbErr> {
        self.status
            .parse()
            .map_err(|_| DbErr::Custom(format!("unknown fulfillment order status: {}", self.status)))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::fulfillment_line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::fulfillment_assignment::Entity")]
    Assignments,
    #[sea_orm(has_many = "super::fulfillment_document::Entity")]
    Documents,
}

impl Related<super::fulfillment_line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::fulfillment_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl Related<super::fulfillment_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
