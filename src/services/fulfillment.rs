use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, EntityTrait, QueryFilter, Statement, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    fulfillment_assignment::{self, AssignmentRole, Entity as AssignmentEntity},
    fulfillment_audit_log,
    fulfillment_document::{self, DocumentType},
    fulfillment_line_item::{self, Entity as LineItemEntity},
    fulfillment_order::{self, Entity as OrderEntity, FulfillmentOrderStatus},
    user::Entity as UserEntity,
};
use crate::errors::{retry_transient, ServiceError};
use crate::events::{Event, EventSender};
use crate::object_store::ObjectStore;

/// Split sums are compared against the line total within this tolerance.
fn qty_epsilon() -> Decimal {
    Decimal::new(1, 6)
}

/// Per-order outcome of a bulk assignment call.
#[derive(Debug, Clone)]
pub struct BulkAssignOutcome {
    pub fulfillment_order_id: Uuid,
    pub assigned: usize,
    pub error: Option<String>,
}

/// Lifecycle service for fulfillment orders: line-item splitting, picking,
/// assignment, manufacturer fulfillment, shipment linking, backorder
/// cancellation, and document ingestion.
#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DatabaseConnection>,
    store: Arc<dyn ObjectStore>,
    event_sender: Option<EventSender>,
    max_document_bytes: u64,
    upload_deadline: Duration,
}

impl FulfillmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        store: Arc<dyn ObjectStore>,
        event_sender: Option<EventSender>,
        max_document_bytes: u64,
        upload_deadline: Duration,
    ) -> Self {
        Self {
            db,
            store,
            event_sender,
            max_document_bytes,
            upload_deadline,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event).await;
        }
    }

    /// Serialises mutations on one order. Postgres takes a row lock; the
    /// sqlite backend already serialises writing transactions.
    async fn lock_order(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        if txn.get_database_backend() == DbBackend::Postgres {
            txn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT id FROM fulfillment_orders WHERE id = $1 FOR UPDATE",
                [order_id.into()],
            ))
            .await
            .map_err(ServiceError::db_error)?;
        }
        Ok(())
    }

    async fn find_order(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<fulfillment_order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("fulfillment order {order_id} not found")))
    }

    async fn find_line_item(
        &self,
        txn: &DatabaseTransaction,
        line_item_id: Uuid,
    ) -> Result<fulfillment_line_item::Model, ServiceError> {
        LineItemEntity::find_by_id(line_item_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("line item {line_item_id} not found")))
    }

    /// Reads a line item under its order's row lock. The first read only
    /// resolves the order id; it may be concurrent with another writer, so
    /// the item is re-read once the lock is held and all checks run against
    /// the post-lock state.
    async fn find_line_item_locked(
        &self,
        txn: &DatabaseTransaction,
        line_item_id: Uuid,
    ) -> Result<fulfillment_line_item::Model, ServiceError> {
        let item = self.find_line_item(txn, line_item_id).await?;
        self.lock_order(txn, item.fulfillment_order_id).await?;
        self.find_line_item(txn, line_item_id).await
    }

    fn require_open(&self, order: &fulfillment_order::Model) -> Result<(), ServiceError> {
        let status = order.status().map_err(ServiceError::db_error)?;
        if status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "fulfillment order {} is {}",
                order.id, order.status
            )));
        }
        Ok(())
    }

    async fn audit(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        line_item_id: Option<Uuid>,
        action: &str,
        detail: Option<String>,
    ) -> Result<(), ServiceError> {
        fulfillment_audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            fulfillment_order_id: Set(order_id),
            line_item_id: Set(line_item_id),
            action: Set(action.to_string()),
            detail: Set(detail),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(())
    }

    /// Recomputes the order status from its line items inside the current
    /// transaction. Returns (old, new) when the status changed.
    async fn refresh_order_status(
        &self,
        txn: &DatabaseTransaction,
        order: fulfillment_order::Model,
    ) -> Result<Option<(String, String)>, ServiceError> {
        let current = order.status().map_err(ServiceError::db_error)?;
        if current.is_terminal() {
            return Ok(None);
        }

        let items = LineItemEntity::find()
            .filter(fulfillment_line_item::Column::FulfillmentOrderId.eq(order.id))
            .all(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let next = if items.is_empty() {
            current
        } else if items.iter().all(|i| i.cancelled) {
            FulfillmentOrderStatus::Cancelled
        } else if items.iter().all(|i| i.fully_fulfilled()) {
            FulfillmentOrderStatus::Completed
        } else if items.iter().any(|i| i.fully_fulfilled() || i.cancelled) {
            FulfillmentOrderStatus::PartiallyFulfilled
        } else if items
            .iter()
            .any(|i| i.picked_qty > Decimal::ZERO || i.manufacturer_fulfilled)
        {
            FulfillmentOrderStatus::InProgress
        } else {
            current
        };

        if next == current {
            return Ok(None);
        }

        let old = order.status.clone();
        let mut active: fulfillment_order::ActiveModel = order.into();
        active.status = Set(next.to_string());
        active.updated_at = Set(Utc::now());
        active.update(txn).await.map_err(ServiceError::db_error)?;
        Ok(Some((old, next.to_string())))
    }

    async fn emit_status_change(&self, order_id: Uuid, change: Option<(String, String)>) {
        if let Some((old_status, new_status)) = change {
            info!(%order_id, %old_status, %new_status, "fulfillment order status changed");
            self.emit(Event::OrderStatusChanged {
                fulfillment_order_id: order_id,
                old_status,
                new_status,
            })
            .await;
        }
    }

    /// Splits a line item between the warehouse-picked and the
    /// manufacturer-shipped channels. Zero on one side routes the whole
    /// item through the other channel.
    #[instrument(skip(self))]
    pub async fn split_line_item(
        &self,
        line_item_id: Uuid,
        warehouse_qty: Decimal,
        manufacturer_qty: Decimal,
    ) -> Result<fulfillment_line_item::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let item = self.find_line_item_locked(&txn, line_item_id).await?;

        if item.shipped {
            return Err(ServiceError::Conflict(format!(
                "line item {line_item_id} has already shipped"
            )));
        }
        if item.cancelled {
            return Err(ServiceError::Conflict(format!(
                "line item {line_item_id} is cancelled"
            )));
        }
        if warehouse_qty < Decimal::ZERO || manufacturer_qty < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "invalid split: quantities must be non-negative".into(),
            ));
        }
        if (warehouse_qty + manufacturer_qty - item.total_qty).abs() > qty_epsilon() {
            return Err(ServiceError::ValidationError(format!(
                "invalid split: {warehouse_qty} + {manufacturer_qty} does not equal total {}",
                item.total_qty
            )));
        }
        if item.picked_qty > warehouse_qty {
            return Err(ServiceError::Conflict(format!(
                "line item {line_item_id} already has {} picked",
                item.picked_qty
            )));
        }

        let order_id = item.fulfillment_order_id;
        let mut active: fulfillment_line_item::ActiveModel = item.into();
        active.warehouse_qty = Set(warehouse_qty);
        active.manufacturer_qty = Set(manufacturer_qty);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(%line_item_id, %order_id, %warehouse_qty, %manufacturer_qty, "line item split");
        self.emit(Event::LineItemSplit {
            line_item_id,
            warehouse_qty,
            manufacturer_qty,
        })
        .await;
        Ok(updated)
    }

    /// Records picked quantity for the warehouse portion. Reaching the full
    /// warehouse quantity makes the item eligible for ship-out.
    #[instrument(skip(self, notes))]
    pub async fn update_picked_quantity(
        &self,
        line_item_id: Uuid,
        quantity: Decimal,
        notes: Option<String>,
    ) -> Result<fulfillment_line_item::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let item = self.find_line_item_locked(&txn, line_item_id).await?;

        if quantity < Decimal::ZERO || quantity > item.warehouse_qty {
            return Err(ServiceError::ValidationError(format!(
                "picked quantity {quantity} out of range 0..={}",
                item.warehouse_qty
            )));
        }

        let order_id = item.fulfillment_order_id;
        let warehouse_qty = item.warehouse_qty;
        let mut active: fulfillment_line_item::ActiveModel = item.into();
        active.picked_qty = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        if let Some(text) = notes {
            self.audit(&txn, order_id, Some(line_item_id), "pick_note", Some(text))
                .await?;
        }

        let order = self.find_order(&txn, order_id).await?;
        let change = self.refresh_order_status(&txn, order).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        let ready_to_ship = quantity == warehouse_qty;
        self.emit(Event::PickedQuantityUpdated {
            line_item_id,
            picked_qty: quantity,
            ready_to_ship,
        })
        .await;
        self.emit_status_change(order_id, change).await;
        Ok(updated)
    }

    async fn assign_in_txn(
        &self,
        txn: &DatabaseTransaction,
        order: &fulfillment_order::Model,
        user_id: Uuid,
        role: AssignmentRole,
    ) -> Result<bool, ServiceError> {
        self.require_open(order)?;

        let user = UserEntity::find_by_id(user_id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id} not found")))?;
        if !user.visible {
            return Err(ServiceError::ValidationError(format!(
                "user {user_id} is hidden and cannot be assigned"
            )));
        }

        let existing = AssignmentEntity::find()
            .filter(fulfillment_assignment::Column::FulfillmentOrderId.eq(order.id))
            .filter(fulfillment_assignment::Column::UserId.eq(user_id))
            .filter(fulfillment_assignment::Column::Role.eq(role.to_string()))
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?;
        if existing.is_some() {
            return Ok(false);
        }

        fulfillment_assignment::ActiveModel {
            id: Set(Uuid::new_v4()),
            fulfillment_order_id: Set(order.id),
            user_id: Set(user_id),
            role: Set(role.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(txn)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(true)
    }

    /// Upserts an (order, user, role) assignment. Idempotent.
    #[instrument(skip(self))]
    pub async fn add_assignment(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        role: AssignmentRole,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.lock_order(&txn, order_id).await?;
        let order = self.find_order(&txn, order_id).await?;

        let inserted = self.assign_in_txn(&txn, &order, user_id, role).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if inserted {
            self.emit(Event::AssignmentAdded {
                fulfillment_order_id: order_id,
                user_id,
                role: role.to_string(),
            })
            .await;
        }
        Ok(())
    }

    /// Assigns managers and workers across several orders. Orders are
    /// processed in ascending id order to keep lock acquisition ordered;
    /// each order is all-or-nothing, and outcomes are reported per order.
    /// User ids are deduplicated within a role; cross-role duplicates are
    /// allowed.
    #[instrument(skip(self))]
    pub async fn bulk_assign(
        &self,
        order_ids: Vec<Uuid>,
        manager_ids: Vec<Uuid>,
        worker_ids: Vec<Uuid>,
    ) -> Result<Vec<BulkAssignOutcome>, ServiceError> {
        let orders: BTreeSet<Uuid> = order_ids.into_iter().collect();
        let managers: BTreeSet<Uuid> = manager_ids.into_iter().collect();
        let workers: BTreeSet<Uuid> = worker_ids.into_iter().collect();

        let mut outcomes = Vec::with_capacity(orders.len());
        for order_id in orders {
            let outcome = self
                .bulk_assign_one(order_id, &managers, &workers)
                .await
                .map_or_else(
                    |err| BulkAssignOutcome {
                        fulfillment_order_id: order_id,
                        assigned: 0,
                        error: Some(err.to_string()),
                    },
                    |assigned| BulkAssignOutcome {
                        fulfillment_order_id: order_id,
                        assigned,
                        error: None,
                    },
                );
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn bulk_assign_one(
        &self,
        order_id: Uuid,
        managers: &BTreeSet<Uuid>,
        workers: &BTreeSet<Uuid>,
    ) -> Result<usize, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.lock_order(&txn, order_id).await?;
        let order = self.find_order(&txn, order_id).await?;

        let mut assigned = 0;
        for user_id in managers {
            if self
                .assign_in_txn(&txn, &order, *user_id, AssignmentRole::Manager)
                .await?
            {
                assigned += 1;
            }
        }
        for user_id in workers {
            if self
                .assign_in_txn(&txn, &order, *user_id, AssignmentRole::Worker)
                .await?
            {
                assigned += 1;
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(assigned)
    }

    /// Flags line items as shipped by the factory. Items with no
    /// manufacturer quantity are skipped, not rejected.
    #[instrument(skip(self))]
    pub async fn mark_manufacturer_fulfilled(
        &self,
        order_id: Uuid,
        line_item_ids: Vec<Uuid>,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.lock_order(&txn, order_id).await?;
        let order = self.find_order(&txn, order_id).await?;
        self.require_open(&order)?;

        let mut marked = Vec::new();
        for line_item_id in line_item_ids {
            let item = self.find_line_item(&txn, line_item_id).await?;
            if item.fulfillment_order_id != order_id {
                return Err(ServiceError::ValidationError(format!(
                    "line item {line_item_id} does not belong to order {order_id}"
                )));
            }
            if item.manufacturer_qty.is_zero() || item.manufacturer_fulfilled {
                continue;
            }
            let mut active: fulfillment_line_item::ActiveModel = item.into();
            active.manufacturer_fulfilled = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;
            marked.push(line_item_id);
        }

        let change = self.refresh_order_status(&txn, order).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if !marked.is_empty() {
            self.emit(Event::ManufacturerFulfilled {
                fulfillment_order_id: order_id,
                line_item_ids: marked,
            })
            .await;
        }
        self.emit_status_change(order_id, change).await;
        Ok(())
    }

    /// Associates a shipment request with the named line items. A line
    /// already linked to a different request is a conflict.
    #[instrument(skip(self))]
    pub async fn link_shipment_request(
        &self,
        order_id: Uuid,
        line_item_ids: Vec<Uuid>,
        shipment_request_id: Uuid,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.lock_order(&txn, order_id).await?;
        self.find_order(&txn, order_id).await?;

        for line_item_id in line_item_ids {
            let item = self.find_line_item(&txn, line_item_id).await?;
            if item.fulfillment_order_id != order_id {
                return Err(ServiceError::ValidationError(format!(
                    "line item {line_item_id} does not belong to order {order_id}"
                )));
            }
            match item.shipment_request_id {
                Some(existing) if existing != shipment_request_id => {
                    return Err(ServiceError::Conflict(format!(
                        "line item {line_item_id} is already linked to shipment request {existing}"
                    )));
                }
                Some(_) => continue,
                None => {
                    let mut active: fulfillment_line_item::ActiveModel = item.into();
                    active.shipment_request_id = Set(Some(shipment_request_id));
                    active.updated_at = Set(Utc::now());
                    active.update(&txn).await.map_err(ServiceError::db_error)?;
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        self.emit(Event::ShipmentRequestLinked {
            fulfillment_order_id: order_id,
            shipment_request_id,
        })
        .await;
        Ok(())
    }

    /// Cancels the outstanding (unpicked, unfulfilled) portion of the named
    /// line items, keeping what was already picked, then re-evaluates the
    /// order for completion or cancellation.
    #[instrument(skip(self, reason))]
    pub async fn cancel_backorder(
        &self,
        order_id: Uuid,
        line_item_ids: Vec<Uuid>,
        reason: String,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        self.lock_order(&txn, order_id).await?;
        let order = self.find_order(&txn, order_id).await?;
        self.require_open(&order)?;

        let mut cancelled = Vec::new();
        for line_item_id in line_item_ids {
            let item = self.find_line_item(&txn, line_item_id).await?;
            if item.fulfillment_order_id != order_id {
                return Err(ServiceError::ValidationError(format!(
                    "line item {line_item_id} does not belong to order {order_id}"
                )));
            }

            let outstanding_warehouse = item.warehouse_qty - item.picked_qty;
            let outstanding_manufacturer = if item.manufacturer_fulfilled {
                Decimal::ZERO
            } else {
                item.manufacturer_qty
            };
            if outstanding_warehouse <= Decimal::ZERO
                && outstanding_manufacturer <= Decimal::ZERO
            {
                return Err(ServiceError::ValidationError(format!(
                    "line item {line_item_id} has no outstanding quantity"
                )));
            }

            let kept_warehouse = item.picked_qty;
            let kept_manufacturer = item.manufacturer_qty - outstanding_manufacturer;
            let mut active: fulfillment_line_item::ActiveModel = item.into();
            active.warehouse_qty = Set(kept_warehouse);
            active.manufacturer_qty = Set(kept_manufacturer);
            active.total_qty = Set(kept_warehouse + kept_manufacturer);
            active.cancelled = Set(true);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await.map_err(ServiceError::db_error)?;

            self.audit(
                &txn,
                order_id,
                Some(line_item_id),
                "backorder_cancelled",
                Some(reason.clone()),
            )
            .await?;
            cancelled.push(line_item_id);
        }

        let change = self.refresh_order_status(&txn, order).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.emit(Event::BackorderCancelled {
            fulfillment_order_id: order_id,
            line_item_ids: cancelled,
            reason,
        })
        .await;
        self.emit_status_change(order_id, change).await;
        Ok(())
    }

    /// Streams a document to the object store under the deterministic key
    /// `{order_id}/{document_type}/{uuid}.{ext}` and records the blob
    /// reference. Transient storage failures are retried with backoff; the
    /// upload carries its own deadline.
    #[instrument(skip(self, data, notes))]
    pub async fn upload_document(
        &self,
        order_id: Uuid,
        document_type: DocumentType,
        file_name: &str,
        data: Bytes,
        notes: Option<String>,
    ) -> Result<fulfillment_document::Model, ServiceError> {
        let size = data.len() as u64;
        if size > self.max_document_bytes {
            return Err(ServiceError::DocumentTooLarge {
                size,
                limit: self.max_document_bytes,
            });
        }

        // Existence check before touching storage.
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("fulfillment order {order_id} not found"))
            })?;

        let ext = file_name.rsplit('.').next().filter(|e| !e.is_empty() && *e != file_name);
        let key = format!(
            "{order_id}/{document_type}/{}.{}",
            Uuid::new_v4(),
            ext.unwrap_or("bin")
        );

        let store = self.store.clone();
        let deadline = self.upload_deadline;
        let etag = retry_transient(|| {
            let store = store.clone();
            let key = key.clone();
            let data = data.clone();
            async move {
                tokio::time::timeout(deadline, store.put(&key, data))
                    .await
                    .map_err(|_| {
                        ServiceError::DeadlineExceeded(format!("upload of {key} timed out"))
                    })?
            }
        })
        .await?;

        let inserted = fulfillment_document::ActiveModel {
            id: Set(Uuid::new_v4()),
            fulfillment_order_id: Set(order_id),
            document_type: Set(document_type.to_string()),
            storage_key: Set(key.clone()),
            etag: Set(Some(etag)),
            notes: Set(notes),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error);

        // The blob landed before the row; remove it rather than orphan it
        // when the insert fails.
        let document = match inserted {
            Ok(document) => document,
            Err(err) => {
                if let Err(cleanup) = self.store.delete(&key).await {
                    warn!(%key, "failed to remove blob for failed insert: {cleanup}");
                }
                return Err(err);
            }
        };

        info!(%order_id, %key, "document uploaded");
        self.emit(Event::DocumentUploaded {
            fulfillment_order_id: order_id,
            document_id: document.id,
            storage_key: key,
        })
        .await;
        Ok(document)
    }

    /// Fetches an order with its line items.
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(fulfillment_order::Model, Vec<fulfillment_line_item::Model>), ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("fulfillment order {order_id} not found"))
            })?;
        let items = LineItemEntity::find()
            .filter(fulfillment_line_item::Column::FulfillmentOrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((order, items))
    }

    /// Lists assignments for an order.
    pub async fn list_assignments(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<fulfillment_assignment::Model>, ServiceError> {
        AssignmentEntity::find()
            .filter(fulfillment_assignment::Column::FulfillmentOrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
