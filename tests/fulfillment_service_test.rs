mod common;

use bytes::Bytes;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::{
    dec as whole, seed_line_item, seed_order, seed_order_with_status, seed_split_line_item,
    seed_user, TestContext,
};
use opsline_api::{
    entities::{
        fulfillment_assignment::{self, AssignmentRole, Entity as Assignments},
        fulfillment_audit_log::{self, Entity as AuditLog},
        fulfillment_document::{DocumentType, Entity as Documents},
        fulfillment_line_item::Entity as LineItems,
        fulfillment_order::Entity as Orders,
    },
    errors::ServiceError,
    object_store::ObjectStore,
};

#[tokio::test]
async fn split_pick_and_manufacturer_mark_completes_order() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    let split = ctx
        .fulfillment
        .split_line_item(item.id, dec!(6), dec!(4))
        .await
        .unwrap();
    assert_eq!(split.warehouse_qty + split.manufacturer_qty, split.total_qty);

    ctx.fulfillment
        .update_picked_quantity(item.id, dec!(6), None)
        .await
        .unwrap();

    ctx.fulfillment
        .mark_manufacturer_fulfilled(order.id, vec![item.id])
        .await
        .unwrap();

    let (order, items) = ctx.fulfillment.get_order(order.id).await.unwrap();
    assert_eq!(order.status, "completed");
    assert!(items.iter().all(|i| i.fully_fulfilled()));
}

#[tokio::test]
async fn invalid_split_leaves_state_unchanged() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    let err = ctx
        .fulfillment
        .split_line_item(item.id, dec!(5), dec!(4))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let unchanged = LineItems::find_by_id(item.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.warehouse_qty, whole(10));
    assert_eq!(unchanged.manufacturer_qty, Decimal::ZERO);
}

#[tokio::test]
async fn negative_split_is_rejected() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    let err = ctx
        .fulfillment
        .split_line_item(item.id, dec!(12), dec!(-2))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn split_with_zero_on_one_side_routes_whole_item() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    let split = ctx
        .fulfillment
        .split_line_item(item.id, dec!(0), dec!(10))
        .await
        .unwrap();
    assert_eq!(split.warehouse_qty, Decimal::ZERO);
    assert_eq!(split.manufacturer_qty, whole(10));
}

#[tokio::test]
async fn split_is_judged_against_the_committed_picked_quantity() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    // A pick committed by an earlier writer must be visible to the split's
    // precondition checks, which read the item under the order lock.
    ctx.fulfillment
        .update_picked_quantity(item.id, dec!(6), None)
        .await
        .unwrap();

    let err = ctx
        .fulfillment
        .split_line_item(item.id, dec!(0), dec!(10))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let unchanged = LineItems::find_by_id(item.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.warehouse_qty, whole(10));
    assert_eq!(unchanged.picked_qty, whole(6));
}

#[tokio::test]
async fn split_of_missing_item_is_not_found() {
    let ctx = TestContext::new().await;
    let err = ctx
        .fulfillment
        .split_line_item(Uuid::new_v4(), dec!(1), dec!(0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn picked_quantity_is_bounded_by_warehouse_qty() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_split_line_item(&ctx.db, order.id, whole(10), whole(6), whole(4)).await;

    let err = ctx
        .fulfillment
        .update_picked_quantity(item.id, dec!(7), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let updated = ctx
        .fulfillment
        .update_picked_quantity(item.id, dec!(6), Some("aisle 14".into()))
        .await
        .unwrap();
    assert_eq!(updated.picked_qty, whole(6));

    let notes = AuditLog::find()
        .filter(fulfillment_audit_log::Column::LineItemId.eq(item.id))
        .all(&*ctx.db)
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].action, "pick_note");
    assert_eq!(notes[0].detail.as_deref(), Some("aisle 14"));
}

#[tokio::test]
async fn first_pick_moves_order_to_in_progress() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;

    ctx.fulfillment
        .update_picked_quantity(item.id, dec!(3), None)
        .await
        .unwrap();

    let order = Orders::find_by_id(order.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "in_progress");
}

#[tokio::test]
async fn partial_fulfillment_across_items_is_partially_fulfilled() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let done = seed_line_item(&ctx.db, order.id, whole(2)).await;
    let _pending = seed_line_item(&ctx.db, order.id, whole(5)).await;

    ctx.fulfillment
        .update_picked_quantity(done.id, dec!(2), None)
        .await
        .unwrap();

    let order = Orders::find_by_id(order.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "partially_fulfilled");
}

#[tokio::test]
async fn bulk_assignment_creates_six_rows_and_is_idempotent() {
    let ctx = TestContext::new().await;
    let order_a = seed_order(&ctx.db).await;
    let order_b = seed_order(&ctx.db).await;
    let u1 = seed_user(&ctx.db, "Avery", true).await;
    let u2 = seed_user(&ctx.db, "Blake", true).await;

    // u1 appears in both roles and twice in the worker list; in-role
    // duplicates collapse, cross-role duplicates stay.
    let outcomes = ctx
        .fulfillment
        .bulk_assign(
            vec![order_b.id, order_a.id],
            vec![u1.id],
            vec![u1.id, u2.id, u1.id],
        )
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.error.is_none() && o.assigned == 3));

    let rows = Assignments::find().all(&*ctx.db).await.unwrap();
    assert_eq!(rows.len(), 6);

    let rerun = ctx
        .fulfillment
        .bulk_assign(
            vec![order_a.id, order_b.id],
            vec![u1.id],
            vec![u1.id, u2.id],
        )
        .await
        .unwrap();
    assert!(rerun.iter().all(|o| o.error.is_none() && o.assigned == 0));
    assert_eq!(Assignments::find().all(&*ctx.db).await.unwrap().len(), 6);
}

#[tokio::test]
async fn bulk_assignment_reports_orders_independently() {
    let ctx = TestContext::new().await;
    let open = seed_order(&ctx.db).await;
    let cancelled = seed_order_with_status(&ctx.db, "cancelled").await;
    let u1 = seed_user(&ctx.db, "Casey", true).await;

    let outcomes = ctx
        .fulfillment
        .bulk_assign(vec![open.id, cancelled.id], vec![u1.id], vec![])
        .await
        .unwrap();

    let ok = outcomes
        .iter()
        .find(|o| o.fulfillment_order_id == open.id)
        .unwrap();
    assert_eq!(ok.assigned, 1);
    assert!(ok.error.is_none());

    let failed = outcomes
        .iter()
        .find(|o| o.fulfillment_order_id == cancelled.id)
        .unwrap();
    assert!(failed.error.is_some());
    assert_eq!(failed.assigned, 0);
}

#[tokio::test]
async fn hidden_users_cannot_be_assigned() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let hidden = seed_user(&ctx.db, "Shadow", false).await;

    let err = ctx
        .fulfillment
        .add_assignment(order.id, hidden.id, AssignmentRole::Worker)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
    assert!(Assignments::find().all(&*ctx.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn add_assignment_is_idempotent() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let u1 = seed_user(&ctx.db, "Drew", true).await;

    ctx.fulfillment
        .add_assignment(order.id, u1.id, AssignmentRole::Manager)
        .await
        .unwrap();
    ctx.fulfillment
        .add_assignment(order.id, u1.id, AssignmentRole::Manager)
        .await
        .unwrap();

    let rows = Assignments::find()
        .filter(fulfillment_assignment::Column::FulfillmentOrderId.eq(order.id))
        .all(&*ctx.db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn terminal_order_rejects_assignment() {
    let ctx = TestContext::new().await;
    let order = seed_order_with_status(&ctx.db, "completed").await;
    let u1 = seed_user(&ctx.db, "Emery", true).await;

    let err = ctx
        .fulfillment
        .add_assignment(order.id, u1.id, AssignmentRole::Worker)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn manufacturer_mark_on_zero_qty_line_is_a_noop() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await; // all warehouse

    ctx.fulfillment
        .mark_manufacturer_fulfilled(order.id, vec![item.id])
        .await
        .unwrap();

    let unchanged = LineItems::find_by_id(item.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert!(!unchanged.manufacturer_fulfilled);
}

#[tokio::test]
async fn manufacturer_mark_is_idempotent() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_split_line_item(&ctx.db, order.id, whole(4), Decimal::ZERO, whole(4)).await;
    // A second pending item keeps the order out of a terminal state.
    let _pending = seed_line_item(&ctx.db, order.id, whole(3)).await;

    ctx.fulfillment
        .mark_manufacturer_fulfilled(order.id, vec![item.id])
        .await
        .unwrap();
    ctx.fulfillment
        .mark_manufacturer_fulfilled(order.id, vec![item.id])
        .await
        .unwrap();

    let marked = LineItems::find_by_id(item.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert!(marked.manufacturer_fulfilled);
}

#[tokio::test]
async fn line_item_from_another_order_is_rejected() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let other = seed_order(&ctx.db).await;
    let stray = seed_split_line_item(&ctx.db, other.id, whole(4), Decimal::ZERO, whole(4)).await;

    let err = ctx
        .fulfillment
        .mark_manufacturer_fulfilled(order.id, vec![stray.id])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn shipment_request_link_conflicts_on_different_request() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(10)).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    ctx.fulfillment
        .link_shipment_request(order.id, vec![item.id], first)
        .await
        .unwrap();
    // Relinking the same request is a no-op.
    ctx.fulfillment
        .link_shipment_request(order.id, vec![item.id], first)
        .await
        .unwrap();

    let err = ctx
        .fulfillment
        .link_shipment_request(order.id, vec![item.id], second)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn backorder_cancel_keeps_picked_portion_and_records_reason() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_split_line_item(&ctx.db, order.id, whole(4), whole(4), Decimal::ZERO).await;
    ctx.fulfillment
        .update_picked_quantity(item.id, dec!(1), None)
        .await
        .unwrap();

    ctx.fulfillment
        .cancel_backorder(order.id, vec![item.id], "vendor dropped".into())
        .await
        .unwrap();

    let cancelled = LineItems::find_by_id(item.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.warehouse_qty, whole(1));
    assert_eq!(cancelled.picked_qty, whole(1));
    assert_eq!(cancelled.manufacturer_qty, Decimal::ZERO);
    assert_eq!(cancelled.total_qty, whole(1));
    assert!(cancelled.cancelled);

    let audit = AuditLog::find()
        .filter(fulfillment_audit_log::Column::Action.eq("backorder_cancelled"))
        .all(&*ctx.db)
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].detail.as_deref(), Some("vendor dropped"));

    // The only line item is now cancelled, so the order is too.
    let order = Orders::find_by_id(order.id)
        .one(&*ctx.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "cancelled");
}

#[tokio::test]
async fn backorder_cancel_without_outstanding_quantity_fails() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let item = seed_line_item(&ctx.db, order.id, whole(2)).await;
    ctx.fulfillment
        .update_picked_quantity(item.id, dec!(2), None)
        .await
        .unwrap();

    let err = ctx
        .fulfillment
        .cancel_backorder(order.id, vec![item.id], "late".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn document_upload_stores_blob_under_deterministic_key() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let payload = Bytes::from_static(b"%PDF-1.7 test invoice");

    let document = ctx
        .fulfillment
        .upload_document(
            order.id,
            DocumentType::Invoice,
            "invoice.pdf",
            payload.clone(),
            Some("signed copy".into()),
        )
        .await
        .unwrap();

    let prefix = format!("{}/invoice/", order.id);
    assert!(document.storage_key.starts_with(&prefix));
    assert!(document.storage_key.ends_with(".pdf"));

    let stored = ctx.store.get(&document.storage_key).await.unwrap();
    assert_eq!(stored, payload);

    let rows = Documents::find().all(&*ctx.db).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].storage_key, document.storage_key);
    assert!(rows[0].etag.is_some());
}

#[tokio::test]
async fn oversized_document_is_rejected_before_storage() {
    let ctx = TestContext::new().await;
    let order = seed_order(&ctx.db).await;
    let oversized = Bytes::from(vec![0u8; (common::TEST_DOCUMENT_LIMIT + 1) as usize]);

    let err = ctx
        .fulfillment
        .upload_document(order.id, DocumentType::Photo, "huge.jpg", oversized, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DocumentTooLarge { .. }));
    assert!(ctx.store.is_empty());
}

#[tokio::test]
async fn document_upload_for_unknown_order_is_not_found() {
    let ctx = TestContext::new().await;
    let err = ctx
        .fulfillment
        .upload_document(
            Uuid::new_v4(),
            DocumentType::Other,
            "note.txt",
            Bytes::from_static(b"x"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(ctx.store.is_empty());
}
