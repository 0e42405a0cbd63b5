mod common;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Statement};

use common::connect_memory;
use opsline_api::migrate::{revision_graph, MigrationError, Revision, RevisionGraph};

const ROOT: &str = "20251201_01_base_schema";
const FULFILLMENT_BRANCH: &str = "20260107_01_fulfillment_freight_class";
const CARRIER_BRANCH: &str = "20260107_02_carrier_freight_class";
const MERGE: &str = "20260108_01_merge_freight_class";
const HEAD: &str = "20260125_01_pg_trgm";

async fn column_exists(db: &DatabaseConnection, table: &str, column: &str) -> bool {
    let stmt = Statement::from_string(
        db.get_database_backend(),
        format!("SELECT {column} FROM {table} LIMIT 1"),
    );
    db.query_all(stmt).await.is_ok()
}

#[tokio::test]
async fn full_apply_matches_ancestor_set_of_head() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();

    let applied = graph.apply(&db, None).await.unwrap();
    assert_eq!(applied, graph.topo_order().len());

    let ledger = graph.applied(&db).await.unwrap();
    let ancestors = graph.ancestors(HEAD).unwrap();
    assert_eq!(ledger.len(), ancestors.len());
    for id in ancestors {
        assert!(ledger.contains(id), "missing ledger row for {id}");
    }
}

#[tokio::test]
async fn apply_at_head_is_a_noop() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();

    graph.apply(&db, None).await.unwrap();
    let second = graph.apply(&db, None).await.unwrap();
    assert_eq!(second, 0);
}

#[tokio::test]
async fn merge_revision_applies_both_branches() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();

    // Up to the fulfillment branch only: the carrier branch is untouched.
    graph.apply(&db, Some(FULFILLMENT_BRANCH)).await.unwrap();
    assert!(column_exists(&db, "fulfillment_orders", "freight_class").await);
    assert!(!column_exists(&db, "shipping_carriers", "freight_class").await);

    // The merge pulls in the remaining branch; its own body is empty.
    let applied = graph.apply(&db, Some(MERGE)).await.unwrap();
    assert_eq!(applied, 2);
    assert!(column_exists(&db, "shipping_carriers", "freight_class").await);

    let ledger = graph.applied(&db).await.unwrap();
    assert!(ledger.contains(FULFILLMENT_BRANCH));
    assert!(ledger.contains(CARRIER_BRANCH));
    assert!(ledger.contains(MERGE));
}

#[tokio::test]
async fn downgrading_the_merge_keeps_both_branch_columns() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();
    graph.apply(&db, None).await.unwrap();

    let reverted = graph
        .downgrade(&db, &[FULFILLMENT_BRANCH, CARRIER_BRANCH])
        .await
        .unwrap();
    assert!(reverted >= 1);

    let ledger = graph.applied(&db).await.unwrap();
    assert!(!ledger.contains(MERGE));
    assert!(ledger.contains(FULFILLMENT_BRANCH));
    assert!(ledger.contains(CARRIER_BRANCH));
    assert!(column_exists(&db, "fulfillment_orders", "freight_class").await);
    assert!(column_exists(&db, "shipping_carriers", "freight_class").await);
}

#[tokio::test]
async fn downgrading_past_the_branches_removes_their_columns() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();
    graph.apply(&db, Some(MERGE)).await.unwrap();

    graph
        .downgrade(&db, &["20260102_01_quotes_factory_per_line_item"])
        .await
        .unwrap();

    assert!(!column_exists(&db, "fulfillment_orders", "freight_class").await);
    assert!(!column_exists(&db, "shipping_carriers", "freight_class").await);
    let ledger = graph.applied(&db).await.unwrap();
    assert!(!ledger.contains(FULFILLMENT_BRANCH));
    assert!(!ledger.contains(CARRIER_BRANCH));
}

#[tokio::test]
async fn full_downgrade_and_reapply_round_trips() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();

    let first = graph.apply(&db, None).await.unwrap();
    let reverted = graph.downgrade(&db, &[]).await.unwrap();
    assert_eq!(first, reverted);
    assert!(graph.applied(&db).await.unwrap().is_empty());
    assert!(!column_exists(&db, "users", "id").await);

    let second = graph.apply(&db, None).await.unwrap();
    assert_eq!(second, first);
    assert!(column_exists(&db, "users", "visible").await);
}

#[tokio::test]
async fn partial_apply_records_only_ancestors() {
    let db = connect_memory().await;
    let graph = revision_graph().unwrap();

    graph.apply(&db, Some(ROOT)).await.unwrap();
    let ledger = graph.applied(&db).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger.contains(ROOT));
    assert!(!column_exists(&db, "users", "visible").await);
}

struct Noop {
    id: &'static str,
    parents: &'static [&'static str],
}

#[async_trait]
impl Revision for Noop {
    fn id(&self) -> &'static str {
        self.id
    }
    fn parents(&self) -> &'static [&'static str] {
        self.parents
    }
    async fn up(&self, _conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        Ok(())
    }
    async fn down(&self, _conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        Ok(())
    }
}

fn noop(id: &'static str, parents: &'static [&'static str]) -> Box<dyn Revision> {
    Box::new(Noop { id, parents })
}

#[tokio::test]
async fn apply_without_target_refuses_two_heads() {
    let db = connect_memory().await;
    let graph = RevisionGraph::new(vec![
        noop("001_root", &[]),
        noop("002_left", &["001_root"]),
        noop("003_right", &["001_root"]),
    ])
    .unwrap();

    let err = graph.apply(&db, None).await.unwrap_err();
    match err {
        MigrationError::MultipleHeads(heads) => {
            assert_eq!(heads, vec!["002_left".to_string(), "003_right".to_string()]);
        }
        other => panic!("expected MultipleHeads, got {other}"),
    }

    // Naming an explicit target still works on a two-headed graph.
    let applied = graph.apply(&db, Some("002_left")).await.unwrap();
    assert_eq!(applied, 2);
}

#[tokio::test]
async fn sibling_branches_apply_in_id_order() {
    let graph = revision_graph().unwrap();
    let order = graph.topo_order();
    let fulfillment = order.iter().position(|id| *id == FULFILLMENT_BRANCH).unwrap();
    let carrier = order.iter().position(|id| *id == CARRIER_BRANCH).unwrap();
    let merge = order.iter().position(|id| *id == MERGE).unwrap();
    assert!(fulfillment < carrier);
    assert!(carrier < merge);
}
