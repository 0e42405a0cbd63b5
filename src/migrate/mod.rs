//! Schema revision engine.
//!
//! Revisions form an acyclic graph: each declares zero, one, or several
//! parents. A merge revision has several parents and an empty body; its
//! only purpose is to re-unify divergent feature branches. Applied
//! revisions are recorded in a persistent ledger table so that after a
//! full apply the ledger matches the ancestor set of the head exactly.

pub mod revisions;

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Alias, Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, TransactionTrait};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("duplicate revision id: {0}")]
    DuplicateId(String),

    #[error("revision graph contains a cycle through {0}")]
    CycleDetected(String),

    #[error("multiple heads present ({0:?}); add a merge revision or name an explicit target")]
    MultipleHeads(Vec<String>),
}

/// A single schema delta. Merge revisions return several parents and leave
/// `up`/`down` empty.
#[async_trait]
pub trait Revision: Send + Sync {
    fn id(&self) -> &'static str;

    /// Parent revision ids; empty for the root.
    fn parents(&self) -> &'static [&'static str] {
        &[]
    }

    /// DDL that cannot run inside a transaction (extension creation)
    /// returns false; the ledger then records an attempted/applied pair so
    /// a crashed run can retry idempotently.
    fn transactional(&self) -> bool {
        true
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr>;
    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr>;
}

const LEDGER_TABLE: &str = "schema_revisions";
const STATE_APPLIED: &str = "applied";
const STATE_ATTEMPTED: &str = "attempted";

/// The registered revision graph plus apply/downgrade walks over it.
pub struct RevisionGraph {
    revisions: Vec<Box<dyn Revision>>,
    by_id: HashMap<&'static str, usize>,
}

impl RevisionGraph {
    pub fn new(revisions: Vec<Box<dyn Revision>>) -> Result<Self, MigrationError> {
        let mut by_id = HashMap::new();
        for (idx, rev) in revisions.iter().enumerate() {
            if by_id.insert(rev.id(), idx).is_some() {
                return Err(MigrationError::DuplicateId(rev.id().to_string()));
            }
        }
        let graph = Self { revisions, by_id };
        graph.validate()?;
        Ok(graph)
    }

    /// The full registered graph in deterministic topological order.
    pub fn topo_order(&self) -> Vec<&'static str> {
        // Kahn's algorithm; ready set kept ordered by id so sibling order
        // is deterministic.
        let mut indegree: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut children: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
        for rev in &self.revisions {
            indegree.entry(rev.id()).or_insert(0);
            for parent in rev.parents() {
                *indegree.entry(rev.id()).or_insert(0) += 1;
                children.entry(parent).or_default().push(rev.id());
            }
        }

        let mut ready: Vec<&'static str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.revisions.len());
        while let Some(id) = ready.first().copied() {
            ready.remove(0);
            order.push(id);
            for child in children.get(id).into_iter().flatten() {
                let d = indegree.get_mut(child).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.push(child);
                    ready.sort_unstable();
                }
            }
        }
        order
    }

    /// Revisions with no registered child.
    pub fn heads(&self) -> Vec<&'static str> {
        let mut has_child: HashSet<&'static str> = HashSet::new();
        for rev in &self.revisions {
            for parent in rev.parents() {
                has_child.insert(parent);
            }
        }
        let mut heads: Vec<&'static str> = self
            .revisions
            .iter()
            .map(|r| r.id())
            .filter(|id| !has_child.contains(id))
            .collect();
        heads.sort_unstable();
        heads
    }

    /// `target` plus every transitive parent.
    pub fn ancestors(&self, target: &str) -> Result<HashSet<&'static str>, MigrationError> {
        let start = self.resolve(target)?;
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let rev = &self.revisions[self.by_id[id]];
            for parent in rev.parents() {
                stack.push(parent);
            }
        }
        Ok(seen)
    }

    fn resolve(&self, id: &str) -> Result<&'static str, MigrationError> {
        self.by_id
            .get_key_value(id)
            .map(|(k, _)| *k)
            .ok_or_else(|| MigrationError::UnknownRevision(id.to_string()))
    }

    fn validate(&self) -> Result<(), MigrationError> {
        for rev in &self.revisions {
            for parent in rev.parents() {
                if !self.by_id.contains_key(parent) {
                    return Err(MigrationError::UnknownRevision(parent.to_string()));
                }
            }
        }
        // A complete topological order exists iff the graph is acyclic.
        let order = self.topo_order();
        if order.len() != self.revisions.len() {
            let in_order: HashSet<_> = order.into_iter().collect();
            let stuck = self
                .revisions
                .iter()
                .map(|r| r.id())
                .find(|id| !in_order.contains(id))
                .unwrap_or("<unknown>");
            return Err(MigrationError::CycleDetected(stuck.to_string()));
        }
        Ok(())
    }

    /// Applies pending revisions up to `target`. Without an explicit
    /// target the graph must have exactly one head.
    pub async fn apply(
        &self,
        db: &DatabaseConnection,
        target: Option<&str>,
    ) -> Result<usize, MigrationError> {
        ensure_ledger(db).await?;

        let target = match target {
            Some(id) => self.resolve(id)?,
            None => {
                let heads = self.heads();
                match heads.as_slice() {
                    [single] => *single,
                    _ => return Err(MigrationError::MultipleHeads(
                        heads.iter().map(|s| s.to_string()).collect(),
                    )),
                }
            }
        };

        let applied = read_ledger(db, STATE_APPLIED).await?;
        let attempted = read_ledger(db, STATE_ATTEMPTED).await?;
        let wanted = self.ancestors(target)?;

        let mut count = 0;
        for id in self.topo_order() {
            if !wanted.contains(id) || applied.contains(id) {
                continue;
            }
            let rev = &self.revisions[self.by_id[id]];
            if rev.transactional() {
                self.apply_transactional(db, rev.as_ref()).await?;
            } else {
                self.apply_unchecked(db, rev.as_ref(), attempted.contains(id))
                    .await?;
            }
            info!(revision = id, "revision applied");
            count += 1;
        }
        if count == 0 {
            info!(revision = target, "schema already at target");
        }
        Ok(count)
    }

    async fn apply_transactional(
        &self,
        db: &DatabaseConnection,
        rev: &dyn Revision,
    ) -> Result<(), MigrationError> {
        let txn = db.begin().await?;
        rev.up(&txn).await?;
        insert_ledger(&txn, rev.id(), STATE_APPLIED).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Non-transactional path: mark attempted first so a crash between the
    /// DDL and the ledger flip is recoverable by re-running `up`.
    async fn apply_unchecked(
        &self,
        db: &DatabaseConnection,
        rev: &dyn Revision,
        previously_attempted: bool,
    ) -> Result<(), MigrationError> {
        if previously_attempted {
            warn!(revision = rev.id(), "retrying previously attempted revision");
        } else {
            insert_ledger(db, rev.id(), STATE_ATTEMPTED).await?;
        }
        rev.up(db).await?;
        promote_ledger(db, rev.id()).await?;
        Ok(())
    }

    /// Reverts applied revisions that are not ancestors of any of the
    /// given targets, child-before-parent. An empty target list reverts
    /// everything.
    pub async fn downgrade(
        &self,
        db: &DatabaseConnection,
        targets: &[&str],
    ) -> Result<usize, MigrationError> {
        ensure_ledger(db).await?;

        let mut keep: HashSet<&'static str> = HashSet::new();
        for target in targets {
            keep.extend(self.ancestors(target)?);
        }

        let applied = read_ledger(db, STATE_APPLIED).await?;
        let mut count = 0;
        for id in self.topo_order().into_iter().rev() {
            if keep.contains(id) || !applied.contains(id) {
                continue;
            }
            let rev = &self.revisions[self.by_id[id]];
            let txn = db.begin().await?;
            rev.down(&txn).await?;
            delete_ledger(&txn, id).await?;
            txn.commit().await?;
            info!(revision = id, "revision reverted");
            count += 1;
        }
        Ok(count)
    }

    /// Ids currently recorded as applied.
    pub async fn applied(&self, db: &DatabaseConnection) -> Result<HashSet<String>, MigrationError> {
        ensure_ledger(db).await?;
        Ok(read_ledger(db, STATE_APPLIED).await?)
    }
}

async fn ensure_ledger(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::sea_query::{ColumnDef, Table};
    let stmt = Table::create()
        .table(Alias::new(LEDGER_TABLE))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new("id"))
                .string()
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(Alias::new("state")).string().not_null())
        .col(ColumnDef::new(Alias::new("applied_at")).string().not_null())
        .to_owned();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}

async fn read_ledger(db: &DatabaseConnection, state: &str) -> Result<HashSet<String>, DbErr> {
    let stmt = Query::select()
        .column(Alias::new("id"))
        .from(Alias::new(LEDGER_TABLE))
        .and_where(Expr::col(Alias::new("state")).eq(state))
        .to_owned();
    let rows = db.query_all(db.get_database_backend().build(&stmt)).await?;
    rows.into_iter().map(|row| row.try_get("", "id")).collect()
}

async fn insert_ledger(
    conn: &impl ConnectionTrait,
    id: &str,
    state: &str,
) -> Result<(), DbErr> {
    let stmt = Query::insert()
        .into_table(Alias::new(LEDGER_TABLE))
        .columns([Alias::new("id"), Alias::new("state"), Alias::new("applied_at")])
        .values_panic([id.into(), state.into(), Utc::now().to_rfc3339().into()])
        .to_owned();
    conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(())
}

async fn promote_ledger(conn: &impl ConnectionTrait, id: &str) -> Result<(), DbErr> {
    let stmt = Query::update()
        .table(Alias::new(LEDGER_TABLE))
        .value(Alias::new("state"), STATE_APPLIED)
        .value(Alias::new("applied_at"), Utc::now().to_rfc3339())
        .and_where(Expr::col(Alias::new("id")).eq(id))
        .to_owned();
    conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(())
}

async fn delete_ledger(conn: &impl ConnectionTrait, id: &str) -> Result<(), DbErr> {
    let stmt = Query::delete()
        .from_table(Alias::new(LEDGER_TABLE))
        .and_where(Expr::col(Alias::new("id")).eq(id))
        .to_owned();
    conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(())
}

/// The full registered revision set for this repository.
pub fn revision_graph() -> Result<RevisionGraph, MigrationError> {
    RevisionGraph::new(revisions::all())
}

/// Applies every pending revision up to the single head.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), MigrationError> {
    let graph = revision_graph()?;
    let applied = graph.apply(db, None).await?;
    info!(applied, "schema migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        id: &'static str,
        parents: &'static [&'static str],
    }

    #[async_trait]
    impl Revision for Fake {
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

    fn fake(id: &'static str, parents: &'static [&'static str]) -> Box<dyn Revision> {
        Box::new(Fake { id, parents })
    }

    #[test]
    fn topo_order_puts_parents_first_and_sorts_siblings() {
        let graph = RevisionGraph::new(vec![
            fake("c_branch", &["a_root"]),
            fake("a_root", &[]),
            fake("b_branch", &["a_root"]),
            fake("d_merge", &["b_branch", "c_branch"]),
        ])
        .unwrap();
        assert_eq!(
            graph.topo_order(),
            vec!["a_root", "b_branch", "c_branch", "d_merge"]
        );
    }

    #[test]
    fn heads_are_childless_nodes() {
        let graph = RevisionGraph::new(vec![
            fake("a", &[]),
            fake("b", &["a"]),
            fake("c", &["a"]),
        ])
        .unwrap();
        assert_eq!(graph.heads(), vec!["b", "c"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let result = RevisionGraph::new(vec![fake("a", &["b"]), fake("b", &["a"])]);
        assert!(matches!(result, Err(MigrationError::CycleDetected(_))));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let result = RevisionGraph::new(vec![fake("a", &["ghost"])]);
        assert!(matches!(result, Err(MigrationError::UnknownRevision(_))));
    }

    #[test]
    fn registered_graph_is_valid_with_single_head() {
        let graph = revision_graph().unwrap();
        assert_eq!(graph.heads().len(), 1);
    }
}
