use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{
    note::{self, Entity as NoteEntity},
    user::{self, Entity as UserEntity},
};
use crate::errors::ServiceError;

/// Read-boundary filters for the soft-visibility flags. Rows created before
/// the flags existed fall back to the column defaults (visible, private),
/// so the filters live here rather than in callers.
#[derive(Clone)]
pub struct DirectoryService {
    db: Arc<DatabaseConnection>,
}

impl DirectoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Users eligible for assignment pickers: visible only.
    #[instrument(skip(self))]
    pub async fn list_assignable_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        UserEntity::find()
            .filter(user::Column::Visible.eq(true))
            .order_by_asc(user::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Notes readable by `reader_id`: public notes plus the reader's own.
    #[instrument(skip(self))]
    pub async fn list_notes_for(&self, reader_id: Uuid) -> Result<Vec<note::Model>, ServiceError> {
        NoteEntity::find()
            .filter(
                note::Column::IsPublic
                    .eq(true)
                    .or(note::Column::AuthorId.eq(reader_id)),
            )
            .order_by_asc(note::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}
