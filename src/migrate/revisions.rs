//! The registered revision set.
//!
//! The two freight-class revisions were developed on parallel branches off
//! `20260102_01_quotes_factory_per_line_item` and are re-unified by the
//! `20260108_01_merge_freight_class` merge revision.

use async_trait::async_trait;
use sea_orm::sea_query::{ColumnDef, Index, Table};
use sea_orm::{ConnectionTrait, DbBackend, DbErr, DeriveIden, StatementBuilder};

use super::Revision;

pub fn all() -> Vec<Box<dyn Revision>> {
    vec![
        Box::new(BaseSchema),
        Box::new(UsersVisible),
        Box::new(NotesIsPublic),
        Box::new(ContactsExternalId),
        Box::new(QuotesFactoryPerLineItem),
        Box::new(FulfillmentFreightClass),
        Box::new(CarrierFreightClass),
        Box::new(MergeFreightClass),
        Box::new(SubmittalLeadTime),
        Box::new(NoteCustomPrompt),
        Box::new(TrigramExtension),
    ]
}

async fn exec<S: StatementBuilder>(conn: &dyn ConnectionTrait, stmt: &S) -> Result<(), DbErr> {
    conn.execute(conn.get_database_backend().build(stmt)).await?;
    Ok(())
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    Visible,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Contacts {
    Table,
    Id,
    CompanyId,
    Name,
    Email,
    ExternalId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Notes {
    Table,
    Id,
    AuthorId,
    Body,
    IsPublic,
    CustomPrompt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Quotes {
    Table,
    Id,
    CompanyId,
    QuoteNumber,
    Status,
    FactoryPerLineItem,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ShippingCarriers {
    Table,
    Id,
    Name,
    Scac,
    FreightClass,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SubmittalItems {
    Table,
    Id,
    Description,
    LeadTime,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FulfillmentOrders {
    Table,
    Id,
    SalesOrderId,
    Status,
    FreightClass,
    ServiceType,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FulfillmentLineItems {
    Table,
    Id,
    FulfillmentOrderId,
    ProductId,
    TotalQty,
    WarehouseQty,
    ManufacturerQty,
    PickedQty,
    ManufacturerFulfilled,
    Cancelled,
    Shipped,
    ShipmentRequestId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FulfillmentAssignments {
    Table,
    Id,
    FulfillmentOrderId,
    UserId,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FulfillmentDocuments {
    Table,
    Id,
    FulfillmentOrderId,
    DocumentType,
    StorageKey,
    Etag,
    Notes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FulfillmentAuditLog {
    Table,
    Id,
    FulfillmentOrderId,
    LineItemId,
    Action,
    Detail,
    CreatedAt,
}

/// Root revision: every table of the CRM/warehouse core, pre-flags.
struct BaseSchema;

#[async_trait]
impl Revision for BaseSchema {
    fn id(&self) -> &'static str {
        "20251201_01_base_schema"
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::create()
                .table(Users::Table)
                .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Users::Name).string().not_null())
                .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(Contacts::Table)
                .col(ColumnDef::new(Contacts::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Contacts::CompanyId).uuid().not_null())
                .col(ColumnDef::new(Contacts::Name).string().not_null())
                .col(ColumnDef::new(Contacts::Email).string().null())
                .col(ColumnDef::new(Contacts::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Contacts::UpdatedAt).timestamp_with_time_zone().not_null())
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(Notes::Table)
                .col(ColumnDef::new(Notes::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Notes::AuthorId).uuid().not_null())
                .col(ColumnDef::new(Notes::Body).text().not_null())
                .col(ColumnDef::new(Notes::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Notes::UpdatedAt).timestamp_with_time_zone().not_null())
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(Quotes::Table)
                .col(ColumnDef::new(Quotes::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Quotes::CompanyId).uuid().not_null())
                .col(
                    ColumnDef::new(Quotes::QuoteNumber)
                        .string()
                        .not_null()
                        .unique_key(),
                )
                .col(ColumnDef::new(Quotes::Status).string().not_null())
                .col(ColumnDef::new(Quotes::CreatedAt).timestamp_with_time_zone().not_null())
                .col(ColumnDef::new(Quotes::UpdatedAt).timestamp_with_time_zone().not_null())
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(ShippingCarriers::Table)
                .col(
                    ColumnDef::new(ShippingCarriers::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(ColumnDef::new(ShippingCarriers::Name).string().not_null())
                .col(ColumnDef::new(ShippingCarriers::Scac).string_len(4).null())
                .col(
                    ColumnDef::new(ShippingCarriers::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(SubmittalItems::Table)
                .col(
                    ColumnDef::new(SubmittalItems::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(ColumnDef::new(SubmittalItems::Description).text().not_null())
                .col(
                    ColumnDef::new(SubmittalItems::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(FulfillmentOrders::Table)
                .col(
                    ColumnDef::new(FulfillmentOrders::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(ColumnDef::new(FulfillmentOrders::SalesOrderId).uuid().not_null())
                .col(
                    ColumnDef::new(FulfillmentOrders::Status)
                        .string()
                        .not_null()
                        .default("open"),
                )
                .col(
                    ColumnDef::new(FulfillmentOrders::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentOrders::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(FulfillmentLineItems::Table)
                .col(
                    ColumnDef::new(FulfillmentLineItems::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::FulfillmentOrderId)
                        .uuid()
                        .not_null(),
                )
                .col(ColumnDef::new(FulfillmentLineItems::ProductId).uuid().not_null())
                .col(
                    ColumnDef::new(FulfillmentLineItems::TotalQty)
                        .decimal_len(16, 6)
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::WarehouseQty)
                        .decimal_len(16, 6)
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::ManufacturerQty)
                        .decimal_len(16, 6)
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::PickedQty)
                        .decimal_len(16, 6)
                        .not_null()
                        .default(0),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::ManufacturerFulfilled)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::Cancelled)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::Shipped)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::ShipmentRequestId)
                        .uuid()
                        .null(),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentLineItems::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(FulfillmentAssignments::Table)
                .col(
                    ColumnDef::new(FulfillmentAssignments::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentAssignments::FulfillmentOrderId)
                        .uuid()
                        .not_null(),
                )
                .col(ColumnDef::new(FulfillmentAssignments::UserId).uuid().not_null())
                .col(ColumnDef::new(FulfillmentAssignments::Role).string().not_null())
                .col(
                    ColumnDef::new(FulfillmentAssignments::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Index::create()
                .name("ux_fulfillment_assignments_order_user_role")
                .table(FulfillmentAssignments::Table)
                .col(FulfillmentAssignments::FulfillmentOrderId)
                .col(FulfillmentAssignments::UserId)
                .col(FulfillmentAssignments::Role)
                .unique()
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(FulfillmentDocuments::Table)
                .col(
                    ColumnDef::new(FulfillmentDocuments::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentDocuments::FulfillmentOrderId)
                        .uuid()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentDocuments::DocumentType)
                        .string()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentDocuments::StorageKey)
                        .string()
                        .not_null(),
                )
                .col(ColumnDef::new(FulfillmentDocuments::Etag).string().null())
                .col(ColumnDef::new(FulfillmentDocuments::Notes).text().null())
                .col(
                    ColumnDef::new(FulfillmentDocuments::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await?;

        exec(
            conn,
            &Table::create()
                .table(FulfillmentAuditLog::Table)
                .col(
                    ColumnDef::new(FulfillmentAuditLog::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(FulfillmentAuditLog::FulfillmentOrderId)
                        .uuid()
                        .not_null(),
                )
                .col(ColumnDef::new(FulfillmentAuditLog::LineItemId).uuid().null())
                .col(ColumnDef::new(FulfillmentAuditLog::Action).string().not_null())
                .col(ColumnDef::new(FulfillmentAuditLog::Detail).text().null())
                .col(
                    ColumnDef::new(FulfillmentAuditLog::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(conn, &Table::drop().table(FulfillmentAuditLog::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(FulfillmentDocuments::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(FulfillmentAssignments::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(FulfillmentLineItems::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(FulfillmentOrders::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(SubmittalItems::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(ShippingCarriers::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(Quotes::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(Notes::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(Contacts::Table).to_owned()).await?;
        exec(conn, &Table::drop().table(Users::Table).to_owned()).await
    }
}

/// Hidden users keep prior behaviour: the flag defaults to visible.
struct UsersVisible;

#[async_trait]
impl Revision for UsersVisible {
    fn id(&self) -> &'static str {
        "20251210_01_users_visible"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20251201_01_base_schema"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Users::Table)
                .add_column(
                    ColumnDef::new(Users::Visible)
                        .boolean()
                        .not_null()
                        .default(true),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Users::Table)
                .drop_column(Users::Visible)
                .to_owned(),
        )
        .await
    }
}

struct NotesIsPublic;

#[async_trait]
impl Revision for NotesIsPublic {
    fn id(&self) -> &'static str {
        "20251215_01_notes_is_public"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20251210_01_users_visible"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Notes::Table)
                .add_column(
                    ColumnDef::new(Notes::IsPublic)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Notes::Table)
                .drop_column(Notes::IsPublic)
                .to_owned(),
        )
        .await
    }
}

struct ContactsExternalId;

#[async_trait]
impl Revision for ContactsExternalId {
    fn id(&self) -> &'static str {
        "20251220_01_contacts_external_id"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20251215_01_notes_is_public"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Contacts::Table)
                .add_column(ColumnDef::new(Contacts::ExternalId).string().null())
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Contacts::Table)
                .drop_column(Contacts::ExternalId)
                .to_owned(),
        )
        .await
    }
}

struct QuotesFactoryPerLineItem;

#[async_trait]
impl Revision for QuotesFactoryPerLineItem {
    fn id(&self) -> &'static str {
        "20260102_01_quotes_factory_per_line_item"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20251220_01_contacts_external_id"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Quotes::Table)
                .add_column(
                    ColumnDef::new(Quotes::FactoryPerLineItem)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Quotes::Table)
                .drop_column(Quotes::FactoryPerLineItem)
                .to_owned(),
        )
        .await
    }
}

struct FulfillmentFreightClass;

#[async_trait]
impl Revision for FulfillmentFreightClass {
    fn id(&self) -> &'static str {
        "20260107_01_fulfillment_freight_class"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20260102_01_quotes_factory_per_line_item"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(FulfillmentOrders::Table)
                .add_column(
                    ColumnDef::new(FulfillmentOrders::FreightClass)
                        .string_len(10)
                        .null(),
                )
                .to_owned(),
        )
        .await?;
        exec(
            conn,
            &Table::alter()
                .table(FulfillmentOrders::Table)
                .add_column(
                    ColumnDef::new(FulfillmentOrders::ServiceType)
                        .string_len(100)
                        .null(),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(FulfillmentOrders::Table)
                .drop_column(FulfillmentOrders::ServiceType)
                .to_owned(),
        )
        .await?;
        exec(
            conn,
            &Table::alter()
                .table(FulfillmentOrders::Table)
                .drop_column(FulfillmentOrders::FreightClass)
                .to_owned(),
        )
        .await
    }
}

struct CarrierFreightClass;

#[async_trait]
impl Revision for CarrierFreightClass {
    fn id(&self) -> &'static str {
        "20260107_02_carrier_freight_class"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20260102_01_quotes_factory_per_line_item"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(ShippingCarriers::Table)
                .add_column(
                    ColumnDef::new(ShippingCarriers::FreightClass)
                        .string_len(10)
                        .null(),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(ShippingCarriers::Table)
                .drop_column(ShippingCarriers::FreightClass)
                .to_owned(),
        )
        .await
    }
}

/// Merge revision: no schema delta, collapses the two freight-class heads.
struct MergeFreightClass;

#[async_trait]
impl Revision for MergeFreightClass {
    fn id(&self) -> &'static str {
        "20260108_01_merge_freight_class"
    }
    fn parents(&self) -> &'static [&'static str] {
        &[
            "20260107_01_fulfillment_freight_class",
            "20260107_02_carrier_freight_class",
        ]
    }

    async fn up(&self, _conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        Ok(())
    }

    async fn down(&self, _conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        Ok(())
    }
}

struct SubmittalLeadTime;

#[async_trait]
impl Revision for SubmittalLeadTime {
    fn id(&self) -> &'static str {
        "20260115_01_submittal_lead_time"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20260108_01_merge_freight_class"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(SubmittalItems::Table)
                .add_column(
                    ColumnDef::new(SubmittalItems::LeadTime)
                        .string_len(100)
                        .null(),
                )
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(SubmittalItems::Table)
                .drop_column(SubmittalItems::LeadTime)
                .to_owned(),
        )
        .await
    }
}

struct NoteCustomPrompt;

#[async_trait]
impl Revision for NoteCustomPrompt {
    fn id(&self) -> &'static str {
        "20260120_01_note_custom_prompt"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20260115_01_submittal_lead_time"]
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Notes::Table)
                .add_column(ColumnDef::new(Notes::CustomPrompt).text().null())
                .to_owned(),
        )
        .await
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        exec(
            conn,
            &Table::alter()
                .table(Notes::Table)
                .drop_column(Notes::CustomPrompt)
                .to_owned(),
        )
        .await
    }
}

/// Trigram similarity for product search. Extension creation cannot run in
/// a transaction, so this revision is marked non-transactional. No-op on
/// sqlite.
struct TrigramExtension;

#[async_trait]
impl Revision for TrigramExtension {
    fn id(&self) -> &'static str {
        "20260125_01_pg_trgm"
    }
    fn parents(&self) -> &'static [&'static str] {
        &["20260120_01_note_custom_prompt"]
    }
    fn transactional(&self) -> bool {
        false
    }

    async fn up(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        if conn.get_database_backend() == DbBackend::Postgres {
            conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS pg_trgm")
                .await?;
        }
        Ok(())
    }

    async fn down(&self, conn: &dyn ConnectionTrait) -> Result<(), DbErr> {
        if conn.get_database_backend() == DbBackend::Postgres {
            conn.execute_unprepared("DROP EXTENSION IF EXISTS pg_trgm")
                .await?;
        }
        Ok(())
    }
}
