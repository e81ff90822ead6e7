//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.
//! DDL lives in `migrations/postgres/`.

use sea_query::{Alias, Iden};

use crate::model::ProjectionTable;

/// Jobs table schema.
#[derive(Iden)]
pub enum Jobs {
    Table,
    #[iden = "uuid"]
    Uuid,
    #[iden = "namespace_name"]
    NamespaceName,
    #[iden = "name"]
    Name,
    #[iden = "current_version_uuid"]
    CurrentVersionUuid,
}

/// Datasets table schema.
#[derive(Iden)]
pub enum Datasets {
    Table,
    #[iden = "uuid"]
    Uuid,
    #[iden = "namespace_name"]
    NamespaceName,
    #[iden = "name"]
    Name,
}

/// Runs table schema.
#[derive(Iden, Clone, Copy)]
pub enum Runs {
    Table,
    #[iden = "uuid"]
    Uuid,
    #[iden = "job_uuid"]
    JobUuid,
    #[iden = "job_version_uuid"]
    JobVersionUuid,
    #[iden = "namespace_name"]
    NamespaceName,
    #[iden = "job_name"]
    JobName,
    #[iden = "current_run_state"]
    CurrentRunState,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "started_at"]
    StartedAt,
    #[iden = "ended_at"]
    EndedAt,
    #[iden = "parent_run_uuid"]
    ParentRunUuid,
}

impl Runs {
    /// Columns selected for a `RunRecord`.
    pub const COLUMNS: [Runs; 11] = [
        Runs::Uuid,
        Runs::JobUuid,
        Runs::JobVersionUuid,
        Runs::NamespaceName,
        Runs::JobName,
        Runs::CurrentRunState,
        Runs::CreatedAt,
        Runs::UpdatedAt,
        Runs::StartedAt,
        Runs::EndedAt,
        Runs::ParentRunUuid,
    ];
}

/// Dataset versions table schema.
#[derive(Iden)]
pub enum DatasetVersions {
    Table,
    #[iden = "uuid"]
    Uuid,
    #[iden = "dataset_uuid"]
    DatasetUuid,
    #[iden = "namespace_name"]
    NamespaceName,
    #[iden = "dataset_name"]
    DatasetName,
    #[iden = "version"]
    Version,
    #[iden = "run_uuid"]
    RunUuid,
}

/// Run → consumed dataset version mapping.
#[derive(Iden)]
pub enum RunsInputMapping {
    Table,
    #[iden = "run_uuid"]
    RunUuid,
    #[iden = "dataset_version_uuid"]
    DatasetVersionUuid,
}

/// Columns shared by both denormalized lineage tables.
///
/// The table itself is addressed through [`lineage_table`].
#[derive(Iden, Clone, Copy)]
pub enum Lineage {
    #[iden = "run_uuid"]
    RunUuid,
    #[iden = "namespace_name"]
    NamespaceName,
    #[iden = "job_name"]
    JobName,
    #[iden = "state"]
    State,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "started_at"]
    StartedAt,
    #[iden = "ended_at"]
    EndedAt,
    #[iden = "job_uuid"]
    JobUuid,
    #[iden = "job_version_uuid"]
    JobVersionUuid,
    #[iden = "input_version_uuid"]
    InputVersionUuid,
    #[iden = "input_namespace"]
    InputNamespace,
    #[iden = "input_dataset_name"]
    InputDatasetName,
    #[iden = "input_version"]
    InputVersion,
    #[iden = "output_version_uuid"]
    OutputVersionUuid,
    #[iden = "output_namespace"]
    OutputNamespace,
    #[iden = "output_dataset_name"]
    OutputDatasetName,
    #[iden = "output_version"]
    OutputVersion,
    #[iden = "parent_run_uuid"]
    ParentRunUuid,
    #[iden = "run_date"]
    RunDate,
}

impl Lineage {
    /// Every column, in insert order.
    pub const COLUMNS: [Lineage; 20] = [
        Lineage::RunUuid,
        Lineage::NamespaceName,
        Lineage::JobName,
        Lineage::State,
        Lineage::CreatedAt,
        Lineage::UpdatedAt,
        Lineage::StartedAt,
        Lineage::EndedAt,
        Lineage::JobUuid,
        Lineage::JobVersionUuid,
        Lineage::InputVersionUuid,
        Lineage::InputNamespace,
        Lineage::InputDatasetName,
        Lineage::InputVersion,
        Lineage::OutputVersionUuid,
        Lineage::OutputNamespace,
        Lineage::OutputDatasetName,
        Lineage::OutputVersion,
        Lineage::ParentRunUuid,
        Lineage::RunDate,
    ];
}

pub fn lineage_table(table: ProjectionTable) -> Alias {
    Alias::new(table.table_name())
}
