//! Directed edge between two experiments

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "experiment_relationships")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Parent side of the edge
    pub from_experiment_id: i64,

    /// Child side of the edge
    pub to_experiment_id: i64,

    /// leads_to, supports, refutes, requires, related_to, ...
    #[sea_orm(column_type = "Text")]
    pub relationship_type: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub label: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub extra_data: Option<serde_json::Value>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::experiment::Entity",
        from = "Column::FromExperimentId",
        to = "super::experiment::Column::Id",
        on_delete = "Cascade"
    )]
    FromExperiment,

    #[sea_orm(
        belongs_to = "super::experiment::Entity",
        from = "Column::ToExperimentId",
        to = "super::experiment::Column::Id",
        on_delete = "Cascade"
    )]
    ToExperiment,
}

impl ActiveModelBehavior for ActiveModel {}
