//! Accepted literature recommendation (append-only)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recommendations")]
pub struct Model {
    /// UUIDv7, so ids sort in insertion order
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub node_id: i64,

    /// Canonical index id of the recommended work
    #[sea_orm(column_type = "Text")]
    pub canonical_id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    pub year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub venue: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub url: String,

    pub cited_by_count: i64,

    pub is_open_access: bool,

    #[sea_orm(column_type = "Text")]
    pub abstract_text: String,

    /// identifier | title_search
    #[sea_orm(column_type = "Text")]
    pub resolved_via: String,

    /// Relationship the candidate claimed
    #[sea_orm(column_type = "Text")]
    pub relationship: String,

    /// Filter the caller asked with (`auto` or a relationship)
    #[sea_orm(column_type = "Text")]
    pub requested_relationship: String,

    #[sea_orm(column_type = "Double")]
    pub score: f64,

    #[sea_orm(column_type = "Text")]
    pub justification: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub verification: serde_json::Value,

    #[sea_orm(column_type = "Text")]
    pub summary: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub base: Option<serde_json::Value>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::experiment::Entity",
        from = "Column::NodeId",
        to = "super::experiment::Column::Id",
        on_delete = "Cascade"
    )]
    Experiment,
}

impl Related<super::experiment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Experiment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
