//! SeaORM entity models
//!
//! Database entities for the experiment graph and its recommendations

mod experiment;
mod relationship;
mod recommendation;

pub use experiment::{
    Entity as ExperimentEntity,
    Model as Experiment,
    ActiveModel as ExperimentActiveModel,
    Column as ExperimentColumn,
};

pub use relationship::{
    Entity as RelationshipEntity,
    Model as ExperimentRelationship,
    ActiveModel as RelationshipActiveModel,
    Column as RelationshipColumn,
};

pub use recommendation::{
    Entity as RecommendationEntity,
    Model as RecommendationRow,
    ActiveModel as RecommendationActiveModel,
    Column as RecommendationColumn,
};
