//! Key/value entity - Durable per-user storage behind the `KeyValueStore` capability.
//!
//! Each row holds one serialized engine record (debts, savings, streak data, ...)
//! under a `(namespace, key)` pair. The namespace is the stable user identifier.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Key/value database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kv_store")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Owning user namespace
    pub namespace: String,
    /// Storage key (e.g., `"debts_<uid>"`, `"streakData"`)
    pub key: String,
    /// Serialized value
    pub value: String,
    /// When this entry was last written
    pub updated_at: DateTime,
}

/// Key/value entries have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
