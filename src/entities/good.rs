//! Good entity - one sellable account session.
//!
//! A good is inserted by resynchronization, flips from unsold to sold exactly once, and is
//! never resurrected.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Good database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goods")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning category
    pub category_id: i64,
    /// External identifier (phone number), unique across the store
    #[sea_orm(unique)]
    pub phone_number: String,
    /// Session file contents
    pub payload: Vec<u8>,
    /// Backing file relative to the stock root, e.g. `+95 Myanmar/959123.session`
    pub source_path: String,
    /// Sold flag
    pub is_sold: bool,
    /// Buyer, set when sold
    pub buyer_id: Option<i64>,
    /// When the good was sold
    pub sold_at: Option<DateTimeUtc>,
    /// When the good was imported from disk
    pub added_at: DateTimeUtc,
}

/// Defines relationships between Good and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each good belongs to one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    /// Buyer of the good
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::BuyerId",
        to = "super::user::Column::UserId"
    )]
    Buyer,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Buyer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
