//! Category entity - a country grouping of goods with its own unit price.
//!
//! `stock_count` is a denormalized cache of unsold goods, refreshed by resynchronization and
//! by the purchase reservation step.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Country name, matched against stock folder names
    #[sea_orm(unique)]
    pub name: String,
    /// Display calling code, e.g. `+95`
    pub code: String,
    /// Flag emoji shown next to the name
    pub flag_emoji: String,
    /// Price of one good, in cents
    pub price_cents: i64,
    /// Cached number of unsold goods
    pub stock_count: i64,
    /// Inactive categories are hidden from buyers
    pub is_active: bool,
}

/// Defines relationships between Category and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One category has many goods
    #[sea_orm(has_many = "super::good::Entity")]
    Goods,
}

impl Related<super::good::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Goods.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Unit price as a fixed-point amount.
    #[must_use]
    pub fn price(&self) -> rust_decimal::Decimal {
        crate::core::money::from_cents(self.price_cents)
    }

    /// `🇲🇲 Myanmar` style label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.flag_emoji, self.name)
    }
}
