//! User entity - one row per chat user who ever contacted the bot.
//!
//! Rows are created lazily on first contact. `balance_cents` is only mutated through the
//! ledger (`core::ledger`) and never goes negative.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Chat platform user id
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    /// Platform username, if the user has one
    pub username: Option<String>,
    /// Display name at registration time
    pub first_name: String,
    /// Balance in cents
    pub balance_cents: i64,
    /// Interface language code (`en`, `ru`, `zh`)
    pub language_code: String,
    /// Display currency (`USD`, `RUB`, `CNY`)
    pub currency: String,
    /// Banned users are ignored by every command
    pub is_banned: bool,
    /// First contact
    pub registered_at: DateTimeUtc,
}

/// Defines relationships between User and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Goods bought by this user
    #[sea_orm(has_many = "super::good::Entity")]
    Goods,
    /// Deposit requests
    #[sea_orm(has_many = "super::deposit::Entity")]
    Deposits,
    /// Withdrawal requests
    #[sea_orm(has_many = "super::withdrawal::Entity")]
    Withdrawals,
}

impl Related<super::good::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Goods.def()
    }
}

impl Related<super::deposit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deposits.def()
    }
}

impl Related<super::withdrawal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Withdrawals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Balance as a fixed-point amount.
    #[must_use]
    pub fn balance(&self) -> rust_decimal::Decimal {
        crate::core::money::from_cents(self.balance_cents)
    }

    /// `@username` when available, otherwise the display name and id.
    #[must_use]
    pub fn mention(&self) -> String {
        self.username.as_ref().map_or_else(
            || format!("{} (ID: {})", self.first_name, self.user_id),
            |username| format!("@{username}"),
        )
    }
}
