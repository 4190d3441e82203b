//! Withdrawal entity - a user's request to pay out part of the balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a withdrawal request. `Completed` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum WithdrawalStatus {
    /// Awaiting an admin decision
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Paid out, balance debited
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Declined
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Withdrawal database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawals")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Requesting user
    pub user_id: i64,
    /// Requested amount in cents
    pub amount_cents: i64,
    /// Payout destination (wallet address or pay id)
    pub address: String,
    /// Current status
    pub status: WithdrawalStatus,
    /// Channel of the admin record
    pub admin_channel_id: Option<i64>,
    /// Message id of the admin record
    pub admin_message_id: Option<i64>,
    /// Creation time
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Withdrawal and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each withdrawal belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::UserId"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Requested amount as a fixed-point value.
    #[must_use]
    pub fn amount(&self) -> rust_decimal::Decimal {
        crate::core::money::from_cents(self.amount_cents)
    }
}
