//! Deposit entity - a request to add funds, resolved manually by an admin or automatically
//! through an invoice poll.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a deposit request. `Approved` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum DepositStatus {
    /// Manual deposit awaiting an admin decision
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Invoice created, awaiting payment confirmation
    #[sea_orm(string_value = "waiting")]
    Waiting,
    /// Funds credited
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Declined or invoice expired
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Deposit database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deposits")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Requesting user
    pub user_id: i64,
    /// Requested amount in cents
    pub amount_cents: i64,
    /// Payment method label
    pub payment_method: String,
    /// Current status
    pub status: DepositStatus,
    /// Proof image handle for manual deposits
    pub proof_ref: Option<String>,
    /// Provider invoice id for automated deposits
    pub invoice_id: Option<i64>,
    /// Provider payment page
    pub pay_url: Option<String>,
    /// Channel of the admin record
    pub admin_channel_id: Option<i64>,
    /// Message id of the admin record
    pub admin_message_id: Option<i64>,
    /// Creation time
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Deposit and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each deposit belongs to one user
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
