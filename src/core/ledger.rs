//! Balance ledger - the only code allowed to change `users.balance_cents`.
//!
//! Every mutation is a single conditional `UPDATE`, so two concurrent requests for the same
//! user can never interleave a read-modify-write. A debit only matches rows whose balance still
//! covers the amount; zero affected rows means insufficient funds (or a missing user).
//!
//! The `*_in` variants run inside a caller-owned transaction so a status change and the
//! matching balance change commit together.

use crate::{
    core::money,
    entities::{User, user},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, instrument};

/// Increases a user's balance and returns the updated user.
#[instrument(skip(db))]
pub async fn credit(db: &DatabaseConnection, user_id: i64, amount: Decimal) -> Result<user::Model> {
    let txn = db.begin().await?;
    let updated = credit_in(&txn, user_id, amount).await?;
    txn.commit().await?;
    Ok(updated)
}

/// Decreases a user's balance and returns the updated user.
///
/// Fails with `InsufficientFunds` when the balance does not cover `amount`; the balance is
/// left untouched in that case.
#[instrument(skip(db))]
pub async fn debit(db: &DatabaseConnection, user_id: i64, amount: Decimal) -> Result<user::Model> {
    let txn = db.begin().await?;
    let updated = debit_in(&txn, user_id, amount).await?;
    txn.commit().await?;
    Ok(updated)
}

/// [`credit`] inside an existing connection or transaction.
pub async fn credit_in<C>(db: &C, user_id: i64, amount: Decimal) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let cents = money::to_positive_cents(amount)?;

    let result = User::update_many()
        .col_expr(
            user::Column::BalanceCents,
            Expr::col(user::Column::BalanceCents).add(cents),
        )
        .filter(user::Column::UserId.eq(user_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::NotFound {
            entity: "User",
            key: user_id.to_string(),
        });
    }

    debug!("Credited {} cents to user {}", cents, user_id);
    crate::core::users::require_user(db, user_id).await
}

/// [`debit`] inside an existing connection or transaction.
pub async fn debit_in<C>(db: &C, user_id: i64, amount: Decimal) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let cents = money::to_positive_cents(amount)?;

    // balance = balance - cents, only where the balance still covers it
    let result = User::update_many()
        .col_expr(
            user::Column::BalanceCents,
            Expr::col(user::Column::BalanceCents).sub(cents),
        )
        .filter(user::Column::UserId.eq(user_id))
        .filter(user::Column::BalanceCents.gte(cents))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let current = crate::core::users::require_user(db, user_id).await?;
        return Err(Error::InsufficientFunds {
            balance: current.balance(),
            required: amount,
        });
    }

    debug!("Debited {} cents from user {}", cents, user_id);
    crate::core::users::require_user(db, user_id).await
}

/// Current balance of a user.
pub async fn balance(db: &DatabaseConnection, user_id: i64) -> Result<Decimal> {
    Ok(crate::core::users::require_user(db, user_id)
        .await?
        .balance())
}
