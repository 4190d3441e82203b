//! Withdrawal requests - admin-driven payouts.
//!
//! The balance is checked when the request is created and debited when an admin completes it,
//! in the same transaction as the status change. If the balance no longer covers the amount
//! at that point the completion fails and the request stays pending.

use crate::{
    core::{ledger, localization::Translator, money, users},
    entities::{Withdrawal, WithdrawalStatus, user, withdrawal},
    errors::{Error, Result},
    gateway::{Action, ActionStyle, ChatId, MessageRef, MessagingGateway},
};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{error, info, instrument};

/// Callback id of the admin complete button.
#[must_use]
pub fn complete_action_id(withdrawal_id: i64) -> String {
    format!("withdraw_complete_{withdrawal_id}")
}

/// Callback id of the admin reject button.
#[must_use]
pub fn reject_action_id(withdrawal_id: i64) -> String {
    format!("withdraw_reject_{withdrawal_id}")
}

/// Finds a withdrawal by id.
pub async fn get_withdrawal<C>(db: &C, withdrawal_id: i64) -> Result<withdrawal::Model>
where
    C: ConnectionTrait,
{
    Withdrawal::find_by_id(withdrawal_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "Withdrawal",
            key: withdrawal_id.to_string(),
        })
}

/// Checks a withdrawal amount against the minimum and the user's balance.
pub async fn validate_withdrawal_amount(
    db: &DatabaseConnection,
    user_id: i64,
    amount: Decimal,
) -> Result<()> {
    money::to_positive_cents(amount)?;
    if amount < money::MINIMUM_TRANSFER {
        return Err(Error::InvalidAmount { amount });
    }
    let balance = users::require_user(db, user_id).await?.balance();
    if amount > balance {
        return Err(Error::InsufficientFunds {
            balance,
            required: amount,
        });
    }
    Ok(())
}

/// Records a pending withdrawal to `address`.
///
/// # Errors
/// `InvalidAmount` below 1.00, `InsufficientFunds` above the current balance.
#[instrument(skip(db))]
pub async fn create_withdrawal(
    db: &DatabaseConnection,
    user_id: i64,
    amount: Decimal,
    address: &str,
) -> Result<withdrawal::Model> {
    validate_withdrawal_amount(db, user_id, amount).await?;
    let address = address.trim();
    if address.is_empty() {
        return Err(Error::Config {
            message: "Withdrawal address cannot be empty".to_string(),
        });
    }

    let model = withdrawal::ActiveModel {
        user_id: Set(user_id),
        amount_cents: Set(money::to_cents(amount)?),
        address: Set(address.to_string()),
        status: Set(WithdrawalStatus::Pending),
        admin_channel_id: Set(None),
        admin_message_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    info!(
        "User {} submitted withdrawal request #{} for {}",
        user_id,
        created.id,
        created.amount()
    );
    Ok(created)
}

/// Posts a withdrawal to the admin channel with complete/reject actions.
pub async fn submit_for_review(
    db: &DatabaseConnection,
    gateway: &dyn MessagingGateway,
    admin_channel_id: u64,
    withdrawal: withdrawal::Model,
    user: &user::Model,
) -> Result<withdrawal::Model> {
    let text = format!(
        "💸 **New Withdrawal Request #{}**\n\n👤 **User:** {}\n💰 **Amount:** ${:.2}\n🏦 **Address:** `{}`\n💳 **User Balance:** ${:.2}",
        withdrawal.id,
        user.mention(),
        withdrawal.amount(),
        withdrawal.address,
        user.balance()
    );
    let actions = [
        Action::callback(
            complete_action_id(withdrawal.id),
            "✅ Complete",
            ActionStyle::Success,
        ),
        Action::callback(reject_action_id(withdrawal.id), "❌ Reject", ActionStyle::Danger),
    ];

    match gateway
        .send_with_actions(ChatId::Channel(admin_channel_id), &text, &actions)
        .await
    {
        Ok(message) => {
            let mut active: withdrawal::ActiveModel = withdrawal.into();
            active.admin_channel_id = Set(i64::try_from(message.channel_id).ok());
            active.admin_message_id = Set(i64::try_from(message.message_id).ok());
            active.update(db).await.map_err(Into::into)
        }
        Err(e) => {
            error!(
                "Error sending withdrawal #{} to admin channel: {}",
                withdrawal.id, e
            );
            Ok(withdrawal)
        }
    }
}

async fn transition(
    db: &DatabaseConnection,
    withdrawal_id: i64,
    to: WithdrawalStatus,
) -> Result<withdrawal::Model> {
    let txn = db.begin().await?;
    let withdrawal = get_withdrawal(&txn, withdrawal_id).await?;

    let result = Withdrawal::update_many()
        .col_expr(withdrawal::Column::Status, Expr::value(to))
        .filter(withdrawal::Column::Id.eq(withdrawal_id))
        .filter(withdrawal::Column::Status.eq(WithdrawalStatus::Pending))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(Error::AlreadyProcessed {
            request: format!("withdrawal #{withdrawal_id}"),
        });
    }

    if to == WithdrawalStatus::Completed {
        // An insufficient balance aborts the transaction and the status change with it
        ledger::debit_in(&txn, withdrawal.user_id, withdrawal.amount()).await?;
    }
    txn.commit().await?;

    Ok(withdrawal::Model {
        status: to,
        ..withdrawal
    })
}

/// Marks a pending withdrawal as paid out and debits the user.
///
/// # Errors
/// - `AlreadyProcessed` when the request is no longer pending
/// - `InsufficientFunds` when the balance no longer covers it (request stays pending)
#[instrument(skip(db))]
pub async fn complete_withdrawal(
    db: &DatabaseConnection,
    withdrawal_id: i64,
) -> Result<withdrawal::Model> {
    let completed = transition(db, withdrawal_id, WithdrawalStatus::Completed).await?;
    info!(
        "Withdrawal #{} completed: {} debited from user {}",
        completed.id,
        completed.amount(),
        completed.user_id
    );
    Ok(completed)
}

/// Rejects a pending withdrawal; the balance is untouched.
#[instrument(skip(db))]
pub async fn reject_withdrawal(
    db: &DatabaseConnection,
    withdrawal_id: i64,
) -> Result<withdrawal::Model> {
    let rejected = transition(db, withdrawal_id, WithdrawalStatus::Rejected).await?;
    info!("Withdrawal #{} rejected", rejected.id);
    Ok(rejected)
}

/// Text sent to the user once a withdrawal is decided; `None` while it is pending.
#[must_use]
pub fn user_notice(
    tr: &Translator,
    language: &str,
    withdrawal: &withdrawal::Model,
) -> Option<String> {
    let amount = format!("{:.2}", withdrawal.amount());
    match withdrawal.status {
        WithdrawalStatus::Completed => Some(tr.format(
            language,
            "withdrawal_completed",
            &[("amount", &amount), ("address", &withdrawal.address)],
        )),
        WithdrawalStatus::Rejected => Some(tr.format(
            language,
            "withdrawal_rejected",
            &[("amount", &amount)],
        )),
        WithdrawalStatus::Pending => None,
    }
}

/// Tells the user about a decision and finalizes the admin record.
///
/// Returns whether the user was reached.
pub async fn announce_resolution(
    gateway: &dyn MessagingGateway,
    tr: &Translator,
    withdrawal: &withdrawal::Model,
    user: &user::Model,
    actor: &str,
) -> bool {
    let Some(notice) = user_notice(tr, &user.language_code, withdrawal) else {
        return false;
    };
    let (icon, status) = if withdrawal.status == WithdrawalStatus::Completed {
        ("✅", "COMPLETED")
    } else {
        ("❌", "REJECTED")
    };

    let recipient = ChatId::User(user.user_id.unsigned_abs());
    let user_notified = match gateway.send_text(recipient, &notice).await {
        Ok(_) => true,
        Err(e) => {
            error!(
                "Could not notify user {} about withdrawal #{}: {}",
                user.user_id, withdrawal.id, e
            );
            false
        }
    };

    if let (Some(channel_id), Some(message_id)) =
        (withdrawal.admin_channel_id, withdrawal.admin_message_id)
    {
        let mut text = format!(
            "**{icon} WITHDRAWAL #{} {status}**\n\n- User: {}\n- Amount: ${:.2}\n- Address: `{}`\n- Action by: {actor}",
            withdrawal.id,
            user.mention(),
            withdrawal.amount(),
            withdrawal.address
        );
        if !user_notified {
            text.push_str("\n\n**");
            text.push_str(crate::core::deposits::NOTIFY_FAILED_NOTE);
            text.push_str("**");
        }
        let record = MessageRef {
            channel_id: channel_id.unsigned_abs(),
            message_id: message_id.unsigned_abs(),
        };
        if let Err(e) = gateway.edit_text(record, &text).await {
            error!(
                "Error editing admin record of withdrawal #{}: {}",
                withdrawal.id, e
            );
        }
    }

    user_notified
}
