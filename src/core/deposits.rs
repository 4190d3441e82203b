//! Deposit requests - manual (screenshot proof, admin decision) and automated (invoice poll).
//!
//! Every transition is a compare-and-set on the status column inside a transaction that also
//! carries the credit, so a request is credited at most once no matter how many admins click
//! or how often the user polls. Notifications go out after commit and never undo a decision.

use crate::{
    core::{ledger, localization::Translator, money, users},
    entities::{Deposit, DepositStatus, deposit, user},
    errors::{Error, Result},
    gateway::{Action, ActionStyle, ChatId, MessageRef, MessagingGateway},
    payments::{DEFAULT_ASSET, InvoiceStatus, PaymentProvider},
};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{error, info, instrument, warn};

/// Method label stored for invoice deposits.
pub const INVOICE_METHOD: &str = "Crypto Bot";

/// Appended to the admin record when the user could not be told about the decision.
pub const NOTIFY_FAILED_NOTE: &str = "⚠️ User could not be notified!";

/// Outcome of polling an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceCheck {
    /// Paid: the deposit is approved and credited
    Paid(deposit::Model),
    /// Expired: the deposit is rejected
    Expired(deposit::Model),
    /// Not paid yet: nothing changed
    Pending(deposit::Model),
}

/// Callback id of the admin approve button.
#[must_use]
pub fn approve_action_id(deposit_id: i64) -> String {
    format!("deposit_approve_{deposit_id}")
}

/// Callback id of the admin reject button.
#[must_use]
pub fn reject_action_id(deposit_id: i64) -> String {
    format!("deposit_reject_{deposit_id}")
}

/// Callback id of the user's "I have paid" button.
#[must_use]
pub fn check_payment_action_id(deposit_id: i64) -> String {
    format!("check_payment_{deposit_id}")
}

/// Finds a deposit by id.
pub async fn get_deposit<C>(db: &C, deposit_id: i64) -> Result<deposit::Model>
where
    C: ConnectionTrait,
{
    Deposit::find_by_id(deposit_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "Deposit",
            key: deposit_id.to_string(),
        })
}

fn validate_amount(amount: Decimal) -> Result<i64> {
    let cents = money::to_positive_cents(amount)?;
    if amount < money::MINIMUM_TRANSFER {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(cents)
}

/// Records a manual deposit awaiting admin review.
#[instrument(skip(db))]
pub async fn create_manual_deposit(
    db: &DatabaseConnection,
    user_id: i64,
    payment_method: &str,
    amount: Decimal,
    proof_ref: &str,
) -> Result<deposit::Model> {
    let amount_cents = validate_amount(amount)?;
    users::require_user(db, user_id).await?;

    let model = deposit::ActiveModel {
        user_id: Set(user_id),
        amount_cents: Set(amount_cents),
        payment_method: Set(payment_method.to_string()),
        status: Set(DepositStatus::Pending),
        proof_ref: Set(Some(proof_ref.to_string())),
        invoice_id: Set(None),
        pay_url: Set(None),
        admin_channel_id: Set(None),
        admin_message_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    info!(
        "User {} submitted manual deposit request #{} for {}",
        user_id,
        created.id,
        created.amount()
    );
    Ok(created)
}

/// Creates a provider invoice and records a deposit waiting for its payment.
///
/// Nothing is stored when the provider fails.
#[instrument(skip(db, provider))]
pub async fn create_invoice_deposit(
    db: &DatabaseConnection,
    provider: &dyn PaymentProvider,
    user_id: i64,
    amount: Decimal,
) -> Result<deposit::Model> {
    let amount_cents = validate_amount(amount)?;
    users::require_user(db, user_id).await?;

    let invoice = provider
        .create_invoice(amount, DEFAULT_ASSET, "Add Funds")
        .await?;

    let model = deposit::ActiveModel {
        user_id: Set(user_id),
        amount_cents: Set(amount_cents),
        payment_method: Set(INVOICE_METHOD.to_string()),
        status: Set(DepositStatus::Waiting),
        proof_ref: Set(None),
        invoice_id: Set(Some(invoice.invoice_id)),
        pay_url: Set(Some(invoice.pay_url)),
        admin_channel_id: Set(None),
        admin_message_id: Set(None),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    info!(
        "User {} created invoice {} for deposit #{}",
        user_id, invoice.invoice_id, created.id
    );
    Ok(created)
}

/// Stores the reference of the admin record posted for a deposit.
pub async fn attach_admin_message(
    db: &DatabaseConnection,
    deposit_id: i64,
    message: MessageRef,
) -> Result<deposit::Model> {
    let mut active: deposit::ActiveModel = get_deposit(db, deposit_id).await?.into();
    active.admin_channel_id = Set(i64::try_from(message.channel_id).ok());
    active.admin_message_id = Set(i64::try_from(message.message_id).ok());
    active.update(db).await.map_err(Into::into)
}

/// Admin record of a pending manual deposit.
#[must_use]
pub fn review_caption(deposit: &deposit::Model, user: &user::Model) -> String {
    format!(
        "**⚠️ New Deposit Request #{}**\n\n👤 **User:** {}\n💵 **Amount Claimed:** ${:.2}\n💳 **Method:** {}",
        deposit.id,
        user.mention(),
        deposit.amount(),
        deposit.payment_method
    )
}

/// Posts a manual deposit to the admin channel with approve/reject actions.
///
/// A failed post is logged and leaves the deposit pending without an admin reference.
pub async fn submit_for_review(
    db: &DatabaseConnection,
    gateway: &dyn MessagingGateway,
    admin_channel_id: u64,
    deposit: deposit::Model,
    user: &user::Model,
) -> Result<deposit::Model> {
    let actions = [
        Action::callback(approve_action_id(deposit.id), "✅ Approve", ActionStyle::Success),
        Action::callback(reject_action_id(deposit.id), "❌ Reject", ActionStyle::Danger),
    ];
    let proof = deposit.proof_ref.clone().unwrap_or_default();

    match gateway
        .send_photo(
            ChatId::Channel(admin_channel_id),
            &proof,
            &review_caption(&deposit, user),
            &actions,
        )
        .await
    {
        Ok(message) => attach_admin_message(db, deposit.id, message).await,
        Err(e) => {
            error!("Error sending deposit #{} to admin channel: {}", deposit.id, e);
            Ok(deposit)
        }
    }
}

async fn transition(
    db: &DatabaseConnection,
    deposit_id: i64,
    from: DepositStatus,
    to: DepositStatus,
) -> Result<deposit::Model> {
    let txn = db.begin().await?;
    let deposit = get_deposit(&txn, deposit_id).await?;

    let result = Deposit::update_many()
        .col_expr(deposit::Column::Status, Expr::value(to))
        .filter(deposit::Column::Id.eq(deposit_id))
        .filter(deposit::Column::Status.eq(from))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        txn.rollback().await?;
        return Err(Error::AlreadyProcessed {
            request: format!("deposit #{deposit_id}"),
        });
    }

    if to == DepositStatus::Approved {
        ledger::credit_in(&txn, deposit.user_id, deposit.amount()).await?;
    }
    txn.commit().await?;

    Ok(deposit::Model {
        status: to,
        ..deposit
    })
}

/// Approves a pending manual deposit and credits the user, exactly once.
///
/// Invoice deposits are settled only by [`check_invoice`].
///
/// # Errors
/// `AlreadyProcessed` when the deposit is not pending.
#[instrument(skip(db))]
pub async fn approve_deposit(db: &DatabaseConnection, deposit_id: i64) -> Result<deposit::Model> {
    let approved =
        transition(db, deposit_id, DepositStatus::Pending, DepositStatus::Approved).await?;
    info!(
        "Deposit #{} approved: {} credited to user {}",
        approved.id,
        approved.amount(),
        approved.user_id
    );
    Ok(approved)
}

/// Rejects a pending manual deposit.
#[instrument(skip(db))]
pub async fn reject_deposit(db: &DatabaseConnection, deposit_id: i64) -> Result<deposit::Model> {
    let rejected =
        transition(db, deposit_id, DepositStatus::Pending, DepositStatus::Rejected).await?;
    info!("Deposit #{} rejected", rejected.id);
    Ok(rejected)
}

/// Polls the provider for a waiting invoice deposit and applies the result.
///
/// # Errors
/// - `AlreadyProcessed` when the deposit is not waiting
/// - `ExternalProviderUnavailable` when the provider fails or does not know the invoice;
///   the deposit stays waiting
#[instrument(skip(db, provider))]
pub async fn check_invoice(
    db: &DatabaseConnection,
    provider: &dyn PaymentProvider,
    deposit_id: i64,
) -> Result<InvoiceCheck> {
    let deposit = get_deposit(db, deposit_id).await?;
    let (DepositStatus::Waiting, Some(invoice_id)) = (deposit.status, deposit.invoice_id) else {
        return Err(Error::AlreadyProcessed {
            request: format!("deposit #{deposit_id}"),
        });
    };

    let states = provider.get_invoices(&[invoice_id]).await?;
    let Some(state) = states.into_iter().find(|s| s.invoice_id == invoice_id) else {
        warn!("Invoice {} for deposit #{} not returned by provider", invoice_id, deposit_id);
        return Err(Error::ExternalProviderUnavailable {
            provider: "Crypto Pay",
            reason: format!("invoice {invoice_id} not found"),
        });
    };

    match state.status {
        InvoiceStatus::Paid => {
            let approved =
                transition(db, deposit_id, DepositStatus::Waiting, DepositStatus::Approved)
                    .await?;
            info!(
                "Invoice payment for deposit #{} confirmed: {} credited to user {}",
                deposit_id,
                approved.amount(),
                approved.user_id
            );
            Ok(InvoiceCheck::Paid(approved))
        }
        InvoiceStatus::Expired => {
            let rejected =
                transition(db, deposit_id, DepositStatus::Waiting, DepositStatus::Rejected)
                    .await?;
            warn!("Invoice for deposit #{} expired", deposit_id);
            Ok(InvoiceCheck::Expired(rejected))
        }
        InvoiceStatus::Active => Ok(InvoiceCheck::Pending(deposit)),
    }
}

/// Text sent to the user once a deposit is decided.
#[must_use]
pub fn user_notice(tr: &Translator, language: &str, deposit: &deposit::Model) -> String {
    match deposit.status {
        DepositStatus::Approved => tr.format(
            language,
            "deposit_approved",
            &[("amount", &format!("{:.2}", deposit.amount()))],
        ),
        DepositStatus::Rejected => tr.get(language, "deposit_rejected"),
        DepositStatus::Pending | DepositStatus::Waiting => {
            tr.format(language, "deposit_processing", &[("id", &deposit.id)])
        }
    }
}

/// Final text of the admin record of a decided deposit.
#[must_use]
pub fn resolution_caption(
    deposit: &deposit::Model,
    user: &user::Model,
    actor: &str,
    user_notified: bool,
) -> String {
    let (icon, status) = match deposit.status {
        DepositStatus::Approved => ("✅", "APPROVED"),
        DepositStatus::Rejected => ("❌", "REJECTED"),
        DepositStatus::Pending | DepositStatus::Waiting => ("⏳", "OPEN"),
    };
    let mut caption = format!(
        "**{icon} DEPOSIT #{} {status}**\n\n- User: {}\n- Amount: ${:.2}\n- Action by: {actor}",
        deposit.id,
        user.mention(),
        deposit.amount()
    );
    if !user_notified {
        caption.push_str("\n\n**");
        caption.push_str(NOTIFY_FAILED_NOTE);
        caption.push_str("**");
    }
    caption
}

/// Tells the user about a decision and finalizes the admin record.
///
/// Returns whether the user was reached. Failures are logged, never propagated: the decision
/// is already committed.
pub async fn announce_resolution(
    gateway: &dyn MessagingGateway,
    tr: &Translator,
    deposit: &deposit::Model,
    user: &user::Model,
    actor: &str,
) -> bool {
    let recipient = ChatId::User(user.user_id.unsigned_abs());
    let notice = user_notice(tr, &user.language_code, deposit);
    let user_notified = match gateway.send_text(recipient, &notice).await {
        Ok(_) => true,
        Err(e) => {
            error!("Could not notify user {} about deposit #{}: {}", user.user_id, deposit.id, e);
            false
        }
    };

    if let (Some(channel_id), Some(message_id)) = (deposit.admin_channel_id, deposit.admin_message_id)
    {
        let record = MessageRef {
            channel_id: channel_id.unsigned_abs(),
            message_id: message_id.unsigned_abs(),
        };
        let caption = resolution_caption(deposit, user, actor, user_notified);
        if let Err(e) = gateway.edit_text(record, &caption).await {
            error!("Error editing admin record of deposit #{}: {}", deposit.id, e);
        }
    }

    user_notified
}

/// Reports a confirmed invoice payment to the admin channel.
pub async fn announce_invoice_payment(
    gateway: &dyn MessagingGateway,
    admin_channel_id: u64,
    deposit: &deposit::Model,
    user: &user::Model,
) {
    let text = format!(
        "✅ **Crypto Bot Deposit Approved**\n\n👤 **User:** {}\n💵 **Amount:** ${:.2}\n🆔 Invoice ID: `{}`",
        user.mention(),
        deposit.amount(),
        deposit.invoice_id.unwrap_or_default()
    );
    if let Err(e) = gateway.send_text(ChatId::Channel(admin_channel_id), &text).await {
        error!("Error sending to admin channel: {}", e);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::gateway::GatewayError;
    use crate::test_utils::*;

    const ADMIN_CHANNEL: u64 = 900;

    #[tokio::test]
    async fn test_minimum_and_precision_enforced() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, 1, 0).await?;

        let below = create_manual_deposit(&db, 1, "Binance Pay", Decimal::new(99, 2), "p").await;
        assert!(matches!(below, Err(Error::InvalidAmount { .. })));
        let sub_cent =
            create_manual_deposit(&db, 1, "Binance Pay", Decimal::new(1001, 3), "p").await;
        assert!(matches!(sub_cent, Err(Error::InvalidAmount { .. })));
        let unknown = create_manual_deposit(&db, 2, "Binance Pay", Decimal::ONE, "p").await;
        assert!(matches!(unknown, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_double_approval_credits_once() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, 1, 0).await?;
        let deposit =
            create_manual_deposit(&db, 1, "Binance Pay", Decimal::new(10, 0), "proof").await?;
        assert_eq!(deposit.status, DepositStatus::Pending);

        let (first, second) = tokio::join!(
            approve_deposit(&db, deposit.id),
            approve_deposit(&db, deposit.id)
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::AlreadyProcessed { .. }))));

        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(10, 0));
        assert!(matches!(
            reject_deposit(&db, deposit.id).await,
            Err(Error::AlreadyProcessed { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_invoice_rejects_then_already_processed() -> Result<()> {
        let db = setup_test_db().await?;
        let provider = StubPaymentProvider::default();
        create_test_user(&db, 1, 0).await?;

        let deposit = create_invoice_deposit(&db, &provider, 1, Decimal::new(10, 0)).await?;
        assert_eq!(deposit.status, DepositStatus::Waiting);
        assert!(deposit.pay_url.is_some());
        let invoice_id = deposit.invoice_id.unwrap();

        provider.set_status(invoice_id, InvoiceStatus::Expired);
        let check = check_invoice(&db, &provider, deposit.id).await?;
        assert!(matches!(check, InvoiceCheck::Expired(d) if d.status == DepositStatus::Rejected));

        let again = check_invoice(&db, &provider, deposit.id).await;
        assert!(matches!(again, Err(Error::AlreadyProcessed { .. })));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_paid_invoice_credits_and_active_waits() -> Result<()> {
        let db = setup_test_db().await?;
        let provider = StubPaymentProvider::default();
        create_test_user(&db, 1, 0).await?;

        let deposit = create_invoice_deposit(&db, &provider, 1, Decimal::new(5, 0)).await?;
        let check = check_invoice(&db, &provider, deposit.id).await?;
        assert!(matches!(check, InvoiceCheck::Pending(_)));

        provider.set_status(deposit.invoice_id.unwrap(), InvoiceStatus::Paid);
        let check = check_invoice(&db, &provider, deposit.id).await?;
        assert!(matches!(check, InvoiceCheck::Paid(d) if d.status == DepositStatus::Approved));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(5, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_buttons_cannot_settle_invoice_deposit() -> Result<()> {
        let db = setup_test_db().await?;
        let provider = StubPaymentProvider::default();
        create_test_user(&db, 1, 0).await?;
        let deposit = create_invoice_deposit(&db, &provider, 1, Decimal::new(5, 0)).await?;

        assert!(matches!(
            approve_deposit(&db, deposit.id).await,
            Err(Error::AlreadyProcessed { .. })
        ));
        assert!(matches!(
            reject_deposit(&db, deposit.id).await,
            Err(Error::AlreadyProcessed { .. })
        ));
        assert_eq!(get_deposit(&db, deposit.id).await?.status, DepositStatus::Waiting);
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::ZERO);

        // The invoice poll still settles it
        provider.set_status(deposit.invoice_id.unwrap(), InvoiceStatus::Paid);
        assert!(matches!(
            check_invoice(&db, &provider, deposit.id).await?,
            InvoiceCheck::Paid(_)
        ));
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(5, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_outage_leaves_deposit_waiting() -> Result<()> {
        let db = setup_test_db().await?;
        let provider = StubPaymentProvider::default();
        create_test_user(&db, 1, 0).await?;
        let deposit = create_invoice_deposit(&db, &provider, 1, Decimal::new(5, 0)).await?;

        provider.set_unavailable(true);
        let result = check_invoice(&db, &provider, deposit.id).await;
        assert!(matches!(result, Err(Error::ExternalProviderUnavailable { .. })));
        assert_eq!(
            get_deposit(&db, deposit.id).await?.status,
            DepositStatus::Waiting
        );

        let result = create_invoice_deposit(&db, &provider, 1, Decimal::new(5, 0)).await;
        assert!(matches!(result, Err(Error::ExternalProviderUnavailable { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_user_notice_follows_user_language() -> Result<()> {
        let db = setup_test_db().await?;
        let gateway = RecordingGateway::default();
        let tr = Translator::embedded()?;
        let user = users::set_language(&db, create_test_user(&db, 1, 0).await?.user_id, "ru").await?;
        let deposit = create_manual_deposit(&db, 1, "TON", Decimal::new(20, 0), "proof").await?;

        let approved = approve_deposit(&db, deposit.id).await?;
        assert!(announce_resolution(&gateway, &tr, &approved, &user, "Admin").await);

        let texts = gateway.texts_to(ChatId::User(1));
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Пополнение одобрено"));
        assert!(texts[0].contains("$20.00"));
        Ok(())
    }

    #[tokio::test]
    async fn test_review_and_failed_notification_annotates_record() -> Result<()> {
        let db = setup_test_db().await?;
        let gateway = RecordingGateway::default();
        let user = create_test_user(&db, 1, 0).await?;
        let deposit = create_manual_deposit(&db, 1, "TON", Decimal::new(20, 0), "proof-url").await?;

        let deposit = submit_for_review(&db, &gateway, ADMIN_CHANNEL, deposit, &user).await?;
        assert!(deposit.admin_message_id.is_some());
        let photos = gateway.photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].1, "proof-url");
        assert!(photos[0].3.contains(&approve_action_id(deposit.id)));

        let approved = approve_deposit(&db, deposit.id).await?;
        gateway.fail_for(ChatId::User(1), GatewayError::Unreachable { recipient: 1 });
        let tr = Translator::embedded()?;
        let notified = announce_resolution(&gateway, &tr, &approved, &user, "Admin").await;

        assert!(!notified);
        let edits = gateway.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].1.contains("APPROVED"));
        assert!(edits[0].1.contains(NOTIFY_FAILED_NOTE));
        // The decision stands
        assert_eq!(ledger::balance(&db, 1).await?, Decimal::new(20, 0));
        Ok(())
    }
}
