//! Button click handling.
//!
//! Callback ids are built by the core (`deposit_approve_<id>`, `check_payment_<id>`, ...) and
//! parsed back here. Every click gets an ephemeral answer in the clicker's language; expected
//! outcomes such as a request that was already decided are answered, not logged as errors.

use crate::{
    bot::{
        BotData,
        framework::{ensure_membership, register_author, user_key, user_language},
    },
    core::{
        broadcast,
        deposits::{self, InvoiceCheck},
        users, withdrawals,
    },
    errors::{Error, Result},
    gateway::ChatId,
};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Callback id of the broadcast confirm button.
pub const BROADCAST_CONFIRM: &str = "broadcast_confirm";

/// Callback id of the broadcast cancel button.
pub const BROADCAST_CANCEL: &str = "broadcast_cancel";

/// A recognized button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAction {
    /// Admin approves a deposit
    ApproveDeposit(i64),
    /// Admin rejects a deposit
    RejectDeposit(i64),
    /// Admin marks a withdrawal as paid out
    CompleteWithdrawal(i64),
    /// Admin rejects a withdrawal
    RejectWithdrawal(i64),
    /// User asks whether their invoice was paid
    CheckPayment(i64),
    /// Admin sends the previewed broadcast
    ConfirmBroadcast,
    /// Admin drops the previewed broadcast
    CancelBroadcast,
}

impl ComponentAction {
    /// Parses a callback id.
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        let with_id = |prefix: &str| {
            custom_id
                .strip_prefix(prefix)
                .and_then(|id| id.parse::<i64>().ok())
        };

        match custom_id {
            BROADCAST_CONFIRM => return Some(Self::ConfirmBroadcast),
            BROADCAST_CANCEL => return Some(Self::CancelBroadcast),
            _ => {}
        }

        with_id("deposit_approve_")
            .map(Self::ApproveDeposit)
            .or_else(|| with_id("deposit_reject_").map(Self::RejectDeposit))
            .or_else(|| with_id("withdraw_complete_").map(Self::CompleteWithdrawal))
            .or_else(|| with_id("withdraw_reject_").map(Self::RejectWithdrawal))
            .or_else(|| with_id("check_payment_").map(Self::CheckPayment))
    }

    /// Whether only admins may press it.
    #[must_use]
    pub const fn requires_admin(self) -> bool {
        !matches!(self, Self::CheckPayment(_))
    }
}

async fn respond(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    text: &str,
) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(text)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Entry point for every component interaction.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &BotData,
    component: &serenity::ComponentInteraction,
) -> Result<()> {
    let Some(action) = ComponentAction::parse(&component.data.custom_id) else {
        warn!("Unknown component id '{}'", component.data.custom_id);
        return Ok(());
    };

    let clicker = component.user.id.get();
    let language = user_language(data, component.user.id).await;
    if action.requires_admin() && !data.is_admin(clicker) {
        let text = data.translator.get(&language, "check_admin_only_button");
        return respond(ctx, component, &text).await;
    }

    let outcome = match ensure_membership(ctx, data, component.user.id).await {
        Ok(()) => run_action(data, component, action, &language).await,
        Err(e) => Err(e),
    };
    let text = match outcome {
        Ok(text) => text,
        Err(e) => {
            if e.is_expected() {
                info!("Component {:?} ended with: {}", action, e);
            } else {
                error!("Error handling component {:?}: {:?}", action, e);
            }
            e.user_message(&data.translator, &language)
        }
    };
    respond(ctx, component, &text).await
}

async fn run_action(
    data: &BotData,
    component: &serenity::ComponentInteraction,
    action: ComponentAction,
    language: &str,
) -> Result<String> {
    let db = &data.database;
    let gateway = data.gateway.as_ref();
    let tr = &data.translator;
    let actor = format!("@{}", component.user.name);

    match action {
        ComponentAction::ApproveDeposit(id) | ComponentAction::RejectDeposit(id) => {
            let deposit = if matches!(action, ComponentAction::ApproveDeposit(_)) {
                deposits::approve_deposit(db, id).await?
            } else {
                deposits::reject_deposit(db, id).await?
            };
            let user = users::require_user(db, deposit.user_id).await?;
            let notified =
                deposits::announce_resolution(gateway, tr, &deposit, &user, &actor).await;
            Ok(resolution_reply("Deposit", id, notified))
        }
        ComponentAction::CompleteWithdrawal(id) | ComponentAction::RejectWithdrawal(id) => {
            let withdrawal = if matches!(action, ComponentAction::CompleteWithdrawal(_)) {
                withdrawals::complete_withdrawal(db, id).await?
            } else {
                withdrawals::reject_withdrawal(db, id).await?
            };
            let user = users::require_user(db, withdrawal.user_id).await?;
            let notified =
                withdrawals::announce_resolution(gateway, tr, &withdrawal, &user, &actor).await;
            Ok(resolution_reply("Withdrawal", id, notified))
        }
        ComponentAction::CheckPayment(id) => check_payment(data, component, id, language).await,
        ComponentAction::ConfirmBroadcast => {
            let Some((source, recipients)) = data.conversations.take_broadcast(component.user.id.get()).await
            else {
                return Ok("Nothing to send. Start again with `/admin broadcast`.".to_string());
            };
            let count = recipients.len();
            let gateway = Arc::clone(&data.gateway);
            let delay = data.settings.broadcast_delay;
            let report_to = ChatId::Channel(component.channel_id.get());
            tokio::spawn(async move {
                let report = broadcast::broadcast(gateway.as_ref(), source, &recipients, delay).await;
                if let Err(e) = gateway.send_text(report_to, &report.summary()).await {
                    warn!("Could not deliver broadcast summary: {}", e);
                }
            });
            Ok(format!("⏳ Broadcasting to {count} users..."))
        }
        ComponentAction::CancelBroadcast => {
            data.conversations.cancel(component.user.id.get()).await;
            Ok("❌ Broadcast cancelled.".to_string())
        }
    }
}

fn resolution_reply(kind: &str, id: i64, notified: bool) -> String {
    if notified {
        format!("✅ {kind} #{id} processed.")
    } else {
        format!("✅ {kind} #{id} processed, but the user could not be notified.")
    }
}

async fn check_payment(
    data: &BotData,
    component: &serenity::ComponentInteraction,
    deposit_id: i64,
    language: &str,
) -> Result<String> {
    let db = &data.database;
    let tr = &data.translator;
    let user = register_author(data, &component.user, None).await?;
    if user.is_banned {
        return Ok(tr.get(language, "check_blocked"));
    }
    let Some(provider) = data.payments.as_deref() else {
        return Ok(tr.get(language, "topup_unavailable"));
    };

    let deposit = deposits::get_deposit(db, deposit_id).await?;
    if deposit.user_id != user_key(component.user.id)? {
        return Err(Error::NotFound {
            entity: "Deposit",
            key: deposit_id.to_string(),
        });
    }

    match deposits::check_invoice(db, provider, deposit_id).await? {
        InvoiceCheck::Paid(deposit) => {
            deposits::announce_invoice_payment(
                data.gateway.as_ref(),
                data.settings.admin_channel_id,
                &deposit,
                &user,
            )
            .await;
            Ok(tr.format(
                language,
                "payment_confirmed",
                &[("amount", &format!("{:.2}", deposit.amount()))],
            ))
        }
        InvoiceCheck::Expired(_) => Ok(tr.get(language, "invoice_expired")),
        InvoiceCheck::Pending(_) => Ok(tr.get(language, "payment_pending")),
    }
}
