//! Plain messages that continue a conversation started by a slash command.
//!
//! Messages from users without an active flow are ignored. Banned users are ignored too, and
//! users who left a required server are told to rejoin.

use crate::{
    bot::{
        BotData,
        commands::shop::run_purchase,
        conversation::Conversation,
        framework::{ensure_membership, register_author},
        gateway::action_rows,
        handlers::components::{BROADCAST_CANCEL, BROADCAST_CONFIRM},
    },
    core::{broadcast, deposits, withdrawals},
    entities::user,
    errors::{Error, Result},
    gateway::{Action, ActionStyle, MessageRef},
};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

/// Reads a purchase quantity typed by the buyer.
pub fn parse_quantity(input: &str) -> Result<u64> {
    match input.trim().parse::<u64>() {
        Ok(quantity) if quantity > 0 => Ok(quantity),
        _ => Err(Error::InvalidQuantity { quantity: 0 }),
    }
}

async fn say(ctx: &serenity::Context, message: &serenity::Message, text: &str) -> Result<()> {
    message.channel_id.say(&ctx.http, text).await?;
    Ok(())
}

/// Entry point for every non-bot message.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &BotData,
    message: &serenity::Message,
) -> Result<()> {
    let author = message.author.id.get();
    let Some(conversation) = data.conversations.current(author).await else {
        return Ok(());
    };

    let user = register_author(data, &message.author, None).await?;
    if user.is_banned {
        data.conversations.cancel(author).await;
        return Ok(());
    }

    let step = match ensure_membership(ctx, data, message.author.id).await {
        Ok(()) => continue_conversation(ctx, data, message, &user, conversation).await,
        Err(e) => Err(e),
    };
    let text = match step {
        Ok(Some(text)) => text,
        Ok(None) => return Ok(()),
        Err(e) => {
            if e.is_expected() {
                info!("Conversation step for user {} ended with: {}", author, e);
            } else {
                error!("Error continuing conversation for user {}: {:?}", author, e);
            }
            e.user_message(&data.translator, &user.language_code)
        }
    };
    say(ctx, message, &text).await
}

/// Runs one step; `None` means the step already answered on its own.
async fn continue_conversation(
    ctx: &serenity::Context,
    data: &BotData,
    message: &serenity::Message,
    user: &user::Model,
    conversation: Conversation,
) -> Result<Option<String>> {
    let author = message.author.id.get();
    let db = &data.database;
    let tr = &data.translator;
    let language = user.language_code.as_str();
    let user_id = user.user_id;

    match conversation {
        Conversation::Browsing { category_id } => {
            // A bad quantity keeps the flow open so the buyer can retry
            let quantity = parse_quantity(&message.content)?;
            data.conversations.take(author).await;
            run_purchase(data, user_id, category_id, quantity, language)
                .await
                .map(Some)
        }
        Conversation::AwaitingProof { method, amount } => {
            let Some(proof) = message
                .attachments
                .iter()
                .find(|a| a.content_type.as_deref().is_some_and(|t| t.starts_with("image/")))
            else {
                return Ok(Some(tr.get(language, "proof_image_required")));
            };
            data.conversations.take(author).await;

            let deposit =
                deposits::create_manual_deposit(db, user_id, &method, amount, &proof.url).await?;
            let deposit = deposits::submit_for_review(
                db,
                data.gateway.as_ref(),
                data.settings.admin_channel_id,
                deposit,
                user,
            )
            .await?;
            Ok(Some(tr.format(
                language,
                "deposit_submitted",
                &[
                    ("id", &deposit.id),
                    ("amount", &format!("{:.2}", deposit.amount())),
                ],
            )))
        }
        Conversation::AwaitingAddress { amount } => {
            data.conversations.take(author).await;
            let withdrawal =
                withdrawals::create_withdrawal(db, user_id, amount, &message.content).await?;
            let withdrawal = withdrawals::submit_for_review(
                db,
                data.gateway.as_ref(),
                data.settings.admin_channel_id,
                withdrawal,
                user,
            )
            .await?;
            Ok(Some(tr.format(
                language,
                "withdrawal_submitted",
                &[
                    ("id", &withdrawal.id),
                    ("amount", &format!("{:.2}", withdrawal.amount())),
                ],
            )))
        }
        Conversation::ComposingBroadcast { audience } => {
            let recipients = broadcast::resolve_audience(db, &audience).await?;
            if recipients.is_empty() {
                data.conversations.take(author).await;
                return Ok(Some("❌ No users match this audience.".to_string()));
            }

            let count = recipients.len();
            let source = MessageRef {
                channel_id: message.channel_id.get(),
                message_id: message.id.get(),
            };
            data.conversations
                .begin(author, Conversation::ConfirmingBroadcast { source, recipients })
                .await;

            let actions = [
                Action::callback(BROADCAST_CONFIRM, "✅ Send", ActionStyle::Success),
                Action::callback(BROADCAST_CANCEL, "❌ Cancel", ActionStyle::Danger),
            ];
            message
                .channel_id
                .send_message(
                    &ctx.http,
                    serenity::CreateMessage::new()
                        .content(format!(
                            "📣 **Preview above.** Send this message to {count} users?"
                        ))
                        .components(action_rows(&actions)),
                )
                .await?;
            Ok(None)
        }
        Conversation::ConfirmingBroadcast { .. } => Ok(Some(
            "Press **Send** or **Cancel** on the preview first.".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(" 3 ").ok(), Some(3));
        assert!(matches!(
            parse_quantity("0"),
            Err(Error::InvalidQuantity { .. })
        ));
        assert!(parse_quantity("two").is_err());
        assert!(parse_quantity("-1").is_err());
    }
}
