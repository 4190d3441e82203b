//! Shop Discord commands - `stock` and `buy`.
//!
//! `buy` without a quantity starts the browsing flow: the next message from the buyer is read
//! as the quantity by the message handler, which finishes through [`run_purchase`].

use crate::{
    bot::BotData,
    core::{
        localization::Translator,
        purchase::{self, DeliveryStatus, PurchaseReceipt, PurchaseRequest},
    },
    errors::{Error, Result},
    gateway::ChatId,
};

/// Runs a purchase for a buyer and returns the text to show them in `language`.
pub async fn run_purchase(
    data: &BotData,
    user_id: i64,
    category_id: i64,
    quantity: u64,
    language: &str,
) -> Result<String> {
    let receipt = purchase::purchase(
        &data.database,
        data.gateway.as_ref(),
        &data.translator,
        &data.stock,
        Some(ChatId::Channel(data.settings.admin_channel_id)),
        PurchaseRequest {
            user_id,
            category_id,
            quantity,
        },
    )
    .await?;
    Ok(receipt_text(&data.translator, language, &receipt))
}

/// Buyer-facing summary of a finished sale.
#[must_use]
pub fn receipt_text(tr: &Translator, language: &str, receipt: &PurchaseReceipt) -> String {
    let summary = tr.format(
        language,
        "receipt",
        &[
            ("order", &receipt.order_id),
            ("quantity", &receipt.quantity),
            ("category", &receipt.category.label()),
            ("total", &format!("{:.2}", receipt.total)),
            ("balance", &format!("{:.2}", receipt.balance_after)),
        ],
    );
    let outcome = match &receipt.delivery {
        DeliveryStatus::Delivered(_) => tr.get(language, "receipt_delivered"),
        DeliveryStatus::Failed { reason } => Error::DeliveryFailed {
            order: receipt.order_id.clone(),
            reason: reason.clone(),
        }
        .user_message(tr, language),
    };
    format!("{summary}\n\n{outcome}")
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::run_purchase;
    use crate::{
        bot::{
            Context,
            conversation::Conversation,
            framework::{reply, user_key, user_language},
            handlers::autocomplete,
        },
        core::{inventory, users},
        errors::Result,
    };
    use poise::serenity_prelude as serenity;

    /// Lists the countries currently in stock with their prices.
    #[poise::command(slash_command, prefix_command)]
    pub async fn stock(ctx: Context<'_>) -> Result<()> {
        let data = ctx.data();
        let tr = &data.translator;
        let user = users::require_user(&data.database, user_key(ctx.author().id)?).await?;
        let language = user.language_code.as_str();
        let categories = inventory::list_available_categories(&data.database).await?;

        if categories.is_empty() {
            ctx.say(tr.get(language, "stock_empty")).await?;
            return Ok(());
        }

        let mut fields = Vec::with_capacity(categories.len());
        for category in categories {
            let price = data.converter.format(category.price(), &user.currency).await;
            fields.push((
                format!("{} ({})", category.label(), category.code),
                tr.format(
                    language,
                    "stock_entry",
                    &[("price", &price), ("count", &category.stock_count)],
                ),
                false,
            ));
        }

        let embed = serenity::CreateEmbed::default()
            .title(tr.get(language, "stock_title"))
            .color(0x0058_65F2)
            .fields(fields);
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Buys accounts from a country.
    ///
    /// Without a quantity you are asked for one in your next message.
    #[poise::command(slash_command, prefix_command)]
    pub async fn buy(
        ctx: Context<'_>,
        #[description = "Country to buy from"]
        #[autocomplete = "autocomplete::autocomplete_available_country"]
        country: String,
        #[description = "Number of accounts"]
        #[min = 1]
        quantity: Option<u64>,
    ) -> Result<()> {
        let data = ctx.data();
        let tr = &data.translator;
        let language = user_language(data, ctx.author().id).await;
        let category = inventory::require_category_by_name(&data.database, &country).await?;
        if !category.is_active || category.stock_count <= 0 {
            let text = tr.format(&language, "out_of_stock", &[("category", &category.label())]);
            reply(ctx, text).await?;
            return Ok(());
        }

        let user_id = user_key(ctx.author().id)?;
        if let Some(quantity) = quantity {
            ctx.defer().await?;
            let text = run_purchase(data, user_id, category.id, quantity, &language).await?;
            ctx.say(text).await?;
            return Ok(());
        }

        data.conversations
            .begin(
                ctx.author().id.get(),
                Conversation::Browsing {
                    category_id: category.id,
                },
            )
            .await;
        let prompt = tr.format(
            &language,
            "buy_prompt",
            &[
                ("category", &category.label()),
                ("price", &format!("{:.2}", category.price())),
                ("count", &category.stock_count),
            ],
        );
        reply(ctx, prompt).await
    }
}

// Re-export all commands
pub use inner::*;
