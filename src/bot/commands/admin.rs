//! Admin Discord commands - `/admin` and its subcommands.
//!
//! Every subcommand carries the admin check and the admin category so the error handler can
//! tell a denied admin command from a banned user.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            Context,
            conversation::Conversation,
            framework::{admin_check, reply},
            handlers::autocomplete,
        },
        core::{
            broadcast::{self, Audience},
            inventory::{self, NewCategory},
            ledger, money, stats, users,
        },
        entities::user,
        errors::{Error, Result},
        gateway::ChatId,
    };
    use std::fmt::Write;
    use tracing::{info, warn};

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum BroadcastTarget {
        #[name = "All users"]
        All,
        #[name = "Specific user ids"]
        Ids,
        #[name = "Buyers of a country"]
        Country,
    }

    fn parse_user_id(raw: &str) -> Result<i64> {
        raw.trim().parse::<i64>().map_err(|_| Error::NotFound {
            entity: "User",
            key: raw.trim().to_string(),
        })
    }

    async fn find_user(ctx: Context<'_>, query: &str) -> Result<user::Model> {
        let db = &ctx.data().database;
        if let Ok(id) = query.trim().parse::<i64>() {
            return users::require_user(db, id).await;
        }
        users::get_user_by_username(db, query)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: "User",
                key: query.to_string(),
            })
    }

    /// Parent command for store administration.
    #[poise::command(
        slash_command,
        category = "Admin",
        check = "admin_check",
        subcommands(
            "admin_stats",
            "admin_find_user",
            "admin_ban",
            "admin_unban",
            "admin_add_balance",
            "admin_remove_balance",
            "admin_country_add",
            "admin_country_list",
            "admin_country_price",
            "admin_country_delete",
            "admin_sync",
            "admin_broadcast"
        )
    )]
    pub async fn admin(ctx: Context<'_>) -> Result<()> {
        reply(
            ctx,
            "Admin command. Available subcommands: `stats`, `find_user`, `ban`, `unban`, \
            `add_balance`, `remove_balance`, `country_add`, `country_list`, `country_price`, \
            `country_delete`, `sync`, `broadcast`.",
        )
        .await
    }

    /// Shows store statistics.
    #[poise::command(slash_command, rename = "stats", category = "Admin", check = "admin_check")]
    pub async fn admin_stats(ctx: Context<'_>) -> Result<()> {
        let collected = stats::collect_stats(&ctx.data().database).await?;
        reply(ctx, stats::format_stats(&collected)?).await
    }

    /// Looks a user up by id or @username.
    #[poise::command(
        slash_command,
        rename = "find_user",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_find_user(
        ctx: Context<'_>,
        #[description = "User id or @username"] query: String,
    ) -> Result<()> {
        let user = find_user(ctx, &query).await?;
        let purchases = inventory::count_purchases(&ctx.data().database, user.user_id).await?;

        let mut text = String::new();
        writeln!(text, "👤 **User Info**\n")?;
        writeln!(text, "🆔 **ID:** `{}`", user.user_id)?;
        writeln!(text, "📛 **Name:** {}", user.mention())?;
        writeln!(text, "💰 **Balance:** ${:.2}", user.balance())?;
        writeln!(text, "🛒 **Purchases:** {purchases}")?;
        writeln!(
            text,
            "🚫 **Banned:** {}",
            if user.is_banned { "Yes" } else { "No" }
        )?;
        write!(
            text,
            "📅 **Registered:** {}",
            user.registered_at.format("%Y-%m-%d %H:%M")
        )?;
        reply(ctx, text).await
    }

    /// Blocks a user from every command.
    #[poise::command(slash_command, rename = "ban", category = "Admin", check = "admin_check")]
    pub async fn admin_ban(
        ctx: Context<'_>,
        #[description = "User id"] user_id: String,
    ) -> Result<()> {
        let user_id = parse_user_id(&user_id)?;
        if ctx.data().is_admin(user_id.unsigned_abs()) {
            reply(ctx, "❌ Admins cannot be banned.").await?;
            return Ok(());
        }
        let user = users::set_banned(&ctx.data().database, user_id, true).await?;
        reply(ctx, format!("🚫 {} has been banned.", user.mention())).await
    }

    /// Lifts a ban.
    #[poise::command(slash_command, rename = "unban", category = "Admin", check = "admin_check")]
    pub async fn admin_unban(
        ctx: Context<'_>,
        #[description = "User id"] user_id: String,
    ) -> Result<()> {
        let user_id = parse_user_id(&user_id)?;
        let user = users::set_banned(&ctx.data().database, user_id, false).await?;
        reply(ctx, format!("✅ {} has been unbanned.", user.mention())).await
    }

    /// Credits a user's balance.
    #[poise::command(
        slash_command,
        rename = "add_balance",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_add_balance(
        ctx: Context<'_>,
        #[description = "User id"] user_id: String,
        #[description = "Amount in USD"] amount: String,
    ) -> Result<()> {
        let user_id = parse_user_id(&user_id)?;
        let amount = money::parse_amount(&amount)?;
        let user = ledger::credit(&ctx.data().database, user_id, amount).await?;
        info!("Admin {} added {} to user {}", ctx.author().id, amount, user_id);

        let notice = ctx.data().translator.format(
            &user.language_code,
            "balance_added",
            &[("amount", &format!("{amount:.2}"))],
        );
        if let Err(e) = ctx
            .data()
            .gateway
            .send_text(ChatId::User(user_id.unsigned_abs()), &notice)
            .await
        {
            warn!("Could not notify user {} about balance change: {}", user_id, e);
        }
        reply(
            ctx,
            format!(
                "✅ Added ${amount:.2} to {}. New balance: ${:.2}",
                user.mention(),
                user.balance()
            ),
        )
        .await
    }

    /// Debits a user's balance; never below zero.
    #[poise::command(
        slash_command,
        rename = "remove_balance",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_remove_balance(
        ctx: Context<'_>,
        #[description = "User id"] user_id: String,
        #[description = "Amount in USD"] amount: String,
    ) -> Result<()> {
        let user_id = parse_user_id(&user_id)?;
        let amount = money::parse_amount(&amount)?;
        let user = ledger::debit(&ctx.data().database, user_id, amount).await?;
        info!("Admin {} removed {} from user {}", ctx.author().id, amount, user_id);
        reply(
            ctx,
            format!(
                "✅ Removed ${amount:.2} from {}. New balance: ${:.2}",
                user.mention(),
                user.balance()
            ),
        )
        .await
    }

    /// Adds a country; its folder must be named `<code> <name>`.
    #[poise::command(
        slash_command,
        rename = "country_add",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_country_add(
        ctx: Context<'_>,
        #[description = "Country name, e.g. Myanmar"] name: String,
        #[description = "Calling code, e.g. +95"] code: String,
        #[description = "Price per account in USD"] price: String,
        #[description = "Flag emoji; derived from the code when omitted"] flag: Option<String>,
    ) -> Result<()> {
        let price = money::parse_amount(&price)?;
        let category = inventory::add_category(
            &ctx.data().database,
            NewCategory {
                name,
                code,
                flag_emoji: flag,
                price,
            },
        )
        .await?;
        reply(
            ctx,
            format!(
                "✅ Country {} added at ${:.2}. Put its sessions in `{} {}` and run `/admin sync`.",
                category.label(),
                category.price(),
                category.code,
                category.name
            ),
        )
        .await
    }

    /// Lists every country with stock and price.
    #[poise::command(
        slash_command,
        rename = "country_list",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_country_list(ctx: Context<'_>) -> Result<()> {
        let categories = inventory::list_categories(&ctx.data().database).await?;
        if categories.is_empty() {
            reply(ctx, "No countries yet. Add one with `/admin country_add`.").await?;
            return Ok(());
        }

        let mut text = String::from("**🌍 Countries**\n\n");
        for category in categories {
            writeln!(
                text,
                "{} ({}) - ${:.2} - {} in stock{}",
                category.label(),
                category.code,
                category.price(),
                category.stock_count,
                if category.is_active { "" } else { " (inactive)" }
            )?;
        }
        reply(ctx, text).await
    }

    /// Changes the price of a country.
    #[poise::command(
        slash_command,
        rename = "country_price",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_country_price(
        ctx: Context<'_>,
        #[description = "Country"]
        #[autocomplete = "autocomplete::autocomplete_country"]
        country: String,
        #[description = "New price per account in USD"] price: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let price = money::parse_amount(&price)?;
        let category = inventory::require_category_by_name(db, &country).await?;
        let updated = inventory::set_category_price(db, category.id, price).await?;
        reply(
            ctx,
            format!("✅ {} now costs ${:.2}.", updated.label(), updated.price()),
        )
        .await
    }

    /// Deletes a country and all of its goods, sold or not.
    #[poise::command(
        slash_command,
        rename = "country_delete",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_country_delete(
        ctx: Context<'_>,
        #[description = "Country"]
        #[autocomplete = "autocomplete::autocomplete_country"]
        country: String,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let category = inventory::require_category_by_name(db, &country).await?;
        let deleted = inventory::delete_category(db, category.id).await?;
        reply(
            ctx,
            format!(
                "🗑️ {} deleted with {} unsold and {} sold accounts.",
                category.label(),
                deleted.unsold,
                deleted.sold
            ),
        )
        .await
    }

    /// Reconciles the store with the stock directory.
    #[poise::command(slash_command, rename = "sync", category = "Admin", check = "admin_check")]
    pub async fn admin_sync(ctx: Context<'_>) -> Result<()> {
        ctx.defer_ephemeral().await?;
        let data = ctx.data();
        let report = inventory::resynchronize(&data.database, &data.stock).await?;

        let mut text = String::from("🔄 **Stock synchronized**\n\n");
        if report.created_root {
            writeln!(
                text,
                "📁 The folder `{}` did not exist and was created. Add country folders and sync again.",
                data.stock.root().display()
            )?;
        }
        writeln!(text, "➕ Added: {}", report.added)?;
        writeln!(text, "➖ Removed: {}", report.removed)?;
        if !report.unmatched_folders.is_empty() {
            writeln!(
                text,
                "\n⚠️ Folders without a matching country: {}",
                report.unmatched_folders.join(", ")
            )?;
        }
        reply(ctx, text).await
    }

    /// Broadcasts your next message to an audience.
    #[poise::command(
        slash_command,
        rename = "broadcast",
        category = "Admin",
        check = "admin_check"
    )]
    pub async fn admin_broadcast(
        ctx: Context<'_>,
        #[description = "Who receives the message"] target: BroadcastTarget,
        #[description = "User ids separated by spaces or commas (for specific users)"] ids: Option<
            String,
        >,
        #[description = "Country whose buyers receive it"]
        #[autocomplete = "autocomplete::autocomplete_sold_country"]
        country: Option<String>,
    ) -> Result<()> {
        let audience = match target {
            BroadcastTarget::All => Audience::All,
            BroadcastTarget::Ids => {
                let ids = broadcast::parse_recipient_ids(ids.as_deref().unwrap_or_default());
                if ids.is_empty() {
                    reply(ctx, "❌ Provide at least one numeric user id.").await?;
                    return Ok(());
                }
                Audience::Users(ids)
            }
            BroadcastTarget::Country => {
                let Some(country) = country else {
                    reply(ctx, "❌ Pick a country.").await?;
                    return Ok(());
                };
                let category =
                    inventory::require_category_by_name(&ctx.data().database, &country).await?;
                Audience::CategoryBuyers(category.id)
            }
        };

        ctx.data()
            .conversations
            .begin(
                ctx.author().id.get(),
                Conversation::ComposingBroadcast { audience },
            )
            .await;
        reply(
            ctx,
            "📣 Send the message to broadcast (text, image, or both), or `/cancel`.",
        )
        .await
    }
}

// Re-export all commands
pub use inner::*;
