//! Wallet Discord commands - profile, settings, deposits, top-ups, and withdrawals.
//!
//! Manual deposits and withdrawals are two-step flows: the command validates the amount and
//! stores it in the user's conversation, and the message handler picks up the screenshot or
//! the wallet address that follows.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            Context,
            conversation::Conversation,
            framework::{reply, user_key, user_language},
            gateway::action_rows,
            handlers::autocomplete,
        },
        core::{deposits, inventory, money, users, withdrawals},
        errors::Result,
        gateway::{Action, ActionStyle},
    };

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum LanguageChoice {
        #[name = "English"]
        En,
        #[name = "Русский"]
        Ru,
        #[name = "中文"]
        Zh,
    }

    impl LanguageChoice {
        const fn code(self) -> &'static str {
            match self {
                Self::En => "en",
                Self::Ru => "ru",
                Self::Zh => "zh",
            }
        }
    }

    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum CurrencyChoice {
        #[name = "USD ($)"]
        Usd,
        #[name = "RUB (₽)"]
        Rub,
        #[name = "CNY (¥)"]
        Cny,
    }

    impl CurrencyChoice {
        const fn code(self) -> &'static str {
            match self {
                Self::Usd => "USD",
                Self::Rub => "RUB",
                Self::Cny => "CNY",
            }
        }
    }

    /// Shows your balance, purchases, and registration date.
    #[poise::command(slash_command, prefix_command)]
    pub async fn profile(ctx: Context<'_>) -> Result<()> {
        let data = ctx.data();
        let user = users::require_user(&data.database, user_key(ctx.author().id)?).await?;
        let purchases = inventory::count_purchases(&data.database, user.user_id).await?;
        let balance = data.converter.format(user.balance(), &user.currency).await;

        let text = data.translator.format(
            &user.language_code,
            "profile",
            &[
                ("id", &user.user_id),
                ("balance", &balance),
                ("purchases", &purchases),
                ("language", &user.language_code),
                ("registered", &user.registered_at.format("%Y-%m-%d")),
            ],
        );
        reply(ctx, text).await
    }

    /// Changes your interface language or display currency.
    #[poise::command(slash_command, subcommands("settings_language", "settings_currency"))]
    pub async fn settings(ctx: Context<'_>) -> Result<()> {
        let language = user_language(ctx.data(), ctx.author().id).await;
        ctx.say(ctx.data().translator.get(&language, "settings_help"))
            .await?;
        Ok(())
    }

    /// Changes the interface language.
    #[poise::command(slash_command, rename = "language")]
    pub async fn settings_language(
        ctx: Context<'_>,
        #[description = "Language"] language: LanguageChoice,
    ) -> Result<()> {
        let user_id = user_key(ctx.author().id)?;
        let user = users::set_language(&ctx.data().database, user_id, language.code()).await?;
        // Confirmed in the language just picked
        let text = ctx
            .data()
            .translator
            .get(&user.language_code, "language_updated");
        reply(ctx, text).await
    }

    /// Changes the currency balances and prices are shown in.
    #[poise::command(slash_command, rename = "currency")]
    pub async fn settings_currency(
        ctx: Context<'_>,
        #[description = "Display currency"] currency: CurrencyChoice,
    ) -> Result<()> {
        let user_id = user_key(ctx.author().id)?;
        let user = users::set_currency(&ctx.data().database, user_id, currency.code()).await?;
        let text = ctx.data().translator.format(
            &user.language_code,
            "currency_updated",
            &[("currency", &user.currency)],
        );
        reply(ctx, text).await
    }

    /// Starts a manual deposit; the payment screenshot is your next message.
    #[poise::command(slash_command, prefix_command)]
    pub async fn deposit(
        ctx: Context<'_>,
        #[description = "Payment method"]
        #[autocomplete = "autocomplete::autocomplete_payment_method"]
        method: String,
        #[description = "Amount in USD (e.g., 10.50)"] amount: String,
    ) -> Result<()> {
        let data = ctx.data();
        let tr = &data.translator;
        let language = user_language(data, ctx.author().id).await;
        let Some(method) = data
            .payment_config
            .payment_methods
            .iter()
            .find(|m| m.key.eq_ignore_ascii_case(&method) || m.name.eq_ignore_ascii_case(&method))
        else {
            let text = tr.format(&language, "unknown_payment_method", &[("method", &method)]);
            reply(ctx, text).await?;
            return Ok(());
        };

        let amount = money::parse_amount(&amount)?;
        let minimum = format!("{:.2}", money::MINIMUM_TRANSFER);
        if amount < money::MINIMUM_TRANSFER {
            let text = tr.format(&language, "minimum_deposit", &[("minimum", &minimum)]);
            reply(ctx, text).await?;
            return Ok(());
        }

        let text = format!(
            "{}\n\n{}",
            method.instructions(tr, &language, money::MINIMUM_TRANSFER),
            tr.format(
                &language,
                "deposit_amount_prompt",
                &[("amount", &format!("{amount:.2}"))]
            )
        );
        data.conversations
            .begin(
                ctx.author().id.get(),
                Conversation::AwaitingProof {
                    method: method.name.clone(),
                    amount,
                },
            )
            .await;
        reply(ctx, text).await
    }

    /// Creates a crypto invoice; press "I have paid" once it is settled.
    #[poise::command(slash_command, prefix_command)]
    pub async fn topup(
        ctx: Context<'_>,
        #[description = "Amount in USD (e.g., 10.50)"] amount: String,
    ) -> Result<()> {
        let data = ctx.data();
        let tr = &data.translator;
        let language = user_language(data, ctx.author().id).await;
        let Some(provider) = data.payments.as_deref() else {
            reply(ctx, tr.get(&language, "topup_unavailable")).await?;
            return Ok(());
        };

        let amount = money::parse_amount(&amount)?;
        let user_id = user_key(ctx.author().id)?;
        ctx.defer_ephemeral().await?;
        let deposit = deposits::create_invoice_deposit(&data.database, provider, user_id, amount).await?;

        let mut actions = Vec::with_capacity(2);
        if let Some(url) = &deposit.pay_url {
            actions.push(Action::link(url.clone(), tr.get(&language, "button_pay")));
        }
        actions.push(Action::callback(
            deposits::check_payment_action_id(deposit.id),
            tr.get(&language, "button_paid"),
            ActionStyle::Success,
        ));

        let text = tr.format(
            &language,
            "invoice_created",
            &[("amount", &format!("{amount:.2}"))],
        );
        ctx.send(
            poise::CreateReply::default()
                .content(text)
                .components(action_rows(&actions))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Requests a withdrawal; the destination address is your next message.
    #[poise::command(slash_command, prefix_command)]
    pub async fn withdraw(
        ctx: Context<'_>,
        #[description = "Amount in USD (e.g., 10.50)"] amount: String,
    ) -> Result<()> {
        let data = ctx.data();
        let amount = money::parse_amount(&amount)?;
        let user_id = user_key(ctx.author().id)?;
        withdrawals::validate_withdrawal_amount(&data.database, user_id, amount).await?;

        data.conversations
            .begin(
                ctx.author().id.get(),
                Conversation::AwaitingAddress { amount },
            )
            .await;
        let language = user_language(data, ctx.author().id).await;
        let text = data.translator.format(
            &language,
            "withdraw_prompt",
            &[("amount", &format!("{amount:.2}"))],
        );
        reply(ctx, text).await
    }
}

// Re-export all commands
pub use inner::*;
