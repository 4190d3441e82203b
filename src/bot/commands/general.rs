//! General Discord commands - start, help, support, and cancel.
//! These commands need at most the user's conversation state; registration itself happens in
//! the global command check before any of them runs. Replies use the caller's stored language.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            Context,
            framework::{reply, user_language},
        },
        errors::Result,
    };

    /// Registers you with the store and shows how to get started.
    #[poise::command(slash_command, prefix_command)]
    pub async fn start(ctx: Context<'_>) -> Result<()> {
        let name = ctx
            .author()
            .global_name
            .clone()
            .unwrap_or_else(|| ctx.author().name.clone());
        let language = user_language(ctx.data(), ctx.author().id).await;
        let text = ctx
            .data()
            .translator
            .format(&language, "start_welcome", &[("name", &name)]);
        ctx.say(text).await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: Context<'_>) -> Result<()> {
        let language = user_language(ctx.data(), ctx.author().id).await;
        ctx.say(ctx.data().translator.get(&language, "help")).await?;
        Ok(())
    }

    /// Shows the support contact.
    #[poise::command(slash_command, prefix_command)]
    pub async fn support(ctx: Context<'_>) -> Result<()> {
        let data = ctx.data();
        let language = user_language(data, ctx.author().id).await;
        let text = data.translator.format(
            &language,
            "support",
            &[("contact", &data.settings.support_contact)],
        );
        ctx.say(text).await?;
        Ok(())
    }

    /// Abandons the step you are in (buying, deposit, withdrawal, broadcast).
    #[poise::command(slash_command, prefix_command)]
    pub async fn cancel(ctx: Context<'_>) -> Result<()> {
        let data = ctx.data();
        let cancelled = data.conversations.cancel(ctx.author().id.get()).await;
        let language = user_language(data, ctx.author().id).await;
        let key = if cancelled { "cancelled" } else { "nothing_to_cancel" };
        reply(ctx, data.translator.get(&language, key)).await
    }
}

// Re-export all commands
pub use inner::*;
