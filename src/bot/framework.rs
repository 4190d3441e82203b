//! Poise framework setup: command registration, the global registration/ban/membership check,
//! localized error reporting, and dispatch of non-command events to the handlers.

use crate::{
    bot::{BotData, Context, Services, commands, gateway::SerenityGateway, handlers},
    core::{
        localization::DEFAULT_LANGUAGE,
        users::{self, NewUser},
    },
    entities::user,
    errors::{Error, Result},
    gateway::MessagingGateway,
};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Category shared by all admin commands.
pub const ADMIN_CATEGORY: &str = "Admin";

/// Converts a Discord user id into the store key.
pub fn user_key(id: serenity::UserId) -> Result<i64> {
    i64::try_from(id.get()).map_err(|_| Error::NotFound {
        entity: "User",
        key: id.to_string(),
    })
}

/// Returns the stored user for a Discord author, registering them on first contact.
pub async fn register_author(
    data: &BotData,
    author: &serenity::User,
    locale: Option<&str>,
) -> Result<user::Model> {
    users::get_or_create_user(
        &data.database,
        NewUser {
            user_id: user_key(author.id)?,
            username: Some(author.name.clone()),
            first_name: author
                .global_name
                .clone()
                .unwrap_or_else(|| author.name.clone()),
            language_code: locale.map(str::to_string),
        },
    )
    .await
}

/// Language the user picked, or the default for users not registered yet.
pub async fn user_language(data: &BotData, id: serenity::UserId) -> String {
    let stored = match user_key(id) {
        Ok(key) => users::get_user(&data.database, key).await.ok().flatten(),
        Err(_) => None,
    };
    stored.map_or_else(|| DEFAULT_LANGUAGE.to_string(), |user| user.language_code)
}

/// Fails with `MembershipRequired` unless the user belongs to every required server.
///
/// Admins and deployments without `REQUIRED_GUILD_IDS` skip the Discord lookups entirely.
/// A lookup error counts as not joined.
pub async fn ensure_membership(
    ctx: &serenity::Context,
    data: &BotData,
    user: serenity::UserId,
) -> Result<()> {
    let settings = &data.settings;
    if settings.required_guild_ids.is_empty() || settings.is_admin(user.get()) {
        return Ok(());
    }

    let mut joined = Vec::new();
    for &guild in &settings.required_guild_ids {
        match serenity::GuildId::new(guild).member(ctx, user).await {
            Ok(_) => joined.push(guild),
            Err(e) => debug!("User {} not found in guild {}: {}", user, guild, e),
        }
    }

    let guilds = settings.guilds_to_join(user.get(), &joined);
    if guilds.is_empty() {
        Ok(())
    } else {
        Err(Error::MembershipRequired { guilds })
    }
}

/// Ephemeral reply with the given text.
pub async fn reply(ctx: Context<'_>, text: impl Into<String>) -> Result<()> {
    ctx.send(
        poise::CreateReply::default()
            .content(text.into())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Registers the author, then stops banned users and users outside the required servers.
async fn command_check(ctx: Context<'_>) -> Result<bool> {
    let user = register_author(ctx.data(), ctx.author(), ctx.locale()).await?;
    if user.is_banned {
        info!("Ignoring command from banned user {}", user.user_id);
        return Ok(false);
    }
    ensure_membership(ctx.serenity_context(), ctx.data(), ctx.author().id).await?;
    Ok(true)
}

/// Per-command check for the admin surface.
pub async fn admin_check(ctx: Context<'_>) -> Result<bool> {
    Ok(ctx.data().is_admin(ctx.author().id.get()))
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            if error.is_expected() {
                info!("Command `{}` ended with: {}", ctx.command().name, error);
            } else {
                error!("Error in command `{}`: {:?}", ctx.command().name, error);
            }
            let language = user_language(ctx.data(), ctx.author().id).await;
            let text = error.user_message(&ctx.data().translator, &language);
            if let Err(e) = reply(ctx, text).await {
                error!("Failed to send error message: {}", e);
            }
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let tr = &ctx.data().translator;
            let language = user_language(ctx.data(), ctx.author().id).await;
            let text = match error {
                Some(error) => {
                    if error.is_expected() {
                        info!("Check for `{}` stopped the command: {}", ctx.command().name, error);
                    } else {
                        error!("Check for `{}` failed: {:?}", ctx.command().name, error);
                    }
                    error.user_message(tr, &language)
                }
                None if ctx.command().category.as_deref() == Some(ADMIN_CATEGORY) => {
                    tr.get(&language, "check_admin_only")
                }
                None => tr.get(&language, "check_blocked"),
            };
            if let Err(e) = reply(ctx, text).await {
                error!("Failed to send check failure message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    match event {
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => handlers::components::handle_component(ctx, data, component).await,
        serenity::FullEvent::Message { new_message } if !new_message.author.bot => {
            handlers::messages::handle_message(ctx, data, new_message).await
        }
        _ => Ok(()),
    }
}

/// Connects to Discord and runs until the client stops.
#[instrument(skip(token, services))]
pub async fn run_bot(token: String, services: Services) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            command_check: Some(|ctx| Box::pin(command_check(ctx))),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                let gateway: Arc<dyn MessagingGateway> =
                    Arc::new(SerenityGateway::new(Arc::clone(&ctx.http)));
                Ok(BotData::new(services, gateway))
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    if let Err(why) = client.start().await {
        warn!("Client stopped with error: {:?}", why);
        return Err(why.into());
    }
    Ok(())
}
