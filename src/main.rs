#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use std::{env, sync::Arc};
use storefront_bot::{
    bot::{self, Services},
    config::{self, Settings},
    core::{
        currency::{CurrencyConverter, ErApiRates},
        localization::Translator,
        stock_dir::StockDirectory,
    },
    errors::{Error, Result},
    payments::{CryptoPayClient, PaymentProvider},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Settings, manual payment methods and locales
    let settings = Settings::from_env()
        .inspect_err(|e| error!("Critical error loading settings: {}", e))?;
    let payment_config = match config::payment_methods::load_config(&settings.payment_config_path)
    {
        Ok(loaded) => {
            info!(
                "Loaded {} manual payment methods.",
                loaded.payment_methods.len()
            );
            loaded
        }
        Err(e) => {
            warn!("Manual deposits disabled: {}", e);
            config::payment_methods::Config::default()
        }
    };

    if !settings.required_guild_ids.is_empty() {
        info!(
            "Users must join {} server(s) before using the store.",
            settings.required_guild_ids.len()
        );
    }
    let translator = Translator::embedded()
        .inspect_err(|e| error!("Failed to load locales: {}", e))?;

    // 4. Database and tables
    let database = config::database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    config::database::create_tables(&database)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Stock directory; reconciled on demand with `/admin sync`
    let stock = StockDirectory::new(settings.accounts_dir.clone());

    // 6. External services
    let payments: Option<Arc<dyn PaymentProvider>> = match &settings.crypto_pay_token {
        Some(token) => Some(Arc::new(CryptoPayClient::new(
            settings.crypto_pay_api_url.clone(),
            token.clone(),
        )?)),
        None => {
            warn!("CRYPTO_PAY_TOKEN not set; crypto top-ups are disabled.");
            None
        }
    };
    let converter = CurrencyConverter::new(Arc::new(ErApiRates::new(
        settings.rates_api_url.clone(),
    )?));
    let refresh = converter.spawn_refresh(settings.rates_refresh_interval);

    // 7. Run the bot
    // DISCORD_BOT_TOKEN is loaded here, directly before use, not stored in Settings
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    let result = bot::run_bot(
        token,
        Services {
            database,
            settings,
            payment_config,
            converter,
            payments,
            stock,
            translator,
        },
    )
    .await;

    refresh.stop();
    result
}
