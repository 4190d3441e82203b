//! Process settings read from environment variables.
//!
//! `main` loads `.env` with `dotenvy` first, then calls [`Settings::from_env`]. The bot token
//! is not part of `Settings`; it is read right before the client starts.

use crate::errors::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SUPPORT_CONTACT: &str = "@YourSupportUsername";
const DEFAULT_ACCOUNTS_DIR: &str = "accounts";
const DEFAULT_CRYPTO_PAY_API_URL: &str = "https://pay.crypt.bot/api";
const DEFAULT_RATES_API_URL: &str = "https://open.er-api.com/v6/latest/USD";
const DEFAULT_RATES_REFRESH_SECS: u64 = 3600;
const DEFAULT_BROADCAST_DELAY_MS: u64 = 40;
const DEFAULT_PAYMENT_CONFIG: &str = "config.toml";

/// Runtime configuration shared by the bot and the background tasks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Users allowed to run admin commands
    pub admin_ids: Vec<u64>,
    /// Channel receiving deposit/withdrawal records and escalations
    pub admin_channel_id: u64,
    /// Shown by the support command
    pub support_contact: String,
    /// Root of the stock directory
    pub accounts_dir: PathBuf,
    /// Crypto Pay API token; crypto top-ups are disabled without it
    pub crypto_pay_token: Option<String>,
    /// Crypto Pay API base URL
    pub crypto_pay_api_url: String,
    /// Exchange rates endpoint
    pub rates_api_url: String,
    /// Interval of the background rate refresh
    pub rates_refresh_interval: Duration,
    /// Pause between two broadcast sends
    pub broadcast_delay: Duration,
    /// TOML file with manual payment methods
    pub payment_config_path: PathBuf,
    /// Discord servers a user must belong to before using the store; empty disables the gate
    pub required_guild_ids: Vec<u64>,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config {
                    message: format!("{key} must be set"),
                })
        };

        let admin_ids = parse_id_list(&required("ADMIN_IDS")?)?;
        let admin_channel_id = parse_number::<u64>("ADMIN_CHANNEL_ID", &required("ADMIN_CHANNEL_ID")?)?;

        let rates_refresh_secs = lookup("RATES_REFRESH_SECS")
            .map(|v| parse_number::<u64>("RATES_REFRESH_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_RATES_REFRESH_SECS);
        let broadcast_delay_ms = lookup("BROADCAST_DELAY_MS")
            .map(|v| parse_number::<u64>("BROADCAST_DELAY_MS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_BROADCAST_DELAY_MS);

        let required_guild_ids = lookup("REQUIRED_GUILD_IDS")
            .map(|v| parse_id_list(&v))
            .transpose()?
            .unwrap_or_default();
        if required_guild_ids.contains(&0) {
            return Err(Error::Config {
                message: "REQUIRED_GUILD_IDS contains 0".to_string(),
            });
        }

        Ok(Self {
            admin_ids,
            admin_channel_id,
            support_contact: lookup("SUPPORT_CONTACT")
                .unwrap_or_else(|| DEFAULT_SUPPORT_CONTACT.to_string()),
            accounts_dir: PathBuf::from(
                lookup("ACCOUNTS_DIR").unwrap_or_else(|| DEFAULT_ACCOUNTS_DIR.to_string()),
            ),
            crypto_pay_token: lookup("CRYPTO_PAY_TOKEN").filter(|v| !v.trim().is_empty()),
            crypto_pay_api_url: lookup("CRYPTO_PAY_API_URL")
                .unwrap_or_else(|| DEFAULT_CRYPTO_PAY_API_URL.to_string()),
            rates_api_url: lookup("RATES_API_URL")
                .unwrap_or_else(|| DEFAULT_RATES_API_URL.to_string()),
            rates_refresh_interval: Duration::from_secs(rates_refresh_secs),
            broadcast_delay: Duration::from_millis(broadcast_delay_ms),
            payment_config_path: PathBuf::from(
                lookup("PAYMENT_CONFIG").unwrap_or_else(|| DEFAULT_PAYMENT_CONFIG.to_string()),
            ),
            required_guild_ids,
        })
    }

    /// Whether the given user may run admin commands.
    #[must_use]
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Required servers missing from `joined`. Admins are never gated.
    #[must_use]
    pub fn guilds_to_join(&self, user_id: u64, joined: &[u64]) -> Vec<u64> {
        if self.is_admin(user_id) {
            return Vec::new();
        }
        self.required_guild_ids
            .iter()
            .copied()
            .filter(|guild| !joined.contains(guild))
            .collect()
    }
}

/// Parses `1, 2 3\n4` style id lists.
pub fn parse_id_list(raw: &str) -> Result<Vec<u64>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| parse_number::<u64>("id list", part))
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| Error::Config {
        message: format!("{key} has invalid value '{raw}'"),
    })
}
