//! Unified error type for the storefront.
//!
//! Expected business outcomes (`InsufficientFunds`, `InsufficientStock`, `AlreadyProcessed`)
//! live next to infrastructure failures so every layer can propagate with `?`. The bot layer
//! decides what a user gets to see through [`Error::user_message`].

use crate::core::localization::Translator;
use crate::gateway::GatewayError;
use poise::serenity_prelude as serenity;
use rust_decimal::Decimal;
use thiserror::Error;

/// All errors produced by the storefront.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Human readable description
        message: String,
    },

    /// Record store failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Amount is zero, negative, or has more than two fractional digits
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Purchase quantity must be at least one
    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity {
        /// The rejected quantity
        quantity: u64,
    },

    /// Balance does not cover the requested debit
    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        /// Balance at the time of the attempt
        balance: Decimal,
        /// Amount that was requested
        required: Decimal,
    },

    /// Fewer unsold goods than requested
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        /// Goods that were selectable
        available: u64,
        /// Goods that were requested
        requested: u64,
    },

    /// Request already left its pending state
    #[error("{request} has already been processed")]
    AlreadyProcessed {
        /// Request label, e.g. `deposit #4`
        request: String,
    },

    /// A user, category, good, or request does not exist
    #[error("{entity} '{key}' not found")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Lookup key
        key: String,
    },

    /// A record with the same unique key already exists
    #[error("{entity} '{key}' already exists")]
    AlreadyExists {
        /// Kind of record
        entity: &'static str,
        /// Conflicting key
        key: String,
    },

    /// Payment or rates API failed or answered with an error
    #[error("{provider} unavailable: {reason}")]
    ExternalProviderUnavailable {
        /// Provider name
        provider: &'static str,
        /// Transport or API error description
        reason: String,
    },

    /// Goods were sold but could not be handed over
    #[error("Delivery failed for order {order}: {reason}")]
    DeliveryFailed {
        /// Order label
        order: String,
        /// Transport failure description
        reason: String,
    },

    /// User has not joined every required Discord server
    #[error("Membership required in {} server(s)", guilds.len())]
    MembershipRequired {
        /// Servers still to join
        guilds: Vec<u64>,
    },

    /// Filesystem error (stock directory, config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive packaging error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Outbound messaging error
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Serenity/Poise framework error
    #[error("Discord error: {0}")]
    Discord(Box<serenity::Error>),

    /// Text formatting error
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Missing environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl From<serenity::Error> for Error {
    fn from(value: serenity::Error) -> Self {
        Self::Discord(Box::new(value))
    }
}

impl Error {
    /// Returns true for outcomes that are part of normal operation and must not be logged as errors.
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::InsufficientStock { .. }
                | Self::AlreadyProcessed { .. }
                | Self::InvalidAmount { .. }
                | Self::InvalidQuantity { .. }
                | Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::MembershipRequired { .. }
        )
    }

    /// Short chat message safe to show to a non-admin user, in their language.
    #[must_use]
    pub fn user_message(&self, tr: &Translator, language: &str) -> String {
        match self {
            Self::InsufficientFunds { balance, .. } => tr.format(
                language,
                "error_insufficient_funds",
                &[("balance", &format!("{balance:.2}"))],
            ),
            Self::InsufficientStock { available, .. } => tr.format(
                language,
                "error_insufficient_stock",
                &[("available", available)],
            ),
            Self::AlreadyProcessed { .. } => tr.get(language, "error_already_processed"),
            Self::NotFound { entity, .. } => {
                tr.format(language, "error_not_found", &[("entity", entity)])
            }
            Self::InvalidAmount { .. } => tr.get(language, "error_invalid_amount"),
            Self::InvalidQuantity { .. } => tr.get(language, "error_invalid_quantity"),
            Self::AlreadyExists { entity, key } => tr.format(
                language,
                "error_already_exists",
                &[("entity", entity), ("key", key)],
            ),
            Self::ExternalProviderUnavailable { .. } => {
                tr.get(language, "error_provider_unavailable")
            }
            Self::DeliveryFailed { .. } => tr.get(language, "error_delivery_failed"),
            Self::MembershipRequired { guilds } => {
                let servers = guilds
                    .iter()
                    .map(|guild| format!("• `{guild}`"))
                    .collect::<Vec<_>>()
                    .join("\n");
                tr.format(language, "check_join_required", &[("servers", &servers)])
            }
            _ => tr.get(language, "error_generic"),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
