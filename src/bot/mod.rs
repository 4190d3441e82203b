//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the storefront, including all slash
//! commands, button and message handlers, conversation state, and the serenity-backed
//! messaging gateway.

/// Discord command implementations (general, shop, wallet, admin)
pub mod commands;
/// Per-user multi-step flow state
pub mod conversation;
/// Framework setup, checks, error handling, and event dispatch
pub mod framework;
/// Serenity implementation of the messaging gateway
pub mod gateway;
/// Discord interaction handlers (autocomplete, buttons, conversation messages)
pub mod handlers;

use crate::{
    config::{Settings, payment_methods},
    core::{currency::CurrencyConverter, localization::Translator, stock_dir::StockDirectory},
    errors::Error,
    gateway::MessagingGateway,
    payments::PaymentProvider,
};
use conversation::ConversationStore;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Poise context used by every command.
pub type Context<'a> = poise::Context<'a, BotData, Error>;

/// Process-wide services built in `main` before the client connects.
pub struct Services {
    /// Record store
    pub database: DatabaseConnection,
    /// Environment settings
    pub settings: Settings,
    /// Manual payment methods
    pub payment_config: payment_methods::Config,
    /// Display currency converter
    pub converter: CurrencyConverter,
    /// Invoice provider; `None` disables crypto top-ups
    pub payments: Option<Arc<dyn PaymentProvider>>,
    /// Filesystem stock
    pub stock: StockDirectory,
    /// User-facing texts
    pub translator: Translator,
}

/// Shared data available to all bot commands.
/// This structure holds the database connection and every service that commands
/// and event handlers need to access.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// Environment settings
    pub settings: Settings,
    /// Manual payment methods
    pub payment_config: payment_methods::Config,
    /// Outbound messaging
    pub gateway: Arc<dyn MessagingGateway>,
    /// Display currency converter
    pub converter: CurrencyConverter,
    /// Invoice provider
    pub payments: Option<Arc<dyn PaymentProvider>>,
    /// Filesystem stock
    pub stock: StockDirectory,
    /// User-facing texts
    pub translator: Translator,
    /// Multi-step flow state
    pub conversations: ConversationStore,
}

impl BotData {
    /// Combines the services with the gateway, which only exists once the client is up.
    #[must_use]
    pub fn new(services: Services, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            database: services.database,
            settings: services.settings,
            payment_config: services.payment_config,
            gateway,
            converter: services.converter,
            payments: services.payments,
            stock: services.stock,
            translator: services.translator,
            conversations: ConversationStore::default(),
        }
    }

    /// Whether the user may run admin commands.
    #[must_use]
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.settings.is_admin(user_id)
    }
}

pub use framework::run_bot;
