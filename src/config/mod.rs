/// Database configuration and connection management
pub mod database;

/// Manual payment method configuration from config.toml
pub mod payment_methods;

/// Environment-driven process settings
pub mod settings;

pub use settings::Settings;
