//! Manual payment method loading from config.toml
//!
//! Manual deposits are paid outside the bot (exchange pay id, wallet address) and proven with a
//! screenshot. The details shown to the user come from the `[[payment_methods]]` tables of the
//! configuration file.

use crate::core::localization::Translator;
use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Manual payment methods offered for deposits
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

/// Configuration for a single manual payment method
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentMethod {
    /// Stable key used in commands, e.g. `usdt_trc20`
    pub key: String,
    /// Display name, e.g. `USDT (TRC-20)`
    pub name: String,
    /// Wallet address to send funds to
    pub address: Option<String>,
    /// Exchange pay id to send funds to
    pub pay_id: Option<String>,
    /// Memo/tag that must accompany the transfer
    pub memo: Option<String>,
}

impl Config {
    /// Finds a method by its key.
    #[must_use]
    pub fn method(&self, key: &str) -> Option<&PaymentMethod> {
        self.payment_methods.iter().find(|m| m.key == key)
    }
}

impl PaymentMethod {
    /// Payment instructions shown after the user picks this method.
    #[must_use]
    pub fn instructions(&self, tr: &Translator, language: &str, minimum: Decimal) -> String {
        let mut sections = vec![tr.format(
            language,
            "deposit_instructions",
            &[("method", &self.name), ("minimum", &format!("{minimum:.2}"))],
        )];
        if let Some(address) = &self.address {
            sections.push(tr.format(language, "payment_address", &[("address", address)]));
        }
        if let Some(pay_id) = &self.pay_id {
            sections.push(tr.format(language, "payment_pay_id", &[("pay_id", pay_id)]));
        }
        if let Some(memo) = self.memo.as_ref().filter(|m| !m.is_empty()) {
            sections.push(tr.format(language, "payment_memo", &[("memo", memo)]));
        }
        sections.join("\n\n")
    }
}

/// Loads payment method configuration from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}
