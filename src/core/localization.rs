//! Interface texts in every supported language.
//!
//! Each language is a flat TOML table (`key = "text"`) under `locales/`, compiled into the
//! binary. Texts carry `{name}` placeholders. A key missing from a language falls back to
//! English, and a key missing from English renders as `_key_`.

use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::fmt::Display;

/// Language of unknown users and source of missing keys.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Languages a user can pick.
pub const SUPPORTED_LANGUAGES: [&str; 3] = ["en", "ru", "zh"];

const EMBEDDED_LOCALES: [(&str, &str); 3] = [
    ("en", include_str!("../../locales/en.toml")),
    ("ru", include_str!("../../locales/ru.toml")),
    ("zh", include_str!("../../locales/zh.toml")),
];

/// Looks up interface texts by language and key.
#[derive(Debug, Clone, Default)]
pub struct Translator {
    locales: HashMap<String, HashMap<String, String>>,
}

impl Translator {
    /// Loads the locale tables shipped with the binary.
    ///
    /// # Errors
    /// Returns `Config` if a table is not a flat string table.
    pub fn embedded() -> Result<Self> {
        Self::from_tables(EMBEDDED_LOCALES)
    }

    /// Parses `(language, toml source)` pairs.
    ///
    /// # Errors
    /// Returns `Config` if a table is not a flat string table.
    pub fn from_tables<'a, I>(tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut locales = HashMap::new();
        for (language, source) in tables {
            let table: HashMap<String, String> =
                toml::from_str(source).map_err(|e| Error::Config {
                    message: format!("Invalid locale '{language}': {e}"),
                })?;
            locales.insert(language.to_string(), table);
        }
        Ok(Self { locales })
    }

    /// Raw text of `key`, placeholders untouched.
    #[must_use]
    pub fn get(&self, language: &str, key: &str) -> String {
        self.lookup(language, key)
            .or_else(|| self.lookup(DEFAULT_LANGUAGE, key))
            .map_or_else(|| format!("_{key}_"), str::to_string)
    }

    /// Text of `key` with every `{name}` replaced by its value.
    #[must_use]
    pub fn format(&self, language: &str, key: &str, args: &[(&str, &dyn Display)]) -> String {
        args.iter()
            .fold(self.get(language, key), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), &value.to_string())
            })
    }

    fn lookup(&self, language: &str, key: &str) -> Option<&str> {
        self.locales
            .get(language)?
            .get(key)
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }
}
