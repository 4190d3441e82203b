//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Admin commands: statistics, users, balances, countries, stock sync, broadcast
pub mod admin;

/// General commands: start, help, support, cancel
pub mod general;

/// Buying: stock listing and purchase
pub mod shop;

/// Balance: profile, settings, deposits, top-ups, withdrawals
pub mod wallet;

use crate::{bot::BotData, errors::Error};

/// Every command registered with Discord.
#[must_use]
pub fn all() -> Vec<poise::Command<BotData, Error>> {
    vec![
        general::start(),
        general::help(),
        general::support(),
        general::cancel(),
        shop::stock(),
        shop::buy(),
        wallet::profile(),
        wallet::settings(),
        wallet::deposit(),
        wallet::topup(),
        wallet::withdraw(),
        admin::admin(),
    ]
}

pub use general::*;
pub use shop::*;
pub use wallet::*;
