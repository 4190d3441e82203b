//! Core business logic, independent of the chat framework.
//!
//! Every operation takes a `DatabaseConnection` (or any `ConnectionTrait` when it must run
//! inside a caller's transaction) and, where it talks to people, a `MessagingGateway`.

/// Broadcast audience resolution and fan-out
pub mod broadcast;
/// Display-currency conversion and the rate refresh task
pub mod currency;
/// Deposit request lifecycle
pub mod deposits;
/// Categories, goods, resynchronization, and stock reservation
pub mod inventory;
/// Atomic balance credit and debit
pub mod ledger;
/// Interface texts per language
pub mod localization;
/// Fixed-point amount helpers
pub mod money;
/// Purchase transaction
pub mod purchase;
/// Admin statistics
pub mod stats;
/// Filesystem stock directory
pub mod stock_dir;
/// User registration, preferences, and moderation
pub mod users;
/// Withdrawal request lifecycle
pub mod withdrawals;
