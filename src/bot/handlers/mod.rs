//! Discord interaction handlers
//!
//! This module provides handlers for Discord interactions that are not slash commands:
//! autocomplete, button clicks, and the plain messages that continue a conversation.

/// Autocomplete handlers for country and payment method names
pub mod autocomplete;
/// Button clicks on admin records, invoices, and broadcast previews
pub mod components;
/// Plain messages and uploads that continue a multi-step flow
pub mod messages;
