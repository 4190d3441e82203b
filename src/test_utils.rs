//! Shared test utilities for the storefront.
//!
//! This module provides common helper functions for setting up test databases,
//! creating test entities with sensible defaults, and fakes for the outbound ports.

use crate::{
    core::{
        inventory::{self, NewCategory},
        money,
    },
    entities::{category, good, user},
    errors::{Error, Result},
    gateway::{Action, ChatId, GatewayError, MessageRef, MessagingGateway},
    payments::{Invoice, InvoiceState, InvoiceStatus, PaymentProvider},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test user with the given balance.
///
/// # Defaults
/// * `username`: `user<id>`
/// * `first_name`: `Test User <id>`
/// * `language_code`: `en`, `currency`: `USD`
pub async fn create_test_user(
    db: &DatabaseConnection,
    user_id: i64,
    balance_cents: i64,
) -> Result<user::Model> {
    user::ActiveModel {
        user_id: Set(user_id),
        username: Set(Some(format!("user{user_id}"))),
        first_name: Set(format!("Test User {user_id}")),
        balance_cents: Set(balance_cents),
        language_code: Set("en".to_string()),
        currency: Set("USD".to_string()),
        is_banned: Set(false),
        registered_at: Set(chrono::Utc::now()),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active category with no stock.
pub async fn create_test_category(
    db: &DatabaseConnection,
    name: &str,
    price_cents: i64,
) -> Result<category::Model> {
    inventory::add_category(
        db,
        NewCategory {
            name: name.to_string(),
            code: "+95".to_string(),
            flag_emoji: None,
            price: money::from_cents(price_cents),
        },
    )
    .await
}

/// Inserts unsold goods directly, bypassing the stock directory, and refreshes the stock count.
///
/// Payloads are `session-<phone>`; source paths point to `seed/<phone>.session`.
pub async fn seed_goods(
    db: &DatabaseConnection,
    category_id: i64,
    phones: &[&str],
) -> Result<Vec<good::Model>> {
    let mut goods = Vec::with_capacity(phones.len());
    for phone in phones {
        let model = good::ActiveModel {
            category_id: Set(category_id),
            phone_number: Set((*phone).to_string()),
            payload: Set(format!("session-{phone}").into_bytes()),
            source_path: Set(format!("seed/{phone}.session")),
            is_sold: Set(false),
            buyer_id: Set(None),
            sold_at: Set(None),
            added_at: Set(chrono::Utc::now()),
            ..Default::default()
        };
        goods.push(model.insert(db).await?);
    }
    inventory::recount_category(db, category_id).await?;
    Ok(goods)
}

/// Writes `<root>/<folder>/<phone>.session` containing `session-<phone>`.
pub fn write_session(root: &Path, folder: &str, phone: &str) -> Result<()> {
    let dir = root.join(folder);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(format!("{phone}.session")), format!("session-{phone}"))?;
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call recorded by [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `send_text` or `send_with_actions`
    Text {
        /// Destination
        chat: ChatId,
        /// Body
        text: String,
        /// Callback ids and link URLs
        actions: Vec<String>,
    },
    /// `send_photo`
    Photo {
        /// Destination
        chat: ChatId,
        /// Photo handle
        photo: String,
        /// Caption
        caption: String,
        /// Callback ids and link URLs
        actions: Vec<String>,
    },
    /// `send_document`
    Document {
        /// Destination
        chat: ChatId,
        /// File name
        file_name: String,
        /// File contents
        bytes: Vec<u8>,
    },
    /// `edit_text`
    Edit {
        /// Edited message
        message: MessageRef,
        /// New text
        text: String,
    },
    /// `delete`
    Delete {
        /// Deleted message
        message: MessageRef,
    },
    /// `copy_message`
    Copy {
        /// Destination
        to: ChatId,
        /// Copied message
        source: MessageRef,
    },
}

/// Messaging gateway fake that records every call and can fail per recipient.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    log: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<ChatId, GatewayError>>,
    next_message_id: AtomicU64,
}

impl RecordingGateway {
    /// Makes every send to `chat` fail with `error`.
    pub fn fail_for(&self, chat: ChatId, error: GatewayError) {
        lock(&self.failures).insert(chat, error);
    }

    /// Everything recorded so far, in call order.
    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.log).clone()
    }

    /// Texts delivered to `chat`.
    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text, .. } if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Delivered photos as `(chat, photo, caption, actions)`.
    pub fn photos(&self) -> Vec<(ChatId, String, String, Vec<String>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Photo {
                    chat,
                    photo,
                    caption,
                    actions,
                } => Some((chat, photo, caption, actions)),
                _ => None,
            })
            .collect()
    }

    /// Delivered documents as `(chat, file_name, bytes)`.
    pub fn documents(&self) -> Vec<(ChatId, String, Vec<u8>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Document {
                    chat,
                    file_name,
                    bytes,
                } => Some((chat, file_name, bytes)),
                _ => None,
            })
            .collect()
    }

    /// Edits as `(message, new text)`.
    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { message, text } => Some((message, text)),
                _ => None,
            })
            .collect()
    }

    /// Successful copies as `(destination, source)`.
    pub fn copies(&self) -> Vec<(ChatId, MessageRef)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Copy { to, source } => Some((to, source)),
                _ => None,
            })
            .collect()
    }

    fn check(&self, chat: ChatId) -> std::result::Result<(), GatewayError> {
        match lock(&self.failures).get(&chat) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, chat: ChatId, entry: Sent) -> MessageRef {
        lock(&self.log).push(entry);
        let channel_id = match chat {
            ChatId::User(id) | ChatId::Channel(id) => id,
        };
        MessageRef {
            channel_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

fn action_keys(actions: &[Action]) -> Vec<String> {
    actions
        .iter()
        .map(|a| match a {
            Action::Callback { id, .. } => id.clone(),
            Action::Link { url, .. } => url.clone(),
        })
        .collect()
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
    ) -> std::result::Result<MessageRef, GatewayError> {
        self.send_with_actions(chat, text, &[]).await
    }

    async fn send_with_actions(
        &self,
        chat: ChatId,
        text: &str,
        actions: &[Action],
    ) -> std::result::Result<MessageRef, GatewayError> {
        self.check(chat)?;
        Ok(self.record(
            chat,
            Sent::Text {
                chat,
                text: text.to_string(),
                actions: action_keys(actions),
            },
        ))
    }

    async fn send_photo(
        &self,
        chat: ChatId,
        photo: &str,
        caption: &str,
        actions: &[Action],
    ) -> std::result::Result<MessageRef, GatewayError> {
        self.check(chat)?;
        Ok(self.record(
            chat,
            Sent::Photo {
                chat,
                photo: photo.to_string(),
                caption: caption.to_string(),
                actions: action_keys(actions),
            },
        ))
    }

    async fn send_document(
        &self,
        chat: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        _caption: &str,
    ) -> std::result::Result<MessageRef, GatewayError> {
        self.check(chat)?;
        Ok(self.record(
            chat,
            Sent::Document {
                chat,
                file_name: file_name.to_string(),
                bytes,
            },
        ))
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
    ) -> std::result::Result<(), GatewayError> {
        lock(&self.log).push(Sent::Edit {
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, message: MessageRef) -> std::result::Result<(), GatewayError> {
        lock(&self.log).push(Sent::Delete { message });
        Ok(())
    }

    async fn copy_message(
        &self,
        to: ChatId,
        source: MessageRef,
    ) -> std::result::Result<MessageRef, GatewayError> {
        self.check(to)?;
        Ok(self.record(to, Sent::Copy { to, source }))
    }
}

/// Payment provider fake: invoices start `active`, statuses are set by the test.
#[derive(Debug, Default)]
pub struct StubPaymentProvider {
    statuses: Mutex<HashMap<i64, InvoiceStatus>>,
    next_invoice_id: AtomicI64,
    unavailable: AtomicBool,
}

impl StubPaymentProvider {
    /// Sets the status returned for an invoice.
    pub fn set_status(&self, invoice_id: i64, status: InvoiceStatus) {
        lock(&self.statuses).insert(invoice_id, status);
    }

    /// Makes every call fail with `ExternalProviderUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::ExternalProviderUnavailable {
                provider: "stub",
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for StubPaymentProvider {
    async fn create_invoice(
        &self,
        _amount: Decimal,
        _asset: &str,
        _description: &str,
    ) -> Result<Invoice> {
        self.ensure_available()?;
        let invoice_id = 1000 + self.next_invoice_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.statuses).insert(invoice_id, InvoiceStatus::Active);
        Ok(Invoice {
            invoice_id,
            pay_url: format!("https://pay.example/invoice/{invoice_id}"),
        })
    }

    async fn get_invoices(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceState>> {
        self.ensure_available()?;
        let statuses = lock(&self.statuses);
        Ok(invoice_ids
            .iter()
            .filter_map(|id| {
                statuses.get(id).map(|status| InvoiceState {
                    invoice_id: *id,
                    status: *status,
                })
            })
            .collect())
    }
}
