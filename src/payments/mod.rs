//! Payment provider port.
//!
//! Automated top-ups create an invoice with the provider and later poll its status. The core
//! only sees [`PaymentProvider`]; [`crypto_pay::CryptoPayClient`] is the HTTP adapter.

pub mod crypto_pay;

use crate::errors::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

pub use crypto_pay::CryptoPayClient;

/// Asset invoices are issued in.
pub const DEFAULT_ASSET: &str = "USDT";

/// Invoice lifetime requested from the provider, in seconds.
pub const INVOICE_EXPIRY_SECS: u64 = 3600;

/// Provider-side state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Not paid yet, still payable
    Active,
    /// Paid
    Paid,
    /// Lifetime elapsed without payment
    Expired,
}

/// A freshly created invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Provider invoice id
    pub invoice_id: i64,
    /// Page where the user pays
    pub pay_url: String,
}

/// Status of an existing invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceState {
    /// Provider invoice id
    pub invoice_id: i64,
    /// Current status
    pub status: InvoiceStatus,
}

/// Invoice operations of a third-party payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates an invoice for `amount` of `asset`.
    async fn create_invoice(&self, amount: Decimal, asset: &str, description: &str)
    -> Result<Invoice>;

    /// Looks up the status of existing invoices; unknown ids are simply absent.
    async fn get_invoices(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceState>>;
}
