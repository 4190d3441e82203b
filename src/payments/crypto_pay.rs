//! Reqwest-backed Crypto Pay adapter.
//!
//! Every response is wrapped as `{"ok": bool, "result": ...}`; a transport error, a non-2xx
//! status, `ok = false`, or an undecodable body all surface as
//! `ExternalProviderUnavailable`.

use super::{INVOICE_EXPIRY_SECS, Invoice, InvoiceState, InvoiceStatus, PaymentProvider};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

const PROVIDER: &str = "Crypto Pay";
const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    asset: &'a str,
    amount: String,
    description: &'a str,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct InvoiceDto {
    invoice_id: i64,
    bot_invoice_url: Option<String>,
    pay_url: Option<String>,
}

impl InvoiceDto {
    fn into_invoice(self) -> Result<Invoice> {
        let pay_url = self
            .bot_invoice_url
            .or(self.pay_url)
            .ok_or_else(|| Error::ExternalProviderUnavailable {
                provider: PROVIDER,
                reason: format!("invoice {} has no payment link", self.invoice_id),
            })?;
        Ok(Invoice {
            invoice_id: self.invoice_id,
            pay_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceListDto {
    #[serde(default)]
    items: Vec<InvoiceStateDto>,
}

#[derive(Debug, Deserialize)]
struct InvoiceStateDto {
    invoice_id: i64,
    status: InvoiceStatus,
}

/// Crypto Pay API client.
pub struct CryptoPayClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CryptoPayClient {
    /// Builds a client against `base_url` (e.g. `https://pay.crypt.bot/api`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await.map_err(unavailable)?;
        if !status.is_success() {
            warn!("{} answered HTTP {}", PROVIDER, status);
        }
        parse_envelope(&body)
    }
}

#[async_trait]
impl PaymentProvider for CryptoPayClient {
    async fn create_invoice(
        &self,
        amount: Decimal,
        asset: &str,
        description: &str,
    ) -> Result<Invoice> {
        let body = CreateInvoiceBody {
            asset,
            amount: amount.round_dp(2).to_string(),
            description,
            expires_in: INVOICE_EXPIRY_SECS,
        };

        let response = self
            .client
            .post(self.endpoint("createInvoice"))
            .header(TOKEN_HEADER, self.token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let dto: InvoiceDto = Self::read(response).await?;
        debug!("Created invoice {}", dto.invoice_id);
        dto.into_invoice()
    }

    async fn get_invoices(&self, invoice_ids: &[i64]) -> Result<Vec<InvoiceState>> {
        let ids = invoice_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(self.endpoint("getInvoices"))
            .header(TOKEN_HEADER, self.token.as_str())
            .query(&[("invoice_ids", ids)])
            .send()
            .await
            .map_err(unavailable)?;

        let list: InvoiceListDto = Self::read(response).await?;
        Ok(list
            .items
            .into_iter()
            .map(|item| InvoiceState {
                invoice_id: item.invoice_id,
                status: item.status,
            })
            .collect())
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body).map_err(|e| {
        Error::ExternalProviderUnavailable {
            provider: PROVIDER,
            reason: format!("invalid response payload: {e}"),
        }
    })?;

    match envelope {
        Envelope {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        Envelope { error, .. } => Err(Error::ExternalProviderUnavailable {
            provider: PROVIDER,
            reason: error.map_or_else(|| "empty result".to_string(), |e| e.to_string()),
        }),
    }
}

fn unavailable(error: reqwest::Error) -> Error {
    Error::ExternalProviderUnavailable {
        provider: PROVIDER,
        reason: error.to_string(),
    }
}
