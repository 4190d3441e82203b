//! Display-currency conversion.
//!
//! Balances are kept in USD. For display they are converted with exchange rates cached in
//! memory and refreshed by a background task. Formatting only ever reads the cache: with no
//! rate for the requested currency the amount is shown in USD.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Currency balances are stored in.
pub const BASE_CURRENCY: &str = "USD";

const PROVIDER: &str = "Exchange rates";

/// Source of USD-based exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Returns `currency code -> units per 1 USD`.
    async fn fetch_rates(&self) -> Result<HashMap<String, Decimal>>;
}

#[derive(Debug, Deserialize)]
struct RatesDto {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// `open.er-api.com` rate source.
pub struct ErApiRates {
    client: Client,
    url: String,
}

impl ErApiRates {
    /// Builds a source for the given endpoint, e.g. `https://open.er-api.com/v6/latest/USD`.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::ExternalProviderUnavailable {
                provider: PROVIDER,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn parse_rates(body: &[u8]) -> Result<HashMap<String, Decimal>> {
    let dto: RatesDto =
        serde_json::from_slice(body).map_err(|e| Error::ExternalProviderUnavailable {
            provider: PROVIDER,
            reason: format!("invalid rates payload: {e}"),
        })?;
    if dto.result != "success" {
        return Err(Error::ExternalProviderUnavailable {
            provider: PROVIDER,
            reason: format!("result was '{}'", dto.result),
        });
    }
    Ok(dto
        .rates
        .into_iter()
        .filter_map(|(code, rate)| Decimal::try_from(rate).ok().map(|r| (code, r)))
        .collect())
}

#[async_trait]
impl RateSource for ErApiRates {
    async fn fetch_rates(&self) -> Result<HashMap<String, Decimal>> {
        let unavailable = |e: reqwest::Error| Error::ExternalProviderUnavailable {
            provider: PROVIDER,
            reason: e.to_string(),
        };
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unavailable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ExternalProviderUnavailable {
                provider: PROVIDER,
                reason: format!("HTTP {status}"),
            });
        }
        let body = response.bytes().await.map_err(unavailable)?;
        parse_rates(&body)
    }
}

/// Rounds half away from zero to cents.
#[must_use]
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount that is already in `currency`.
#[must_use]
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let amount = round_cents(amount);
    match currency.to_uppercase().as_str() {
        "RUB" => format!("{amount:.2} ₽"),
        "CNY" => format!("¥{amount:.2}"),
        _ => format!("${amount:.2}"),
    }
}

/// Process-wide converter with a shared rate cache.
#[derive(Clone)]
pub struct CurrencyConverter {
    rates: Arc<RwLock<HashMap<String, Decimal>>>,
    source: Arc<dyn RateSource>,
}

/// Handle of the background refresh task.
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the refresh loop.
    pub fn stop(self) {
        self.task.abort();
        info!("Stopped background currency rate updates.");
    }
}

impl CurrencyConverter {
    /// Creates a converter with an empty cache.
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        Self {
            rates: Arc::new(RwLock::new(HashMap::new())),
            source,
        }
    }

    /// Fetches rates and replaces the cache; the old cache is kept on failure.
    pub async fn refresh(&self) -> Result<usize> {
        let fetched = self.source.fetch_rates().await?;
        let count = fetched.len();
        *self.rates.write().await = fetched;
        debug!("Currency rates updated: {} currencies", count);
        Ok(count)
    }

    /// Cached rate for a currency.
    pub async fn rate(&self, currency: &str) -> Option<Decimal> {
        let currency = currency.to_uppercase();
        if currency == BASE_CURRENCY {
            return Some(Decimal::ONE);
        }
        self.rates.read().await.get(&currency).copied()
    }

    /// Converts a USD amount, or `None` when no rate is cached.
    pub async fn convert(&self, amount_usd: Decimal, currency: &str) -> Option<Decimal> {
        self.rate(currency).await.map(|rate| amount_usd * rate)
    }

    /// Formats a USD amount in the user's display currency, falling back to USD.
    pub async fn format(&self, amount_usd: Decimal, currency: &str) -> String {
        match self.convert(amount_usd, currency).await {
            Some(converted) => format_amount(converted, currency),
            None => format_amount(amount_usd, BASE_CURRENCY),
        }
    }

    /// Starts refreshing rates every `interval`, beginning immediately.
    #[must_use]
    pub fn spawn_refresh(&self, interval: Duration) -> RefreshHandle {
        let converter = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match converter.refresh().await {
                    Ok(count) => info!("Currency rates updated successfully ({} rates).", count),
                    Err(e) => warn!("Error updating currency rates: {}", e),
                }
            }
        });
        info!("Started background currency rate updates.");
        RefreshHandle { task }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubRates {
        rates: Mutex<Option<HashMap<String, Decimal>>>,
        calls: Mutex<u32>,
    }

    impl StubRates {
        fn with(rates: &[(&str, Decimal)]) -> Self {
            let map = rates.iter().map(|(c, r)| ((*c).to_string(), *r)).collect();
            Self {
                rates: Mutex::new(Some(map)),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl RateSource for StubRates {
        async fn fetch_rates(&self) -> Result<HashMap<String, Decimal>> {
            *self.calls.lock().unwrap() += 1;
            self.rates
                .lock()
                .unwrap()
                .clone()
                .ok_or(Error::ExternalProviderUnavailable {
                    provider: PROVIDER,
                    reason: "down".to_string(),
                })
        }
    }

    #[test]
    fn test_format_amount_symbols_and_rounding() {
        assert_eq!(format_amount(Decimal::new(12345, 3), "USD"), "$12.35");
        assert_eq!(format_amount(Decimal::new(5, 0), "rub"), "5.00 ₽");
        assert_eq!(format_amount(Decimal::new(1005, 3), "CNY"), "¥1.01");
        assert_eq!(format_amount(Decimal::ONE, "XYZ"), "$1.00");
    }

    #[tokio::test]
    async fn test_format_falls_back_to_usd_without_rates() {
        let converter = CurrencyConverter::new(Arc::new(StubRates::default()));
        assert!(converter.refresh().await.is_err());
        assert_eq!(converter.format(Decimal::new(150, 2), "RUB").await, "$1.50");
        assert_eq!(converter.format(Decimal::new(150, 2), "USD").await, "$1.50");
    }

    #[tokio::test]
    async fn test_format_converts_with_cached_rate() -> Result<()> {
        let converter = CurrencyConverter::new(Arc::new(StubRates::with(&[
            ("RUB", Decimal::new(9050, 2)),
            ("CNY", Decimal::new(72, 1)),
        ])));
        assert_eq!(converter.refresh().await?, 2);

        assert_eq!(converter.format(Decimal::new(2, 0), "RUB").await, "181.00 ₽");
        assert_eq!(converter.format(Decimal::new(150, 2), "CNY").await, "¥10.80");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_runs_until_stopped() {
        let source = Arc::new(StubRates::with(&[("RUB", Decimal::new(90, 0))]));
        let converter = CurrencyConverter::new(Arc::clone(&source) as Arc<dyn RateSource>);

        let handle = converter.spawn_refresh(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_secs(7201)).await;
        assert_eq!(*source.calls.lock().unwrap(), 3);
        assert_eq!(converter.rate("rub").await, Some(Decimal::new(90, 0)));

        handle.stop();
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(*source.calls.lock().unwrap(), 3);
    }

    #[test]
    fn test_parse_rates_payload() {
        let body = br#"{"result":"success","base_code":"USD","rates":{"USD":1,"RUB":90.5}}"#;
        let rates = parse_rates(body).unwrap();
        assert_eq!(rates["RUB"], Decimal::new(905, 1));

        let body = br#"{"result":"error","error-type":"unsupported-code"}"#;
        assert!(parse_rates(body).is_err());
    }
}
