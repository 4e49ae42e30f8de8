//! HTTP bar provider
//!
//! Fetches OHLCV series from a vendor's JSON REST endpoint, with optional
//! HMAC request signing for authenticated vendors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::auth::generate_auth_headers;
use super::traits::BarProvider;
use crate::common::errors::{PipelineError, Result};
use crate::common::types::{Bar, Instrument};
use crate::config::types::ApiCredentials;

/// Wire format for one bar row; prices arrive as strings
#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: chrono::DateTime<chrono::Utc>,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

/// Wire format for the bars endpoint response
#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<BarRow>,
}

/// REST client for one upstream bar vendor
#[derive(Debug, Clone)]
pub struct HttpBarProvider {
    /// Provider name for health tracking
    name: String,
    /// HTTP client
    client: Client,
    /// Base URL for the bars endpoint
    base_url: String,
    /// Optional API credentials for authenticated endpoints
    credentials: Option<ApiCredentials>,
}

impl HttpBarProvider {
    /// Create a new provider client (unauthenticated)
    pub fn new(name: &str, base_url: &str) -> Result<Self> {
        Self::with_timeout(name, base_url, Duration::from_secs(30))
    }

    /// Create a new provider client with custom transport timeout
    pub fn with_timeout(name: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn parse_decimal(field: &str, raw: &str) -> Result<Decimal> {
        raw.parse().map_err(|e| {
            PipelineError::Provider(format!("Invalid {} value '{}': {}", field, raw, e))
        })
    }

    fn convert_row(row: BarRow) -> Result<Bar> {
        Ok(Bar {
            timestamp: row.timestamp,
            open: Self::parse_decimal("open", &row.open)?,
            high: Self::parse_decimal("high", &row.high)?,
            low: Self::parse_decimal("low", &row.low)?,
            close: Self::parse_decimal("close", &row.close)?,
            volume: Self::parse_decimal("volume", &row.volume)?,
        })
    }
}

#[async_trait]
impl BarProvider for HttpBarProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn fetch(
        &self,
        instrument: &Instrument,
        window: u32,
        timeout: Duration,
    ) -> Result<Vec<Bar>> {
        let path = format!("/bars?symbol={}&limit={}", instrument, window);
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching bars from: {}", url);

        let mut request = self.client.get(&url).timeout(timeout);

        if let Some(creds) = &self.credentials {
            let headers =
                generate_auth_headers(&creds.api_key, &creds.api_secret, "GET", &path, "")?;
            request = headers.apply_to_request(request);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Provider(format!(
                "{} returned status {}: {}",
                self.name, status, body
            )));
        }

        let bars_response: BarsResponse = response.json().await?;

        if bars_response.bars.is_empty() {
            return Err(PipelineError::Provider(format!(
                "{} returned an empty series for {}",
                self.name, instrument
            )));
        }

        bars_response
            .bars
            .into_iter()
            .map(Self::convert_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let provider = HttpBarProvider::new("primary", "https://bars.example.com");
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "primary");
    }

    #[test]
    fn test_url_normalization() {
        let provider = HttpBarProvider::new("primary", "https://bars.example.com/").unwrap();
        assert!(!provider.base_url.ends_with('/'));
    }

    #[test]
    fn test_convert_row_rejects_bad_price() {
        let row = BarRow {
            timestamp: chrono::Utc::now(),
            open: "100.0".to_string(),
            high: "not-a-number".to_string(),
            low: "99.0".to_string(),
            close: "100.5".to_string(),
            volume: "1200".to_string(),
        };
        let result = HttpBarProvider::convert_row(row);
        assert!(matches!(result, Err(PipelineError::Provider(_))));
    }
}
