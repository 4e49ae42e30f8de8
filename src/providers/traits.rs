//! Trait definitions for market data providers

use std::time::Duration;

use async_trait::async_trait;

use crate::common::errors::Result;
use crate::common::types::{Bar, Instrument};

/// Trait for upstream bar providers (HTTP vendors, test doubles, ...)
///
/// Implementations fetch a price series for one instrument. The wire
/// format is the provider's own concern; the pipeline only sees `Bar`s.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Stable provider name used by the health tracker
    fn name(&self) -> &str;

    /// Fetch the most recent `window` bars for an instrument
    ///
    /// The timeout is advisory for the provider's own transport; the
    /// fetcher additionally enforces it from the outside.
    async fn fetch(
        &self,
        instrument: &Instrument,
        window: u32,
        timeout: Duration,
    ) -> Result<Vec<Bar>>;
}
