//! Providers module - market data acquisition with failover
//!
//! A `BarProvider` wraps one upstream vendor. The `ProviderHealthTracker`
//! ranks providers from rolling success/failure/latency stats, and the
//! `MarketDataFetcher` walks that ordering under per-call timeout budgets
//! with a read-through TTL cache in front.

pub mod auth;
pub mod fetcher;
pub mod health;
pub mod http;
pub mod traits;

pub use fetcher::MarketDataFetcher;
pub use health::{ProviderHealthSnapshot, ProviderHealthTracker};
pub use http::HttpBarProvider;
pub use traits::BarProvider;
