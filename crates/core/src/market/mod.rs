pub mod yahoo;

use crate::domain::metric::Window;
use rust_decimal::Decimal;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Close price for `symbol` at the given lookback window.
    ///
    /// `Ok(None)` means the provider answered but had no usable close for that window
    /// (e.g. fewer than two sessions for the prior-day close).
    async fn sample(&self, symbol: &str, window: Window) -> anyhow::Result<Option<Decimal>>;
}
