use crate::domain::metric::{round_dp, Window};
use crate::market::MarketDataProvider;
use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use yahoo_finance_api as yahoo;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ATTEMPTS: u32 = 3;
const DAILY_INTERVAL: &str = "1d";

pub struct YahooChartProvider {
    connector: yahoo::YahooConnector,
    timeout: Duration,
    attempts: u32,
}

impl YahooChartProvider {
    pub fn from_env() -> Result<Self> {
        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let attempts = attempts_from(std::env::var("MARKET_DATA_ATTEMPTS").ok().as_deref());

        let connector =
            yahoo::YahooConnector::new().context("failed to build Yahoo Finance connector")?;

        Ok(Self {
            connector,
            timeout: Duration::from_secs(timeout_secs),
            attempts,
        })
    }

    async fn fetch_once(&self, symbol: &str, range: &str) -> Result<Vec<f64>> {
        let response = tokio::time::timeout(
            self.timeout,
            self.connector.get_quote_range(symbol, DAILY_INTERVAL, range),
        )
        .await
        .with_context(|| format!("market data request for {symbol} ({range}) timed out"))?
        .with_context(|| format!("market data request for {symbol} ({range}) failed"))?;

        // A response without quotes is an answer, not a transport failure.
        Ok(match response.quotes() {
            Ok(quotes) => finite_closes(quotes.iter().map(|q| q.close)),
            Err(err) => {
                tracing::debug!(%symbol, range, error = %err, "chart response has no quotes");
                Vec::new()
            }
        })
    }

    async fn fetch_closes(&self, symbol: &str, range: &str) -> Result<Vec<f64>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol, range).await {
                Ok(closes) => return Ok(closes),
                Err(err) => {
                    if attempt >= self.attempts {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        %symbol,
                        range,
                        error = %err,
                        "market data fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn provider_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn sample(&self, symbol: &str, window: Window) -> Result<Option<Decimal>> {
        let closes = self.fetch_closes(symbol, range_for(window)).await?;
        Ok(pick_close(&closes, window).and_then(to_price))
    }
}

fn range_for(window: Window) -> &'static str {
    match window {
        Window::Current => "1d",
        Window::PriorDay => "5d",
        Window::PriorMonth => "1mo",
        Window::PriorYear => "1y",
    }
}

/// Chronological closes with missing (NaN) sessions dropped.
fn finite_closes(closes: impl IntoIterator<Item = f64>) -> Vec<f64> {
    closes.into_iter().filter(|c| c.is_finite()).collect()
}

/// Current: last close. Prior day: second-to-last close of the 5-day range.
/// Prior month/year: first close of the range.
fn pick_close(closes: &[f64], window: Window) -> Option<f64> {
    match window {
        Window::Current => closes.last().copied(),
        Window::PriorDay => {
            if closes.len() > 1 {
                closes.get(closes.len() - 2).copied()
            } else {
                None
            }
        }
        Window::PriorMonth | Window::PriorYear => closes.first().copied(),
    }
}

fn to_price(v: f64) -> Option<Decimal> {
    if !v.is_finite() {
        return None;
    }
    Decimal::from_f64(v).map(round_dp)
}

/// Total tries per request, the first one included. Never below one.
fn attempts_from(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_ATTEMPTS)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn drops_missing_sessions() {
        let closes = finite_closes([490.1, f64::NAN, 495.0, 500.004]);
        assert_eq!(closes, vec![490.1, 495.0, 500.004]);
    }

    #[test]
    fn picks_window_positions() {
        let closes = [490.1, 493.0, 495.0, 500.004];
        assert_eq!(pick_close(&closes, Window::Current), Some(500.004));
        assert_eq!(pick_close(&closes, Window::PriorDay), Some(495.0));
        assert_eq!(pick_close(&closes, Window::PriorMonth), Some(490.1));
        assert_eq!(pick_close(&closes, Window::PriorYear), Some(490.1));
    }

    #[test]
    fn prior_day_needs_two_sessions() {
        assert_eq!(pick_close(&[500.0], Window::PriorDay), None);
        assert_eq!(pick_close(&[], Window::Current), None);
    }

    #[test]
    fn prices_are_rounded_at_the_boundary() {
        assert_eq!(to_price(500.004), Some(dec!(500.00)));
        assert_eq!(to_price(1.08567), Some(dec!(1.09)));
        assert_eq!(to_price(f64::NAN), None);
    }

    #[test]
    fn attempts_count_the_first_request() {
        assert_eq!(attempts_from(None), DEFAULT_ATTEMPTS);
        assert_eq!(attempts_from(Some("1")), 1);
        assert_eq!(attempts_from(Some("0")), 1);
        assert_eq!(attempts_from(Some("five")), DEFAULT_ATTEMPTS);
    }

    #[test]
    fn each_window_has_its_range() {
        let ranges: Vec<_> = Window::ALL.into_iter().map(range_for).collect();
        assert_eq!(ranges, ["1d", "5d", "1mo", "1y"]);
    }
}
