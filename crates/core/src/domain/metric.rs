use crate::error::SimsError;
use crate::metrics::change::percent_change;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prices and percent changes are carried at this many decimal places.
pub const PRICE_DP: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub symbol: String,
    /// `true` when a rising value is risk-on.
    pub polarity: bool,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, polarity: bool) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            polarity,
        }
    }
}

/// The reference twelve-metric configuration.
pub fn reference_metrics() -> Vec<MetricDefinition> {
    [
        ("S&P 500 ETF", "SPY", true),
        ("Russell 2000 ETF", "IWM", true),
        ("VIX", "^VIX", false),
        ("Crude Oil", "CL=F", true),
        ("Natural Gas", "NG=F", true),
        ("Gold", "GC=F", false),
        ("Copper", "HG=F", true),
        ("Euro Exchange Rate", "EURUSD=X", true),
        ("Japanese Yen Exchange Rate", "JPY=X", false),
        ("Bitcoin USD Exchange Rate", "BTC-USD", true),
        ("10-Year Treasury Yield", "^TNX", false),
        ("2-Year Treasury Yield", "^IRX", false),
    ]
    .into_iter()
    .map(|(name, symbol, polarity)| MetricDefinition::new(name, symbol, polarity))
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Current,
    PriorDay,
    PriorMonth,
    PriorYear,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::Current,
        Window::PriorDay,
        Window::PriorMonth,
        Window::PriorYear,
    ];

    pub const REFERENCES: [Window; 3] = [Window::PriorDay, Window::PriorMonth, Window::PriorYear];

    /// Column label used for the change fields ("1D", "1M", "1Y").
    pub fn change_label(self) -> Option<&'static str> {
        match self {
            Window::Current => None,
            Window::PriorDay => Some("1D"),
            Window::PriorMonth => Some("1M"),
            Window::PriorYear => Some("1Y"),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Window::Current => "current",
            Window::PriorDay => "prior_day",
            Window::PriorMonth => "prior_month",
            Window::PriorYear => "prior_year",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub value: Decimal,
    pub window: Window,
}

impl PriceObservation {
    pub fn new(value: Decimal, window: Window) -> Self {
        Self {
            value: round_dp(value),
            window,
        }
    }
}

pub fn round_dp(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Raw result of sampling one metric: one slot per window, `None` when unavailable.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub definition: MetricDefinition,
    pub observations: BTreeMap<Window, Option<PriceObservation>>,
}

impl MetricSample {
    pub fn missing_windows(&self) -> Vec<Window> {
        Window::ALL
            .into_iter()
            .filter(|w| !matches!(self.observations.get(w), Some(Some(_))))
            .collect()
    }

    /// Builds the complete snapshot, or reports the first missing window.
    ///
    /// A zero reference price does not make the snapshot incomplete; only that window's
    /// change is left out.
    pub fn into_snapshot(self) -> Result<MetricSnapshot, SimsError> {
        if let Some(window) = self.missing_windows().first().copied() {
            return Err(SimsError::SampleUnavailable {
                symbol: self.definition.symbol.clone(),
                window,
            });
        }

        let mut current = None;
        let mut references = BTreeMap::new();
        for (window, obs) in self.observations {
            let Some(obs) = obs else { continue };
            if window == Window::Current {
                current = Some(obs);
            } else {
                references.insert(window, obs);
            }
        }
        let current = current.ok_or_else(|| SimsError::SampleUnavailable {
            symbol: self.definition.symbol.clone(),
            window: Window::Current,
        })?;

        let mut changes = BTreeMap::new();
        for (window, reference) in &references {
            match percent_change(current.value, reference.value) {
                Ok(change) => {
                    changes.insert(*window, change);
                }
                Err(err) => {
                    tracing::warn!(
                        metric = %self.definition.name,
                        symbol = %self.definition.symbol,
                        %window,
                        error = %err,
                        "change not reportable for window"
                    );
                }
            }
        }

        Ok(MetricSnapshot {
            definition: self.definition,
            current,
            references,
            changes,
        })
    }
}

/// One metric's complete computed record for one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub definition: MetricDefinition,
    pub current: PriceObservation,
    pub references: BTreeMap<Window, PriceObservation>,
    /// Percent change per reference window. A missing key means the change was not
    /// reportable (zero reference), never zero.
    pub changes: BTreeMap<Window, Decimal>,
}

impl MetricSnapshot {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn daily_change(&self) -> Option<Decimal> {
        self.changes.get(&Window::PriorDay).copied()
    }

    pub fn change(&self, window: Window) -> Option<Decimal> {
        self.changes.get(&window).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(values: [Option<Decimal>; 4]) -> MetricSample {
        let observations = Window::ALL
            .into_iter()
            .zip(values)
            .map(|(w, v)| (w, v.map(|v| PriceObservation::new(v, w))))
            .collect();
        MetricSample {
            definition: MetricDefinition::new("S&P 500 ETF", "SPY", true),
            observations,
        }
    }

    #[test]
    fn reference_catalogue_has_twelve_unique_metrics() {
        let defs = reference_metrics();
        assert_eq!(defs.len(), 12);
        let names: std::collections::BTreeSet<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), 12);
        assert!(defs.iter().any(|d| d.symbol == "^VIX" && !d.polarity));
    }

    #[test]
    fn observation_rounds_to_two_places() {
        let obs = PriceObservation::new(dec!(495.005), Window::PriorDay);
        assert_eq!(obs.value, dec!(495.01));
    }

    #[test]
    fn complete_sample_builds_snapshot_with_all_changes() {
        let snap = sample([
            Some(dec!(500.00)),
            Some(dec!(495.00)),
            Some(dec!(480.00)),
            Some(dec!(400.00)),
        ])
        .into_snapshot()
        .unwrap();

        assert_eq!(snap.daily_change(), Some(dec!(1.01)));
        assert_eq!(snap.change(Window::PriorMonth), Some(dec!(4.17)));
        assert_eq!(snap.change(Window::PriorYear), Some(dec!(25.00)));
    }

    #[test]
    fn missing_reference_makes_snapshot_incomplete() {
        let err = sample([Some(dec!(500)), Some(dec!(495)), None, Some(dec!(400))])
            .into_snapshot()
            .unwrap_err();
        match err {
            SimsError::SampleUnavailable { symbol, window } => {
                assert_eq!(symbol, "SPY");
                assert_eq!(window, Window::PriorMonth);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_reference_drops_only_that_window() {
        let snap = sample([Some(dec!(500)), Some(dec!(0)), Some(dec!(250)), Some(dec!(400))])
            .into_snapshot()
            .unwrap();
        assert_eq!(snap.daily_change(), None);
        assert_eq!(snap.change(Window::PriorMonth), Some(dec!(100.00)));
        assert_eq!(snap.changes.len(), 2);
    }
}
