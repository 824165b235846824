use crate::domain::analysis::RiskScore;
use crate::domain::metric::{MetricDefinition, MetricSnapshot};
use rust_decimal::Decimal;

/// Metric name → polarity (`true` = rising is risk-on), in configuration order.
#[derive(Debug, Clone, Default)]
pub struct PolarityTable {
    entries: Vec<(String, bool)>,
}

impl PolarityTable {
    pub fn from_definitions(defs: &[MetricDefinition]) -> Self {
        let mut table = Self::default();
        for def in defs {
            table.insert(def.name.clone(), def.polarity);
        }
        table
    }

    /// Inserts or replaces an entry; replacing keeps the table size unchanged.
    pub fn insert(&mut self, name: impl Into<String>, polarity: bool) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = polarity,
            None => self.entries.push((name, polarity)),
        }
    }

    pub fn polarity(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts risk-on votes on the daily change and scales them to 0..=10.
///
/// The denominator is the size of the polarity table, not the number of metrics that
/// reported: a metric that failed to sample does not vote and pulls the score down.
pub fn score(snapshots: &[MetricSnapshot], table: &PolarityTable) -> RiskScore {
    let total = table.len();
    if total == 0 {
        return RiskScore::new(0);
    }

    let votes = snapshots
        .iter()
        .filter(|snap| {
            let Some(polarity) = table.polarity(snap.name()) else {
                return false;
            };
            let Some(daily) = snap.daily_change() else {
                return false;
            };
            is_risk_on_vote(daily, polarity)
        })
        .count()
        .min(total);

    // round_half_up(votes * 10 / total) in integers.
    let value = (votes * 20 + total) / (total * 2);
    RiskScore::new(value as u8)
}

fn is_risk_on_vote(daily_change: Decimal, polarity: bool) -> bool {
    (daily_change > Decimal::ZERO && polarity) || (daily_change < Decimal::ZERO && !polarity)
}
