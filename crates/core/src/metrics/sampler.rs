use crate::domain::metric::{MetricDefinition, MetricSample, MetricSnapshot, PriceObservation, Window};
use crate::market::MarketDataProvider;
use futures::future::join_all;
use std::collections::BTreeMap;

pub struct MetricSampler<'a> {
    provider: &'a dyn MarketDataProvider,
}

impl<'a> MetricSampler<'a> {
    pub fn new(provider: &'a dyn MarketDataProvider) -> Self {
        Self { provider }
    }

    /// Fetches the four windows of one metric concurrently. Errors and empty answers
    /// both become an absent observation.
    pub async fn sample(&self, def: &MetricDefinition) -> MetricSample {
        let (current, prior_day, prior_month, prior_year) = tokio::join!(
            self.observe(def, Window::Current),
            self.observe(def, Window::PriorDay),
            self.observe(def, Window::PriorMonth),
            self.observe(def, Window::PriorYear),
        );

        let observations = BTreeMap::from([
            (Window::Current, current),
            (Window::PriorDay, prior_day),
            (Window::PriorMonth, prior_month),
            (Window::PriorYear, prior_year),
        ]);

        MetricSample {
            definition: def.clone(),
            observations,
        }
    }

    async fn observe(&self, def: &MetricDefinition, window: Window) -> Option<PriceObservation> {
        match self.provider.sample(&def.symbol, window).await {
            Ok(Some(value)) => Some(PriceObservation::new(value, window)),
            Ok(None) => {
                tracing::warn!(
                    metric = %def.name,
                    symbol = %def.symbol,
                    %window,
                    provider = self.provider.provider_name(),
                    "no close available for window"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    metric = %def.name,
                    symbol = %def.symbol,
                    %window,
                    provider = self.provider.provider_name(),
                    error = %err,
                    "sample failed"
                );
                None
            }
        }
    }

    /// Samples every metric concurrently and keeps only complete snapshots, in
    /// definition order.
    pub async fn sample_all(&self, defs: &[MetricDefinition]) -> Vec<MetricSnapshot> {
        let samples = join_all(defs.iter().map(|def| self.sample(def))).await;

        let mut snapshots = Vec::with_capacity(samples.len());
        for sample in samples {
            let name = sample.definition.name.clone();
            let symbol = sample.definition.symbol.clone();
            let missing = sample.missing_windows();
            match sample.into_snapshot() {
                Ok(snap) => {
                    tracing::info!(
                        metric = %name,
                        %symbol,
                        current = %snap.current.value,
                        prior_day = ?snap.references.get(&Window::PriorDay).map(|o| o.value),
                        prior_month = ?snap.references.get(&Window::PriorMonth).map(|o| o.value),
                        prior_year = ?snap.references.get(&Window::PriorYear).map(|o| o.value),
                        change_1d = ?snap.change(Window::PriorDay),
                        change_1m = ?snap.change(Window::PriorMonth),
                        change_1y = ?snap.change(Window::PriorYear),
                        "metric sampled"
                    );
                    snapshots.push(snap);
                }
                Err(err) => {
                    tracing::warn!(
                        metric = %name,
                        %symbol,
                        ?missing,
                        error = %err,
                        "incomplete metric dropped"
                    );
                }
            }
        }
        snapshots
    }
}
