use crate::analysis::{AnalysisOrchestrator, AnalysisStage};
use crate::domain::analysis::RiskScore;
use crate::domain::metric::{reference_metrics, MetricDefinition};
use crate::llm::{CompletionClient, CompletionSettings};
use crate::market::MarketDataProvider;
use crate::metrics::risk::{self, PolarityTable};
use crate::metrics::sampler::MetricSampler;
use crate::prompt::PromptComposer;
use crate::publish::ReportPublisher;
use crate::storage::{Collection, DocumentStore};
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Published(String),
    Failed(String),
    /// No store attached (dry run).
    Skipped,
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Published(id) => write!(f, "published:{id}"),
            PublishStatus::Failed(_) => f.write_str("failed"),
            PublishStatus::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No metric produced a complete snapshot; nothing was analysed or published.
    NoData,
    Completed {
        risk_score: RiskScore,
        stage: AnalysisStage,
    },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_date: NaiveDate,
    /// Date the analysis and compiled records were keyed on.
    pub record_date: NaiveDate,
    pub snapshots: usize,
    pub outcome: RunOutcome,
    pub published: Vec<(Collection, PublishStatus)>,
}

impl RunReport {
    pub fn risk_score(&self) -> Option<RiskScore> {
        match &self.outcome {
            RunOutcome::Completed { risk_score, .. } => Some(*risk_score),
            RunOutcome::NoData => None,
        }
    }

    pub fn publish_failures(&self) -> usize {
        self.published
            .iter()
            .filter(|(_, status)| matches!(status, PublishStatus::Failed(_)))
            .count()
    }
}

/// One daily report run over injected collaborators. Without a store every publish is
/// skipped and the record date is the run date.
pub struct DailyRun<'a> {
    market: &'a dyn MarketDataProvider,
    completions: &'a dyn CompletionClient,
    store: Option<&'a dyn DocumentStore>,
    metrics: Vec<MetricDefinition>,
    polarity: PolarityTable,
    composer: PromptComposer,
    completion_settings: CompletionSettings,
}

impl<'a> DailyRun<'a> {
    pub fn new(
        market: &'a dyn MarketDataProvider,
        completions: &'a dyn CompletionClient,
        store: Option<&'a dyn DocumentStore>,
    ) -> Self {
        let metrics = reference_metrics();
        let polarity = PolarityTable::from_definitions(&metrics);
        Self {
            market,
            completions,
            store,
            metrics,
            polarity,
            composer: PromptComposer::default(),
            completion_settings: CompletionSettings::default(),
        }
    }

    /// Replaces the metric set; the polarity table follows it.
    pub fn with_metrics(mut self, metrics: Vec<MetricDefinition>) -> Self {
        self.polarity = PolarityTable::from_definitions(&metrics);
        self.metrics = metrics;
        self
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_completion_settings(mut self, settings: CompletionSettings) -> Self {
        self.completion_settings = settings;
        self
    }

    /// Awaits one publish and records its status. Returns whether it was written.
    async fn publish_step<F>(
        &self,
        collection: Collection,
        published: &mut Vec<(Collection, PublishStatus)>,
        fut: F,
    ) -> bool
    where
        F: std::future::Future<Output = Result<String, crate::error::SimsError>>,
    {
        let status = match fut.await {
            Ok(id) => PublishStatus::Published(id),
            Err(err) => PublishStatus::Failed(err.to_string()),
        };
        let written = matches!(status, PublishStatus::Published(_));
        published.push((collection, status));
        written
    }

    pub async fn execute(&self, run_date: NaiveDate) -> RunReport {
        tracing::info!(%run_date, metrics = self.metrics.len(), "daily run started");

        let snapshots = MetricSampler::new(self.market)
            .sample_all(&self.metrics)
            .await;

        if snapshots.is_empty() {
            tracing::warn!(%run_date, "no complete metric snapshots; nothing to publish");
            return RunReport {
                run_date,
                record_date: run_date,
                snapshots: 0,
                outcome: RunOutcome::NoData,
                published: Vec::new(),
            };
        }

        let risk_score = risk::score(&snapshots, &self.polarity);
        tracing::info!(
            %run_date,
            snapshots = snapshots.len(),
            risk_score = risk_score.value,
            sentiment = %risk_score.sentiment,
            "risk score computed"
        );

        let mut published = Vec::with_capacity(3);
        let publisher = self.store.map(ReportPublisher::new);

        let record_date = match &publisher {
            Some(publisher) => {
                let written = self
                    .publish_step(
                        Collection::DailyMetrics,
                        &mut published,
                        publisher.publish_metrics(run_date, &snapshots),
                    )
                    .await;

                // The latest record only speaks for this run if this run wrote it.
                if !written {
                    run_date
                } else {
                    match publisher.latest_metrics_date().await {
                        Some(date) => {
                            if date != run_date {
                                tracing::info!(%run_date, record_date = %date, "keying analysis on latest metrics record");
                            }
                            date
                        }
                        None => run_date,
                    }
                }
            }
            None => {
                published.push((Collection::DailyMetrics, PublishStatus::Skipped));
                run_date
            }
        };

        let prompts = match self.composer.compose(record_date, &snapshots) {
            Ok(prompts) => prompts,
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::error!(%run_date, error = %detail, "prompts not composed; analysis skipped");
                for collection in [Collection::Analysis, Collection::CompiledAnalysis] {
                    published.push((collection, PublishStatus::Failed(detail.clone())));
                }
                return RunReport {
                    run_date,
                    record_date,
                    snapshots: snapshots.len(),
                    outcome: RunOutcome::Completed {
                        risk_score,
                        stage: AnalysisStage::Init,
                    },
                    published,
                };
            }
        };
        let outcome = AnalysisOrchestrator::new(
            self.completions,
            self.completion_settings.clone(),
            self.composer.templates(),
        )
        .run(&prompts, risk_score)
        .await;

        match &publisher {
            Some(publisher) => {
                self.publish_step(
                    Collection::Analysis,
                    &mut published,
                    publisher.publish_analysis(record_date, &outcome.bundle),
                )
                .await;
                self.publish_step(
                    Collection::CompiledAnalysis,
                    &mut published,
                    publisher.publish_compiled(record_date, &outcome.compiled),
                )
                .await;
            }
            None => {
                published.push((Collection::Analysis, PublishStatus::Skipped));
                published.push((Collection::CompiledAnalysis, PublishStatus::Skipped));
            }
        }

        RunReport {
            run_date,
            record_date,
            snapshots: snapshots.len(),
            outcome: RunOutcome::Completed {
                risk_score,
                stage: outcome.stage,
            },
            published,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fakes::ScriptedCompletions;
    use crate::domain::analysis::FAILURE_MARKER;
    use crate::metrics::sampler::fakes::FixedPrices;
    use crate::prompt::templates::TemplateSet;
    use crate::storage::memory::MemoryStore;
    use crate::storage::{PropertyValue, Record, UnavailableStore, DATE_PROPERTY};
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn two_metrics() -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("S&P 500 ETF", "SPY", true),
            MetricDefinition::new("VIX", "^VIX", false),
        ]
    }

    fn prices() -> FixedPrices {
        FixedPrices::default()
            .with("SPY", [Some(dec!(500)), Some(dec!(495)), Some(dec!(480)), Some(dec!(400))])
            .with("^VIX", [Some(dec!(14)), Some(dec!(15)), Some(dec!(16)), Some(dec!(20))])
    }

    #[tokio::test]
    async fn publishes_three_records_for_a_full_run() {
        let market = prices();
        let llm = ScriptedCompletions::default()
            .reply("Charlie Munger", "Stay patient.")
            .reply("Summary:", "Risk on.")
            .reply("Insight:", "Breadth improving.")
            .reply("Watchlist:", "SPY, ^VIX, GC=F");
        let store = MemoryStore::default();

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.snapshots, 2);
        // SPY up and VIX down: two risk-on votes out of two.
        assert_eq!(
            report.outcome,
            RunOutcome::Completed {
                risk_score: RiskScore::new(10),
                stage: AnalysisStage::Done,
            }
        );
        assert_eq!(report.publish_failures(), 0);
        assert_eq!(report.published.len(), 3);

        let metrics = store.records_in(Collection::DailyMetrics);
        assert_eq!(metrics.len(), 1);
        assert_eq!(
            metrics[0].get("S&P 500 ETF 1D % Change").and_then(PropertyValue::as_number),
            Some(dec!(1.01))
        );

        let compiled = store.records_in(Collection::CompiledAnalysis);
        assert_eq!(compiled[0].get("AI Analysis").and_then(PropertyValue::text).as_deref(), Some("Stay patient."));
        assert_eq!(compiled[0].get("Watchlist").and_then(PropertyValue::text).as_deref(), Some("SPY, ^VIX, GC=F"));
        assert_eq!(llm.prompts().len(), 4);
    }

    #[tokio::test]
    async fn no_complete_snapshot_is_a_noop() {
        let market = FixedPrices::default().with("SPY", [Some(dec!(500)), None, None, None]);
        let llm = ScriptedCompletions::failing();
        let store = MemoryStore::default();

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.outcome, RunOutcome::NoData);
        assert!(report.published.is_empty());
        assert!(store.records.lock().unwrap().is_empty());
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn failed_publish_does_not_stop_later_publishes() {
        let market = prices();
        let llm = ScriptedCompletions::failing();
        let store = MemoryStore {
            reject: vec![Collection::Analysis],
            ..MemoryStore::default()
        };

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.publish_failures(), 1);
        let compiled = store.records_in(Collection::CompiledAnalysis);
        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled[0].get("AI Analysis").and_then(PropertyValue::text).as_deref(),
            Some(FAILURE_MARKER)
        );
    }

    #[tokio::test]
    async fn analysis_is_keyed_on_latest_metrics_date() {
        let market = prices();
        let llm = ScriptedCompletions::failing();
        let store = MemoryStore::default();
        let later = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        store.records.lock().unwrap().push((
            Collection::DailyMetrics,
            Record::new().with(DATE_PROPERTY, PropertyValue::Date(later)),
        ));

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.record_date, later);
        let analysis = store.records_in(Collection::Analysis);
        assert_eq!(analysis[0].date(), Some(later));
        assert!(llm.prompts()[0].starts_with("Date: 2026-10-19\n"));
    }

    #[tokio::test]
    async fn failed_metrics_publish_keeps_run_date() {
        let market = prices();
        let llm = ScriptedCompletions::failing();
        let store = MemoryStore {
            reject: vec![Collection::DailyMetrics],
            ..MemoryStore::default()
        };
        let yesterday = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        store.records.lock().unwrap().push((
            Collection::DailyMetrics,
            Record::new().with(DATE_PROPERTY, PropertyValue::Date(yesterday)),
        ));

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.record_date, date());
        assert_eq!(report.publish_failures(), 1);
        assert_eq!(store.records_in(Collection::Analysis)[0].date(), Some(date()));
        assert_eq!(store.records_in(Collection::CompiledAnalysis)[0].date(), Some(date()));
        assert!(llm.prompts()[0].starts_with("Date: 2026-10-16\n"));
    }

    #[tokio::test]
    async fn unreachable_store_still_samples_and_analyses() {
        let market = prices();
        let llm = ScriptedCompletions::failing();
        let store = UnavailableStore::new("postgres", "connection refused");

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.snapshots, 2);
        assert_eq!(report.record_date, date());
        assert_eq!(report.publish_failures(), 3);
        assert_eq!(llm.prompts().len(), 4);
        assert!(matches!(
            report.outcome,
            RunOutcome::Completed { stage: AnalysisStage::Done, .. }
        ));
    }

    #[tokio::test]
    async fn unrenderable_template_skips_analysis_but_keeps_metrics() {
        let market = prices();
        let llm = ScriptedCompletions::failing();
        let store = MemoryStore::default();
        let templates = TemplateSet {
            insight: "Insight for {{ day }}".into(),
            ..TemplateSet::default()
        };

        let report = DailyRun::new(&market, &llm, Some(&store))
            .with_metrics(two_metrics())
            .with_composer(PromptComposer::new(templates))
            .execute(date())
            .await;

        assert_eq!(store.records_in(Collection::DailyMetrics).len(), 1);
        assert_eq!(report.publish_failures(), 2);
        assert!(llm.prompts().is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_every_publish() {
        let market = prices();
        let llm = ScriptedCompletions::failing();

        let report = DailyRun::new(&market, &llm, None)
            .with_metrics(two_metrics())
            .execute(date())
            .await;

        assert_eq!(report.record_date, date());
        assert_eq!(report.published.len(), 3);
        assert!(report
            .published
            .iter()
            .all(|(_, status)| *status == PublishStatus::Skipped));
        assert_eq!(llm.prompts().len(), 4);
    }
}
