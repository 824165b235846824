use crate::domain::analysis::{AnalysisBundle, CompiledAnalysis, PromptName};
use crate::domain::metric::{MetricSnapshot, Window};
use crate::error::SimsError;
use crate::storage::{Collection, DocumentStore, PropertyValue, Record, DATE_PROPERTY};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Maximum characters per rich-text segment accepted by the store.
pub const MAX_SEGMENT_CHARS: usize = 2000;

/// Splits `text` into consecutive segments of at most `max` characters.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        if count == max {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn rich_text(text: &str) -> PropertyValue {
    PropertyValue::RichText(chunk_text(text, MAX_SEGMENT_CHARS))
}

/// `Friday, October 16, 2026`
pub fn title_for(date: NaiveDate) -> String {
    date.format("%A, %B %d, %Y").to_string()
}

pub fn metrics_record(date: NaiveDate, snapshots: &[MetricSnapshot]) -> Record {
    let mut record = Record::new().with(DATE_PROPERTY, PropertyValue::Date(date));
    for snap in snapshots {
        let name = snap.name();
        record = record.with(name, PropertyValue::Number(Some(snap.current.value)));
        for window in Window::REFERENCES {
            let Some(label) = window.change_label() else { continue };
            record = record.with(
                format!("{name} {label} % Change"),
                PropertyValue::Number(snap.change(window)),
            );
        }
    }
    record
}

pub fn analysis_record(date: NaiveDate, bundle: &AnalysisBundle) -> Record {
    PromptName::ALL.into_iter().fold(
        Record::new().with(DATE_PROPERTY, PropertyValue::Date(date)),
        |record, name| record.with(name.as_str(), rich_text(bundle.get(name).as_str())),
    )
}

pub fn compiled_record(date: NaiveDate, compiled: &CompiledAnalysis) -> Record {
    Record::new()
        .with("Name", PropertyValue::Title(title_for(date)))
        .with(DATE_PROPERTY, PropertyValue::Date(date))
        .with("AI Analysis", rich_text(compiled.text.as_str()))
        .with(
            "Risk On",
            PropertyValue::Number(Some(Decimal::from(compiled.risk_score.value))),
        )
        .with(
            "Sentiment",
            PropertyValue::Select(compiled.risk_score.sentiment.as_str().to_string()),
        )
        .with("Watchlist", rich_text(&compiled.watchlist))
}

pub struct ReportPublisher<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ReportPublisher<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    async fn publish(&self, collection: Collection, record: Record) -> Result<String, SimsError> {
        match self.store.insert(collection, &record).await {
            Ok(id) => {
                tracing::info!(
                    %collection,
                    backend = self.store.backend_name(),
                    record_id = %id,
                    "record published"
                );
                Ok(id)
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::error!(
                    %collection,
                    backend = self.store.backend_name(),
                    error = %detail,
                    "publish failed"
                );
                Err(SimsError::PublishFailure {
                    collection: collection.to_string(),
                    detail,
                })
            }
        }
    }

    pub async fn publish_metrics(
        &self,
        date: NaiveDate,
        snapshots: &[MetricSnapshot],
    ) -> Result<String, SimsError> {
        self.publish(Collection::DailyMetrics, metrics_record(date, snapshots))
            .await
    }

    pub async fn publish_analysis(
        &self,
        date: NaiveDate,
        bundle: &AnalysisBundle,
    ) -> Result<String, SimsError> {
        self.publish(Collection::Analysis, analysis_record(date, bundle))
            .await
    }

    pub async fn publish_compiled(
        &self,
        date: NaiveDate,
        compiled: &CompiledAnalysis,
    ) -> Result<String, SimsError> {
        self.publish(Collection::CompiledAnalysis, compiled_record(date, compiled))
            .await
    }

    /// Date of the latest daily-metrics record, if the store can report one.
    pub async fn latest_metrics_date(&self) -> Option<NaiveDate> {
        match self.store.query_latest(Collection::DailyMetrics).await {
            Ok(record) => record.and_then(|r| r.date()),
            Err(err) => {
                tracing::warn!(
                    backend = self.store.backend_name(),
                    error = %err,
                    "latest metrics read-back failed"
                );
                None
            }
        }
    }
}
