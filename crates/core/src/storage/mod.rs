pub mod notion;
pub mod postgres;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DATE_PROPERTY: &str = "Date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    DailyMetrics,
    Analysis,
    CompiledAnalysis,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::DailyMetrics => "daily_metrics",
            Collection::Analysis => "analysis",
            Collection::CompiledAnalysis => "compiled_analysis",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed record property. Rich text is stored as its ordered segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    Date(NaiveDate),
    Number(#[serde(with = "rust_decimal::serde::float_option")] Option<Decimal>),
    RichText(Vec<String>),
    Select(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            PropertyValue::Number(n) => *n,
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Concatenated text for title, rich text and select values.
    pub fn text(&self) -> Option<String> {
        match self {
            PropertyValue::Title(s) | PropertyValue::Select(s) => Some(s.clone()),
            PropertyValue::RichText(segments) => Some(segments.concat()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.get(DATE_PROPERTY).and_then(PropertyValue::as_date)
    }
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Inserts one record and returns the store's identifier for it.
    async fn insert(&self, collection: Collection, record: &Record) -> anyhow::Result<String>;

    /// Most recent record of the collection by its `Date` property.
    async fn query_latest(&self, collection: Collection) -> anyhow::Result<Option<Record>>;
}

/// Stands in for a backend that could not be reached at startup. Every call fails with
/// the connection error, so each publish is reported as failed instead of aborting the run.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    backend: &'static str,
    reason: String,
}

impl UnavailableStore {
    pub fn new(backend: &'static str, reason: impl Into<String>) -> Self {
        Self {
            backend,
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for UnavailableStore {
    fn backend_name(&self) -> &'static str {
        self.backend
    }

    async fn insert(&self, collection: Collection, _record: &Record) -> anyhow::Result<String> {
        anyhow::bail!("{} unavailable, {collection} not written: {}", self.backend, self.reason)
    }

    async fn query_latest(&self, collection: Collection) -> anyhow::Result<Option<Record>> {
        anyhow::bail!("{} unavailable, {collection} not read: {}", self.backend, self.reason)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// In-process store for tests. Collections listed in `reject` fail every insert.
    #[derive(Default)]
    pub struct MemoryStore {
        pub records: Mutex<Vec<(Collection, Record)>>,
        pub reject: Vec<Collection>,
    }

    impl MemoryStore {
        pub fn records_in(&self, collection: Collection) -> Vec<Record> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == collection)
                .map(|(_, r)| r.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl DocumentStore for MemoryStore {
        fn backend_name(&self) -> &'static str {
            "memory"
        }

        async fn insert(&self, collection: Collection, record: &Record) -> anyhow::Result<String> {
            anyhow::ensure!(!self.reject.contains(&collection), "{collection} is read-only");
            let mut records = self.records.lock().unwrap();
            records.push((collection, record.clone()));
            Ok(format!("mem-{}", records.len()))
        }

        async fn query_latest(&self, collection: Collection) -> anyhow::Result<Option<Record>> {
            Ok(self
                .records_in(collection)
                .into_iter()
                .max_by_key(|r| r.date()))
        }
    }
}
