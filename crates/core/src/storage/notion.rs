use crate::config::Settings;
use crate::storage::{Collection, DocumentStore, PropertyValue, Record, DATE_PROPERTY};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct NotionDatabases {
    pub daily_metrics: String,
    pub analysis: String,
    pub compiled_analysis: String,
}

impl NotionDatabases {
    fn id(&self, collection: Collection) -> &str {
        match collection {
            Collection::DailyMetrics => &self.daily_metrics,
            Collection::Analysis => &self.analysis,
            Collection::CompiledAnalysis => &self.compiled_analysis,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotionStore {
    http: reqwest::Client,
    token: String,
    base_url: String,
    databases: NotionDatabases,
}

impl NotionStore {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings.require_notion_token()?.to_string();
        let databases = NotionDatabases {
            daily_metrics: settings.require_notion_database(Collection::DailyMetrics)?.to_string(),
            analysis: settings.require_notion_database(Collection::Analysis)?.to_string(),
            compiled_analysis: settings
                .require_notion_database(Collection::CompiledAnalysis)?
                .to_string(),
        };

        let base_url =
            std::env::var("NOTION_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("NOTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build Notion http client")?;

        Ok(Self {
            http,
            token,
            base_url,
            databases,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))?,
        );
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let res = self
            .http
            .post(self.url(path))
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .context("Notion request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Notion response")?;
        if !status.is_success() {
            anyhow::bail!("Notion HTTP {status}: {text}");
        }
        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("Notion response is not valid JSON: {text}"))
    }
}

#[async_trait::async_trait]
impl DocumentStore for NotionStore {
    fn backend_name(&self) -> &'static str {
        "notion"
    }

    async fn insert(&self, collection: Collection, record: &Record) -> Result<String> {
        let body = json!({
            "parent": {"database_id": self.databases.id(collection)},
            "properties": properties_to_notion(record),
        });
        let page = self.post("/v1/pages", &body).await?;
        page.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("Notion page response has no id")
    }

    async fn query_latest(&self, collection: Collection) -> Result<Option<Record>> {
        let path = format!("/v1/databases/{}/query", self.databases.id(collection));
        let body = json!({
            "sorts": [{"property": DATE_PROPERTY, "direction": "descending"}],
            "page_size": 1,
        });
        let res = self.post(&path, &body).await?;
        let page = res
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first());
        Ok(page.map(record_from_page))
    }
}

fn text_segments(segments: &[String]) -> Value {
    Value::Array(
        segments
            .iter()
            .map(|s| json!({"type": "text", "text": {"content": s}}))
            .collect(),
    )
}

pub fn property_to_notion(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(s) => json!({"title": text_segments(std::slice::from_ref(s))}),
        PropertyValue::Date(d) => json!({"date": {"start": d.format("%Y-%m-%d").to_string()}}),
        PropertyValue::Number(n) => json!({"number": n.and_then(|n| n.to_f64())}),
        PropertyValue::RichText(segments) => json!({"rich_text": text_segments(segments)}),
        PropertyValue::Select(s) => json!({"select": {"name": s}}),
    }
}

pub fn properties_to_notion(record: &Record) -> Value {
    let map: Map<String, Value> = record
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), property_to_notion(value)))
        .collect();
    Value::Object(map)
}

fn segments_from_notion(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.pointer("/text/content")
                        .or_else(|| item.get("plain_text"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a property object as returned by the Notion API (`{"type": .., <type>: ..}`).
/// Property types this store never writes are skipped.
pub fn property_from_notion(v: &Value) -> Option<PropertyValue> {
    let kind = v.get("type").and_then(Value::as_str)?;
    let body = v.get(kind)?;
    match kind {
        "title" => Some(PropertyValue::Title(segments_from_notion(body).concat())),
        "rich_text" => Some(PropertyValue::RichText(segments_from_notion(body))),
        "number" => Some(PropertyValue::Number(body.as_f64().and_then(Decimal::from_f64))),
        "select" => body
            .get("name")
            .and_then(Value::as_str)
            .map(|s| PropertyValue::Select(s.to_string())),
        "date" => body
            .get("start")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
            .map(PropertyValue::Date),
        _ => None,
    }
}

pub fn record_from_page(page: &Value) -> Record {
    let properties = page
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(name, v)| Some((name.clone(), property_from_notion(v)?)))
                .collect()
        })
        .unwrap_or_default();
    Record { properties }
}
