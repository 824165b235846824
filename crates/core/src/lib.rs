pub mod analysis;
pub mod domain;
pub mod error;
pub mod llm;
pub mod market;
pub mod metrics;
pub mod prompt;
pub mod publish;
pub mod run;
pub mod storage;
pub mod time;

pub mod config {
    use crate::storage::Collection;
    use anyhow::Context;
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum StoreBackend {
        #[default]
        Notion,
        Postgres,
    }

    impl FromStr for StoreBackend {
        type Err = anyhow::Error;

        fn from_str(s: &str) -> anyhow::Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "notion" => Ok(StoreBackend::Notion),
                "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
                other => anyhow::bail!("unknown STORE_BACKEND {other:?} (expected notion or postgres)"),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub llama_api_key: Option<String>,
        pub notion_token: Option<String>,
        pub notion_metrics_db_id: Option<String>,
        pub notion_analysis_db_id: Option<String>,
        pub notion_compiled_db_id: Option<String>,
        pub store_backend: StoreBackend,
        pub sentry_dsn: Option<String>,
    }

    fn var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.trim().is_empty())
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let store_backend = match var("STORE_BACKEND") {
                Some(s) => s.parse()?,
                None => StoreBackend::default(),
            };

            Ok(Self {
                database_url: var("DATABASE_URL"),
                llama_api_key: var("LLAMA_API_KEY"),
                notion_token: var("NOTION_TOKEN"),
                notion_metrics_db_id: var("NOTION_METRICS_DB_ID"),
                notion_analysis_db_id: var("NOTION_ANALYSIS_DB_ID"),
                notion_compiled_db_id: var("NOTION_COMPILED_DB_ID"),
                store_backend,
                sentry_dsn: var("SENTRY_DSN"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_llama_api_key(&self) -> anyhow::Result<&str> {
            self.llama_api_key
                .as_deref()
                .context("LLAMA_API_KEY is required")
        }

        pub fn require_notion_token(&self) -> anyhow::Result<&str> {
            self.notion_token
                .as_deref()
                .context("NOTION_TOKEN is required")
        }

        pub fn require_notion_database(&self, collection: Collection) -> anyhow::Result<&str> {
            let (value, name) = match collection {
                Collection::DailyMetrics => (&self.notion_metrics_db_id, "NOTION_METRICS_DB_ID"),
                Collection::Analysis => (&self.notion_analysis_db_id, "NOTION_ANALYSIS_DB_ID"),
                Collection::CompiledAnalysis => {
                    (&self.notion_compiled_db_id, "NOTION_COMPILED_DB_ID")
                }
            };
            value
                .as_deref()
                .with_context(|| format!("{name} is required"))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn empty() -> Settings {
            Settings {
                database_url: None,
                llama_api_key: None,
                notion_token: None,
                notion_metrics_db_id: Some("m".into()),
                notion_analysis_db_id: None,
                notion_compiled_db_id: None,
                store_backend: StoreBackend::Notion,
                sentry_dsn: None,
            }
        }

        #[test]
        fn parses_store_backend() {
            assert_eq!("notion".parse::<StoreBackend>().unwrap(), StoreBackend::Notion);
            assert_eq!(" Postgres ".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
            assert!("sqlite".parse::<StoreBackend>().is_err());
        }

        #[test]
        fn missing_values_name_their_variable() {
            let settings = empty();
            let err = settings.require_llama_api_key().unwrap_err();
            assert!(err.to_string().contains("LLAMA_API_KEY"));

            assert_eq!(settings.require_notion_database(Collection::DailyMetrics).unwrap(), "m");
            let err = settings
                .require_notion_database(Collection::CompiledAnalysis)
                .unwrap_err();
            assert!(err.to_string().contains("NOTION_COMPILED_DB_ID"));
        }
    }
}
