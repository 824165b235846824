use clap::Parser;
use sims_core::config::{Settings, StoreBackend};
use sims_core::llm::llama::LlamaClient;
use sims_core::llm::CompletionSettings;
use sims_core::market::yahoo::YahooChartProvider;
use sims_core::prompt::templates::TemplateSet;
use sims_core::prompt::PromptComposer;
use sims_core::run::{DailyRun, RunOutcome};
use sims_core::storage::notion::NotionStore;
use sims_core::storage::postgres::PgDocumentStore;
use sims_core::storage::{DocumentStore, UnavailableStore};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sims_worker")]
struct Args {
    /// Report date (YYYY-MM-DD). Defaults to today in the report timezone.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Sample, score and analyse without writing to the document store.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let offset = sims_core::time::report_offset()?;
    let run_date =
        sims_core::time::resolve_run_date(args.as_of_date.as_deref(), chrono::Utc::now(), offset)?;

    let market = YahooChartProvider::from_env()?;
    let llm = LlamaClient::from_settings(&settings)?;
    let templates = TemplateSet::from_env()?;

    let store: Option<Box<dyn DocumentStore>> = if args.dry_run {
        None
    } else {
        Some(connect_store(&settings).await?)
    };

    let report = DailyRun::new(&market, &llm, store.as_deref())
        .with_composer(PromptComposer::new(templates))
        .with_completion_settings(CompletionSettings::from_env())
        .execute(run_date)
        .await;

    match &report.outcome {
        RunOutcome::NoData => {
            tracing::warn!(%run_date, dry_run = args.dry_run, "daily run finished without data");
        }
        RunOutcome::Completed { risk_score, stage } => {
            let published: Vec<String> = report
                .published
                .iter()
                .map(|(collection, status)| format!("{collection}={status}"))
                .collect();
            tracing::info!(
                %run_date,
                record_date = %report.record_date,
                dry_run = args.dry_run,
                snapshots = report.snapshots,
                risk_score = risk_score.value,
                sentiment = %risk_score.sentiment,
                %stage,
                published = %published.join(","),
                "daily run finished"
            );
        }
    }

    if report.publish_failures() > 0 {
        let err = anyhow::anyhow!(
            "{} of {} publishes failed for {run_date}",
            report.publish_failures(),
            report.published.len()
        );
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(%run_date, error = %err, "daily run degraded");
    }

    Ok(())
}

async fn connect_store(settings: &Settings) -> anyhow::Result<Box<dyn DocumentStore>> {
    match settings.store_backend {
        StoreBackend::Notion => Ok(Box::new(NotionStore::from_settings(settings)?)),
        StoreBackend::Postgres => {
            let db_url = settings.require_database_url()?;
            match PgDocumentStore::connect(db_url).await {
                Ok(store) => Ok(Box::new(store)),
                Err(err) => {
                    let err = err.context("postgres document store unavailable");
                    sentry_anyhow::capture_anyhow(&err);
                    let detail = format!("{err:#}");
                    tracing::error!(error = %detail, "continuing without a reachable store");
                    Ok(Box::new(UnavailableStore::new("postgres", detail)))
                }
            }
        }
    }
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
