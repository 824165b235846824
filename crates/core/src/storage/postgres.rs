use crate::storage::{Collection, DocumentStore, Record};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Records as JSONB rows in a single `documents` table, one logical collection per
/// `collection` value.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: sqlx::PgPool,
}

impl PgDocumentStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connect DATABASE_URL failed")?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, collection: Collection, record: &Record) -> anyhow::Result<String> {
        let record_date: NaiveDate = record
            .date()
            .context("record has no Date property")?;
        let properties = serde_json::to_value(&record.properties)
            .context("serialize record properties failed")?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO documents (id, collection, record_date, properties) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .persistent(false)
        .bind(Uuid::new_v4())
        .bind(collection.as_str())
        .bind(record_date)
        .bind(properties)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("insert documents ({collection}) failed"))?;

        Ok(id.to_string())
    }

    async fn query_latest(&self, collection: Collection) -> anyhow::Result<Option<Record>> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>(
            "SELECT properties \
             FROM documents \
             WHERE collection = $1 \
             ORDER BY record_date DESC, created_at DESC \
             LIMIT 1",
        )
        .persistent(false)
        .bind(collection.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("query latest documents ({collection}) failed"))?;

        let Some((properties,)) = row else {
            return Ok(None);
        };
        let properties = serde_json::from_value(properties)
            .context("stored document properties have an unexpected shape")?;
        Ok(Some(Record { properties }))
    }
}
