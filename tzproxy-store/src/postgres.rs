use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tzproxy_core::error::GatewayError;
use tzproxy_core::model::{MetricRecord, Project};
use tzproxy_core::ports::{MetricsStore, ProjectStore};

/// Postgres-backed durable project store.
///
/// Connects on construction and expects a `projects` table with
/// `(uuid text unique, title text, created_at timestamptz)`.
pub struct PostgresProjectStore {
    pool: PgPool,
}

impl PostgresProjectStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::ProjectLookupFailed(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PostgresProjectStore {
    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<Project>, GatewayError> {
        let row = sqlx::query_as::<_, (String, String, chrono::DateTime<chrono::Utc>)>(
            "SELECT uuid, title, created_at FROM projects WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GatewayError::ProjectLookupFailed(e.to_string()))?;

        Ok(row.map(|(uuid, title, creation_date)| Project { uuid, title, creation_date }))
    }
}

/// Postgres-backed durable metrics store.
///
/// Expects a `metric_records` table with `(project_uuid text, path text,
/// action text, recorded_at timestamptz)`. `save_many` writes the whole batch
/// in one transaction; a mid-batch failure rolls back so the flusher retains
/// the entire drained snapshot for the next attempt rather than risking a
/// partially persisted batch.
pub struct PostgresMetricsStore {
    pool: PgPool,
}

impl PostgresMetricsStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::MetricsPersistFailed(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsStore for PostgresMetricsStore {
    async fn save_many(&self, records: &[MetricRecord]) -> Result<(), GatewayError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GatewayError::MetricsPersistFailed(e.to_string()))?;

        for record in records {
            let action = match record.action {
                tzproxy_core::model::Action::Obtain => "OBTAIN",
                tzproxy_core::model::Action::Push => "PUSH",
            };
            sqlx::query(
                "INSERT INTO metric_records (project_uuid, path, action, recorded_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.project_uuid)
            .bind(&record.path)
            .bind(action)
            .bind(record.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| GatewayError::MetricsPersistFailed(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| GatewayError::MetricsPersistFailed(e.to_string()))?;
        Ok(())
    }
}
