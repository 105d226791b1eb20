//! PostgreSQL implementation of the store traits

use crate::error::{RegistryError, Result};
use crate::query::WorkerQuery;
use crate::store::{DeploymentStore, UpsertOutcome, WorkerPatch, WorkerStore, WorkerStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use overseer_types::{DeploymentInfo, WorkerRecord, WorkerStatus};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;

/// PostgreSQL-backed registry
#[derive(Debug, Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    /// Connect to PostgreSQL and initialize schema
    pub async fn connect(url: &str, max_connections: u32, connect_timeout_secs: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| RegistryError::Connection(e.to_string()))?;

        let registry = Self { pool };
        registry.initialize_schema().await?;
        tracing::debug!(max_connections, "PostgreSQL registry schema ready");
        Ok(registry)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS overseer_workers (
                uuid TEXT PRIMARY KEY,
                record_id UUID NOT NULL,
                name TEXT NOT NULL,
                version BIGINT NOT NULL,
                status TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS overseer_workers_name ON overseer_workers(name);"#,
            r#"CREATE INDEX IF NOT EXISTS overseer_workers_version_status ON overseer_workers(version, status);"#,
            r#"
            CREATE TABLE IF NOT EXISTS overseer_deployments (
                build_number TEXT PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
        serde_json::to_value(value)
            .map_err(|e| RegistryError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        serde_json::from_value(value)
            .map_err(|e| RegistryError::InvalidData(format!("json deserialize error: {}", e)))
    }

    async fn write_worker(conn: &mut PgConnection, worker: &WorkerRecord) -> Result<()> {
        let data = Self::to_json(worker)?;

        sqlx::query(
            r#"
            INSERT INTO overseer_workers (uuid, record_id, name, version, status, timestamp, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (uuid)
            DO UPDATE SET
                record_id = EXCLUDED.record_id,
                name = EXCLUDED.name,
                version = EXCLUDED.version,
                status = EXCLUDED.status,
                timestamp = EXCLUDED.timestamp,
                data = EXCLUDED.data
            "#,
        )
        .bind(worker.uuid.clone())
        .bind(*worker.id.as_uuid())
        .bind(worker.name.clone())
        .bind(worker.version)
        .bind(worker.status.as_str())
        .bind(worker.timestamp)
        .bind(data)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Append the SQL form of `query` as a WHERE clause.
fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, query: &WorkerQuery) {
    match query {
        WorkerQuery::All => {}
        WorkerQuery::Uuid(uuid) => {
            builder.push(" WHERE uuid = ").push_bind(uuid.clone());
        }
        WorkerQuery::Name(name) => {
            builder.push(" WHERE name = ").push_bind(name.clone());
        }
        WorkerQuery::VersionFamily { prefix, version } => {
            builder
                .push(" WHERE starts_with(lower(name), lower(")
                .push_bind(prefix.clone())
                .push(")) AND version <> ")
                .push_bind(*version);
        }
        WorkerQuery::StartedWithVersion(version) => {
            builder
                .push(" WHERE status = ")
                .push_bind(WorkerStatus::Started.as_str())
                .push(" AND version = ")
                .push_bind(*version);
        }
    }
}

#[async_trait]
impl WorkerStore for PostgresRegistry {
    async fn find_one(&self, query: &WorkerQuery) -> Result<Option<WorkerRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT data FROM overseer_workers");
        push_predicate(&mut builder, query);
        builder.push(" LIMIT 1");

        let row = builder.build().fetch_optional(&self.pool).await?;
        match row {
            Some(record) => {
                let data: Value = record.try_get("data")?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    async fn find_all(&self, query: &WorkerQuery) -> Result<Vec<WorkerRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT data FROM overseer_workers");
        push_predicate(&mut builder, query);
        builder.push(" ORDER BY name, uuid");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<WorkerRecord> {
                let data: Value = row.try_get("data")?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn upsert(&self, worker: WorkerRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write_worker(&mut *conn, &worker).await
    }

    async fn conditional_upsert(
        &self,
        conflict: &WorkerQuery,
        worker: WorkerRecord,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes conditional upserts against each other; plain reads are not blocked.
        sqlx::query("LOCK TABLE overseer_workers IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM overseer_workers");
        push_predicate(&mut builder, conflict);
        builder.push(")");
        let conflicting: bool = builder.build_query_scalar().fetch_one(&mut *tx).await?;

        if conflicting {
            tracing::debug!(uuid = %worker.uuid, "Conditional upsert blocked by existing worker");
            tx.rollback().await?;
            return Ok(UpsertOutcome::Blocked);
        }

        Self::write_worker(&mut *tx, &worker).await?;
        tx.commit().await?;
        Ok(UpsertOutcome::Inserted)
    }

    async fn update_one(&self, uuid: &str, patch: WorkerPatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data FROM overseer_workers WHERE uuid = $1 FOR UPDATE")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(RegistryError::WorkerNotFound(uuid.to_string()));
        };

        let data: Value = row.try_get("data")?;
        let mut worker: WorkerRecord = Self::from_json(data)?;
        patch.apply(&mut worker);

        Self::write_worker(&mut *tx, &worker).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_stale(&self, uuid: &str, observed: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // The JSON document keeps full precision; the timestamp column is truncated to microseconds.
        let row = sqlx::query("SELECT data FROM overseer_workers WHERE uuid = $1 FOR UPDATE")
            .bind(uuid.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let data: Value = row.try_get("data")?;
        let worker: WorkerRecord = Self::from_json(data)?;
        if worker.timestamp != observed {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM overseer_workers WHERE uuid = $1")
            .bind(uuid.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn count(&self, query: &WorkerQuery) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM overseer_workers");
        push_predicate(&mut builder, query);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    fn stream_all(&self) -> WorkerStream<'_> {
        sqlx::query_scalar::<_, Value>("SELECT data FROM overseer_workers")
            .fetch(&self.pool)
            .map(|row| row.map_err(RegistryError::from).and_then(Self::from_json::<WorkerRecord>))
            .boxed()
    }
}

#[async_trait]
impl DeploymentStore for PostgresRegistry {
    async fn list_deployments(&self) -> Result<Vec<DeploymentInfo>> {
        let rows = sqlx::query(
            "SELECT build_number, created_at FROM overseer_deployments ORDER BY build_number",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DeploymentInfo> {
                Ok(DeploymentInfo {
                    build_number: row.try_get("build_number")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn upsert_deployment(&self, deployment: DeploymentInfo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO overseer_deployments (build_number, created_at)
            VALUES ($1, $2)
            ON CONFLICT (build_number)
            DO UPDATE SET created_at = EXCLUDED.created_at
            "#,
        )
        .bind(deployment.build_number)
        .bind(deployment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_deployment(&self, build_number: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM overseer_deployments WHERE build_number = $1")
            .bind(build_number.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
